use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum DefinitionError {
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("{kind} entity is missing its {field}")]
    MissingEntityIdentity {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("No converter found for property: {0}")]
    NoConverter(String),

    #[error("Does not have feature '{0}'")]
    UnknownFeature(String),

    #[error("Invalid definition '{model}': {reason}")]
    InvalidDefinition { model: String, reason: String },

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(u8),

    #[error("Radio operation failed: {0}")]
    Radio(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl DefinitionError {
    pub(crate) fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DefinitionError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DefinitionError>;
