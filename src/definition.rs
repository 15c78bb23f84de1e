//! Device definitions: identity, capabilities and converters of one model.

use crate::context::Context;
use crate::converters::{
    ConvertMeta, FromZigbee, FromZigbeeSet, Message, SetMeta, State, ToZigbee, ToZigbeeSet,
};
use crate::error::{DefinitionError, Result};
use crate::exposes::Expose;
use crate::extend::Extend;
use crate::fingerprint::Fingerprint;
use crate::radio::{Device, Endpoint, Entity};
use futures_util::future::BoxFuture;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One-shot procedure run after a device joins or is re-interviewed.
pub type ConfigureFn = Arc<
    dyn for<'a> Fn(&'a dyn Device, &'a dyn Entity, &'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync,
>;

/// Handler for bridge lifecycle events.
pub type OnEventFn = Arc<
    dyn for<'a> Fn(&'a Event, &'a Arc<dyn Device>, &'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync,
>;

/// Wrap a closure as [`ConfigureFn`], pinning down its higher-ranked signature.
pub fn configure_fn<F>(f: F) -> ConfigureFn
where
    F: for<'a> Fn(&'a dyn Device, &'a dyn Entity, &'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as [`OnEventFn`].
pub fn on_event_fn<F>(f: F) -> OnEventFn
where
    F: for<'a> Fn(&'a Event, &'a Arc<dyn Device>, &'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Bridge lifecycle events delivered to `on_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Stop,
    DeviceAnnounce,
    Message(Message),
}

/// Behavioral hints for converters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionMeta {
    /// The light accepts hue/saturation commands.
    #[serde(rename = "supportsHueAndSaturation")]
    pub supports_hs: bool,
}

/// Model sold under another brand, recognised by its own fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhiteLabel {
    pub vendor: String,
    pub model: String,
    pub description: Option<String>,
    pub fingerprint: Vec<Fingerprint>,
}

#[derive(Clone)]
pub struct Definition {
    pub zigbee_model: Vec<String>,
    pub fingerprint: Vec<Fingerprint>,
    pub model: String,
    pub vendor: String,
    pub description: String,
    pub white_label: Vec<WhiteLabel>,
    pub exposes: Vec<Expose>,
    pub from_zigbee: FromZigbeeSet,
    pub to_zigbee: ToZigbeeSet,
    pub configure: Option<ConfigureFn>,
    pub on_event: Option<OnEventFn>,
    pub meta: DefinitionMeta,
}

impl Definition {
    pub fn new(model: &str, vendor: &str, description: &str) -> Self {
        Self {
            zigbee_model: Vec::new(),
            fingerprint: Vec::new(),
            model: model.to_string(),
            vendor: vendor.to_string(),
            description: description.to_string(),
            white_label: Vec::new(),
            exposes: Vec::new(),
            from_zigbee: FromZigbeeSet::new(),
            to_zigbee: ToZigbeeSet::new(),
            configure: None,
            on_event: None,
            meta: DefinitionMeta::default(),
        }
    }

    pub fn with_zigbee_model(mut self, models: &[&str]) -> Self {
        self.zigbee_model.extend(models.iter().map(|m| m.to_string()));
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint.push(fingerprint);
        self
    }

    pub fn with_white_label(mut self, white_label: WhiteLabel) -> Self {
        self.white_label.push(white_label);
        self
    }

    /// Merge an extend fragment. A configure set on the definition is kept.
    pub fn with_extend(mut self, extend: Extend) -> Self {
        self.exposes.extend(extend.exposes);
        for converter in extend.from_zigbee.iter() {
            self.from_zigbee.add(converter);
        }
        for converter in extend.to_zigbee.iter() {
            self.to_zigbee.add(converter);
        }
        if self.configure.is_none() {
            self.configure = extend.configure;
        }
        self.meta.supports_hs |= extend.meta.supports_hs;
        self
    }

    pub fn with_exposes(mut self, exposes: Vec<Expose>) -> Self {
        self.exposes.extend(exposes);
        self
    }

    pub fn with_from_zigbee(mut self, converters: &[&'static dyn FromZigbee]) -> Self {
        self.from_zigbee.extend(converters);
        self
    }

    pub fn with_to_zigbee(mut self, converters: &[&'static dyn ToZigbee]) -> Self {
        self.to_zigbee.extend(converters);
        self
    }

    /// Replace any configure inherited from an extend.
    pub fn with_configure(mut self, configure: ConfigureFn) -> Self {
        self.configure = Some(configure);
        self
    }

    pub fn with_on_event(mut self, on_event: OnEventFn) -> Self {
        self.on_event = Some(on_event);
        self
    }

    pub fn with_meta(mut self, meta: DefinitionMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Check the identity and that every settable exposed property has a converter.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| DefinitionError::InvalidDefinition {
            model: self.model.clone(),
            reason,
        };

        if self.model.is_empty() || self.vendor.is_empty() {
            return Err(invalid("model and vendor are required".to_string()));
        }
        if self.zigbee_model.is_empty() && self.fingerprint.is_empty() {
            return Err(invalid("needs a zigbee_model or a fingerprint".to_string()));
        }

        let keys = self.to_zigbee.keys();
        for expose in &self.exposes {
            for property in expose.settable_properties() {
                if !keys.contains(&property.as_str()) {
                    return Err(invalid(format!(
                        "exposes settable '{}' but no toZigbee converter handles it",
                        property
                    )));
                }
            }
        }
        Ok(())
    }

    /// Names of all exposed top level features, for listings.
    pub fn expose_names(&self) -> Vec<String> {
        self.exposes
            .iter()
            .map(|e| e.name.clone().unwrap_or_else(|| e.kind.to_string()))
            .collect()
    }

    /// Run every matching `fromZigbee` converter and merge their output in order.
    pub fn process_message(&self, message: &Message, meta: &ConvertMeta<'_>) -> State {
        let mut state = State::new();
        for converter in self.from_zigbee.iter().filter(|c| c.matches(message)) {
            if let Some(update) = converter.convert(self, message, meta) {
                debug!("'{}' converted {} to {:?}", converter.id(), message.cluster, update);
                state.extend(update);
            }
        }
        if let Some(linkquality) = message.linkquality {
            state.insert("linkquality".to_string(), Value::from(linkquality));
        }
        state
    }

    /// Apply a requested state change, one converter call per converter.
    ///
    /// Keys handled by a converter that already ran for this message are
    /// skipped, that converter sees the whole message.
    pub async fn set(
        &self,
        endpoint: &dyn Endpoint,
        message: &State,
        state: &State,
        context: &Context,
    ) -> Result<State> {
        let meta = SetMeta {
            message,
            state,
            context,
            definition: &self.meta,
            endpoint_name: None,
        };

        let mut used: Vec<&'static str> = Vec::new();
        let mut result = State::new();
        for (key, value) in message {
            let converter = self
                .to_zigbee
                .for_key(key)
                .ok_or_else(|| DefinitionError::NoConverter(key.clone()))?;
            if used.contains(&converter.id()) {
                continue;
            }
            used.push(converter.id());

            if let Some(update) = converter.convert_set(endpoint, key, value, &meta).await? {
                result.extend(update);
            }
        }
        Ok(result)
    }

    /// Request fresh values for `keys`, answers arrive as messages.
    pub async fn get(&self, endpoint: &dyn Endpoint, keys: &[&str], context: &Context) -> Result<()> {
        let empty = State::new();
        let meta = SetMeta {
            message: &empty,
            state: &empty,
            context,
            definition: &self.meta,
            endpoint_name: None,
        };

        let mut used: Vec<&'static str> = Vec::new();
        for key in keys {
            let converter = self
                .to_zigbee
                .for_key(key)
                .ok_or_else(|| DefinitionError::NoConverter(key.to_string()))?;
            if used.contains(&converter.id()) {
                continue;
            }
            used.push(converter.id());
            converter.convert_get(endpoint, key, &meta).await?;
        }
        Ok(())
    }

    /// Run `configure`, a no-op for definitions without one.
    pub async fn run_configure(&self, device: &dyn Device, coordinator: &dyn Entity, context: &Context) -> Result<()> {
        match &self.configure {
            Some(configure) => configure(device, coordinator, context).await,
            None => Ok(()),
        }
    }

    /// Deliver a lifecycle event, a no-op for definitions without a handler.
    pub async fn handle_event(&self, event: &Event, device: &Arc<dyn Device>, context: &Context) -> Result<()> {
        match &self.on_event {
            Some(on_event) => on_event(event, device, context).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("model", &self.model)
            .field("vendor", &self.vendor)
            .field("zigbee_model", &self.zigbee_model)
            .field("fingerprint", &self.fingerprint)
            .field("from_zigbee", &self.from_zigbee)
            .field("to_zigbee", &self.to_zigbee)
            .field("configure", &self.configure.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::converters::{from_zigbee as fz, to_zigbee as tz};
    use crate::exposes::presets;
    use crate::radio::{EndpointInfo, RadioCall, RecordingEndpoint};
    use futures_util::FutureExt;
    use serde_json::json;

    fn plug() -> Definition {
        Definition::new("PLUG-1", "Test", "Smart plug")
            .with_zigbee_model(&["plug1"])
            .with_exposes(vec![presets::switch()])
            .with_from_zigbee(&[&fz::ON_OFF])
            .with_to_zigbee(&[&tz::ON_OFF])
    }

    #[test]
    fn test_validate_requires_identity() {
        let definition = Definition::new("X", "Test", "No identity");
        assert!(matches!(
            definition.validate(),
            Err(DefinitionError::InvalidDefinition { .. })
        ));
        assert!(plug().validate().is_ok());
    }

    #[test]
    fn test_validate_catches_unhandled_settable_property() {
        let definition = plug().with_exposes(vec![presets::effect()]);
        let err = definition.validate().unwrap_err();
        assert!(err.to_string().contains("effect"));
    }

    #[test]
    fn test_process_message_merges_matching_converters() {
        let definition = plug();
        let state = State::new();
        let message = Message::attribute_report(Cluster::GenOnOff, json!({"onOff": 1}).as_object().cloned().unwrap())
            .with_linkquality(87);
        let update = definition.process_message(&message, &ConvertMeta::new(&state));
        assert_eq!(update.get("state"), Some(&json!("ON")));
        assert_eq!(update.get("linkquality"), Some(&json!(87)));

        let other = Message::attribute_report(Cluster::GenLevelCtrl, json!({"currentLevel": 3}).as_object().cloned().unwrap());
        assert!(definition.process_message(&other, &ConvertMeta::new(&state)).is_empty());
    }

    #[tokio::test]
    async fn test_set_calls_each_converter_once() {
        let definition = plug();
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1));
        let message = json!({"state": "ON", "on_time": 5}).as_object().cloned().unwrap();
        definition
            .set(&endpoint, &message, &State::new(), &Context::default())
            .await
            .unwrap();
        assert_eq!(endpoint.calls().len(), 1);
        assert!(matches!(
            &endpoint.calls()[0],
            RadioCall::Command { command, .. } if command == "onWithTimedOff"
        ));
    }

    #[tokio::test]
    async fn test_set_unknown_key() {
        let definition = plug();
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1));
        let message = json!({"color": "#ff0000"}).as_object().cloned().unwrap();
        let result = definition
            .set(&endpoint, &message, &State::new(), &Context::default())
            .await;
        assert!(matches!(result, Err(DefinitionError::NoConverter(key)) if key == "color"));
    }

    #[tokio::test]
    async fn test_get_reads_attribute() {
        let definition = plug();
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1));
        definition
            .get(&endpoint, &["state"], &Context::default())
            .await
            .unwrap();
        assert_eq!(
            endpoint.calls(),
            vec![RadioCall::Read {
                cluster: Cluster::GenOnOff,
                attributes: vec!["onOff".to_string()],
            }]
        );
    }

    #[test]
    fn test_own_configure_wins_over_extend() {
        let own = configure_fn(|_, _, _| async { Ok(()) }.boxed());
        let definition = Definition::new("L", "Test", "Light")
            .with_zigbee_model(&["l"])
            .with_configure(own.clone())
            .with_extend(Extend::light_onoff_brightness(Default::default()));
        let configure = definition.configure.unwrap();
        assert!(Arc::ptr_eq(&configure, &own));
    }
}
