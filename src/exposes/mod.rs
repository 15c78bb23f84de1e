//! Capability descriptors ("exposes").
//!
//! Read-only metadata telling downstream UIs which properties a device has,
//! their types and whether they can be set or read. Serialized in the shape
//! the bridge publishes on its `bridge/devices` topic.

pub mod presets;

use crate::error::{DefinitionError, Result};
use serde::Serialize;
use serde_json::Value;
use std::ops::BitOr;
use strum::{AsRefStr, Display};

/// Access bitmask of an exposed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Access(u8);

impl Access {
    /// Property is published in the device state.
    pub const STATE: Access = Access(0b001);
    /// Property can be set.
    pub const SET: Access = Access(0b010);
    /// Property can be read on request.
    pub const GET: Access = Access(0b100);
    pub const STATE_SET: Access = Access(0b011);
    pub const STATE_GET: Access = Access(0b101);
    pub const ALL: Access = Access(0b111);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExposeKind {
    Binary,
    Numeric,
    Enum,
    Text,
    Composite,
    Light,
    Switch,
}

/// Named value of a numeric property (e.g. `warmest` for a color temperature).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub name: String,
    pub value: Value,
    pub description: String,
}

/// Color spaces a light can be controlled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Xy,
    Hs,
}

pub const DEFAULT_COLOR_TEMP_RANGE: [u16; 2] = [150, 500];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expose {
    #[serde(rename = "type")]
    pub kind: ExposeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_on: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_off: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_toggle: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<Preset>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Expose>,
}

impl Expose {
    fn base(kind: ExposeKind) -> Self {
        Self {
            kind,
            name: None,
            property: None,
            access: None,
            description: None,
            endpoint: None,
            unit: None,
            value_min: None,
            value_max: None,
            value_step: None,
            value_on: None,
            value_off: None,
            value_toggle: None,
            values: Vec::new(),
            presets: Vec::new(),
            features: Vec::new(),
        }
    }

    fn leaf(kind: ExposeKind, name: &str, access: Access) -> Self {
        let mut expose = Self::base(kind);
        expose.name = Some(name.to_string());
        expose.property = Some(name.to_string());
        expose.access = Some(access);
        expose
    }

    pub fn binary(name: &str, access: Access, value_on: impl Into<Value>, value_off: impl Into<Value>) -> Self {
        let mut expose = Self::leaf(ExposeKind::Binary, name, access);
        expose.value_on = Some(value_on.into());
        expose.value_off = Some(value_off.into());
        expose
    }

    pub fn numeric(name: &str, access: Access) -> Self {
        Self::leaf(ExposeKind::Numeric, name, access)
    }

    pub fn enumeration(name: &str, access: Access, values: &[&str]) -> Self {
        let mut expose = Self::leaf(ExposeKind::Enum, name, access);
        expose.values = values.iter().map(|v| v.to_string()).collect();
        expose
    }

    pub fn text(name: &str, access: Access) -> Self {
        Self::leaf(ExposeKind::Text, name, access)
    }

    /// Group of features set together under one `property`.
    pub fn composite(name: &str, property: &str) -> Self {
        let mut expose = Self::base(ExposeKind::Composite);
        expose.name = Some(name.to_string());
        expose.property = Some(property.to_string());
        expose
    }

    /// A light with only its on/off `state` feature.
    pub fn light() -> Self {
        Self::base(ExposeKind::Light).with_feature(
            Self::binary("state", Access::ALL, "ON", "OFF")
                .with_value_toggle("TOGGLE")
                .with_description("On/off state of this light"),
        )
    }

    /// An empty switch, add its state with [`Expose::with_state`].
    pub fn switch() -> Self {
        Self::base(ExposeKind::Switch)
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_property(mut self, property: &str) -> Self {
        self.property = Some(property.to_string());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_value_min(mut self, value: f64) -> Self {
        self.value_min = Some(value);
        self
    }

    pub fn with_value_max(mut self, value: f64) -> Self {
        self.value_max = Some(value);
        self
    }

    pub fn with_value_step(mut self, value: f64) -> Self {
        self.value_step = Some(value);
        self
    }

    pub fn with_value_toggle(mut self, value: impl Into<Value>) -> Self {
        self.value_toggle = Some(value.into());
        self
    }

    pub fn with_preset(mut self, name: &str, value: impl Into<Value>, description: &str) -> Self {
        self.presets.push(Preset {
            name: name.to_string(),
            value: value.into(),
            description: description.to_string(),
        });
        self
    }

    pub fn with_feature(mut self, feature: Expose) -> Self {
        self.features.push(feature);
        self
    }

    /// Add a toggleable on/off state feature to a switch.
    pub fn with_state(self, property: &str, description: &str) -> Self {
        self.with_feature(
            Self::binary("state", Access::ALL, "ON", "OFF")
                .with_property(property)
                .with_value_toggle("TOGGLE")
                .with_description(description),
        )
    }

    /// Scope this expose and its features to a named endpoint, suffixing properties.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        if let Some(property) = self.property.as_mut() {
            *property = format!("{}_{}", property, endpoint);
        }
        for feature in &mut self.features {
            if let Some(property) = feature.property.as_mut() {
                *property = format!("{}_{}", property, endpoint);
                feature.endpoint = Some(endpoint.to_string());
            }
        }
        self
    }

    pub fn with_brightness(self) -> Self {
        self.with_feature(
            Self::numeric("brightness", Access::ALL)
                .with_value_min(0.0)
                .with_value_max(254.0)
                .with_description("Brightness of this light"),
        )
    }

    pub fn with_level_config(self) -> Self {
        let level_config = Self::composite("level_config", "level_config")
            .with_feature(
                Self::numeric("on_off_transition_time", Access::ALL).with_description(
                    "Represents the time taken to move to or from the target level when On of Off commands are received by an On/Off cluster",
                ),
            )
            .with_feature(
                Self::numeric("on_transition_time", Access::ALL)
                    .with_preset("disabled", 65535, "Use on_off_transition_time value")
                    .with_description(
                        "Represents the time taken to move the current level from the minimum level to the maximum level when an On command is received",
                    ),
            )
            .with_feature(
                Self::numeric("off_transition_time", Access::ALL)
                    .with_preset("disabled", 65535, "Use on_off_transition_time value")
                    .with_description(
                        "Represents the time taken to move the current level from the maximum level to the minimum level when an Off command is received",
                    ),
            )
            .with_feature(
                Self::numeric("current_level_startup", Access::ALL)
                    .with_value_min(1.0)
                    .with_value_max(254.0)
                    .with_preset("minimum", 0, "Use minimum permitted value")
                    .with_preset("previous", 255, "Use previous value")
                    .with_description(
                        "Defines the desired startup level for a device when it is supplied with power",
                    ),
            )
            .with_description("Configure genLevelCtrl");
        self.with_feature(level_config)
    }

    pub fn with_color_temp(self, range: Option<[u16; 2]>) -> Self {
        let feature = color_temp_feature("color_temp", range)
            .with_description("Color temperature of this light");
        self.with_feature(feature)
    }

    pub fn with_color_temp_startup(self, range: Option<[u16; 2]>) -> Self {
        let feature = color_temp_feature("color_temp_startup", range)
            .with_description("Color temperature after cold power on of this light")
            .with_preset("previous", 65535, "Restore previous color_temp on cold power on");
        self.with_feature(feature)
    }

    /// Add one `color` composite per color space, in the given order.
    pub fn with_color(mut self, spaces: &[ColorSpace]) -> Self {
        for space in spaces {
            let composite = match space {
                ColorSpace::Xy => Self::composite("color_xy", "color")
                    .with_feature(Self::numeric("x", Access::ALL))
                    .with_feature(Self::numeric("y", Access::ALL))
                    .with_description("Color of this light in the CIE 1931 color space (x/y)"),
                ColorSpace::Hs => Self::composite("color_hs", "color")
                    .with_feature(Self::numeric("hue", Access::ALL))
                    .with_feature(Self::numeric("saturation", Access::ALL))
                    .with_description("Color of this light expressed as hue/saturation"),
            };
            self = self.with_feature(composite);
        }
        self
    }

    pub fn feature(&self, name: &str) -> Option<&Expose> {
        self.features.iter().find(|f| f.name.as_deref() == Some(name))
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.feature(name).is_some()
    }

    pub fn remove_feature(&mut self, name: &str) -> Result<()> {
        let index = self
            .features
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| DefinitionError::UnknownFeature(name.to_string()))?;
        self.features.remove(index);
        Ok(())
    }

    /// Change the access of the feature called `name`.
    pub fn set_access(&mut self, name: &str, access: Access) -> Result<()> {
        let feature = self
            .features
            .iter_mut()
            .find(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| DefinitionError::UnknownFeature(name.to_string()))?;
        feature.access = Some(access);
        Ok(())
    }

    fn is_settable(&self) -> bool {
        self.access.is_some_and(|a| a.contains(Access::SET))
    }

    /// Properties a `toZigbee` converter must be able to set.
    ///
    /// A composite counts once under its own property when any of its
    /// features is settable, its sub-features are set through it.
    pub fn settable_properties(&self) -> Vec<String> {
        let mut properties = Vec::new();
        self.collect_settable(&mut properties);
        properties
    }

    fn collect_settable(&self, out: &mut Vec<String>) {
        match self.kind {
            ExposeKind::Light | ExposeKind::Switch => {
                for feature in &self.features {
                    feature.collect_settable(out);
                }
            }
            ExposeKind::Composite => {
                if self.features.iter().any(Expose::is_settable)
                    && let Some(property) = &self.property
                    && !out.contains(property)
                {
                    out.push(property.clone());
                }
            }
            _ => {
                if self.is_settable()
                    && let Some(property) = &self.property
                    && !out.contains(property)
                {
                    out.push(property.clone());
                }
            }
        }
    }
}

fn color_temp_feature(name: &str, range: Option<[u16; 2]>) -> Expose {
    let [min, max] = range.unwrap_or(DEFAULT_COLOR_TEMP_RANGE);
    Expose::numeric(name, Access::ALL)
        .with_unit("mired")
        .with_value_min(f64::from(min))
        .with_value_max(f64::from(max))
        .with_preset("coolest", min, "Coolest temperature supported")
        .with_preset("cool", 250, "Cool temperature (250 mireds / 4000 Kelvin)")
        .with_preset("neutral", 370, "Neutral temperature (370 mireds / 2700 Kelvin)")
        .with_preset("warm", 454, "Warm temperature (454 mireds / 2200 Kelvin)")
        .with_preset("warmest", max, "Warmest temperature supported")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_access_bits() {
        assert!(Access::ALL.contains(Access::SET));
        assert!(!Access::STATE_GET.contains(Access::SET));
        assert_eq!(Access::STATE | Access::SET, Access::STATE_SET);
        assert_eq!(Access::ALL.bits(), 7);
    }

    #[test]
    fn test_light_features() {
        let light = Expose::light()
            .with_brightness()
            .with_color_temp(Some([153, 500]))
            .with_color_temp_startup(Some([153, 500]));

        assert!(light.has_feature("state"));
        assert!(light.has_feature("brightness"));
        let color_temp = light.feature("color_temp").unwrap();
        assert_eq!(color_temp.value_min, Some(153.0));
        assert_eq!(color_temp.presets[0].value, json!(153));
        let startup = light.feature("color_temp_startup").unwrap();
        assert_eq!(startup.presets.last().unwrap().value, json!(65535));
    }

    #[test]
    fn test_remove_feature() {
        let mut light = Expose::light().with_brightness().with_color_temp_startup(None);
        light.remove_feature("color_temp_startup").unwrap();
        assert!(!light.has_feature("color_temp_startup"));

        assert!(matches!(
            light.remove_feature("color_temp_startup"),
            Err(DefinitionError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_composite_counts_once_in_settable_properties() {
        let light = Expose::light()
            .with_brightness()
            .with_color(&[ColorSpace::Xy, ColorSpace::Hs]);
        assert_eq!(
            light.settable_properties(),
            vec!["state".to_string(), "brightness".into(), "color".into()]
        );
    }

    #[test]
    fn test_state_only_properties_are_not_settable() {
        let battery = Expose::numeric("battery", Access::STATE);
        assert!(battery.settable_properties().is_empty());
    }

    #[test]
    fn test_with_endpoint_suffixes_properties() {
        let switch = Expose::switch()
            .with_state("state", "On/off state of the switch")
            .with_endpoint("l1");
        assert_eq!(switch.endpoint.as_deref(), Some("l1"));
        assert_eq!(switch.features[0].property.as_deref(), Some("state_l1"));
        assert_eq!(switch.features[0].endpoint.as_deref(), Some("l1"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Expose::light().with_brightness()).unwrap();
        assert_eq!(json["type"], "light");
        assert!(json.get("name").is_none());
        assert_eq!(json["features"][0]["value_toggle"], "TOGGLE");
        assert_eq!(json["features"][1]["access"], 7);
        assert_eq!(json["features"][1]["value_max"], 254.0);
    }
}
