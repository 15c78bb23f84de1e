//! Converter traits and the shared converter library.
//!
//! `fromZigbee` converters turn incoming ZCL messages into state updates,
//! `toZigbee` converters turn requested state changes into ZCL operations.
//! Converters are `'static` singletons; definitions reference them, never own
//! them.

pub mod from_zigbee;
pub mod to_zigbee;

use crate::cluster::Cluster;
use crate::context::Context;
use crate::definition::{Definition, DefinitionMeta};
use crate::error::{DefinitionError, Result};
use crate::radio::{AttributeValues, Endpoint};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Partial device state, merged into the published state.
pub type State = Map<String, Value>;

/// Herdsman message types.
pub mod message_type {
    pub const ATTRIBUTE_REPORT: &str = "attributeReport";
    pub const READ_RESPONSE: &str = "readResponse";
}

use message_type::{ATTRIBUTE_REPORT, READ_RESPONSE};

pub(crate) const ATTRIBUTE_MESSAGES: &[&str] = &[ATTRIBUTE_REPORT, READ_RESPONSE];

/// Incoming ZCL message as delivered by the radio layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub cluster: Cluster,
    /// `attributeReport`, `readResponse` or `command<Name>`.
    pub kind: String,
    pub data: AttributeValues,
    pub endpoint_id: u8,
    pub linkquality: Option<u8>,
}

impl Message {
    pub fn new(cluster: Cluster, kind: &str, data: AttributeValues) -> Self {
        Self {
            cluster,
            kind: kind.to_string(),
            data,
            endpoint_id: 1,
            linkquality: None,
        }
    }

    pub fn attribute_report(cluster: Cluster, data: AttributeValues) -> Self {
        Self::new(cluster, ATTRIBUTE_REPORT, data)
    }

    pub fn with_endpoint(mut self, endpoint_id: u8) -> Self {
        self.endpoint_id = endpoint_id;
        self
    }

    pub fn with_linkquality(mut self, linkquality: u8) -> Self {
        self.linkquality = Some(linkquality);
        self
    }
}

/// Common identity of all converters.
pub trait Converter: Send + Sync {
    /// Stable identifier, unique per converter kind.
    fn id(&self) -> &'static str;
}

/// Extra inputs available to a `fromZigbee` converter.
pub struct ConvertMeta<'a> {
    /// Last published state of the device.
    pub state: &'a State,
    /// Endpoint the message arrived on, for cached scaling attributes.
    pub endpoint: Option<&'a dyn Endpoint>,
    /// Name suffix when the definition exposes per-endpoint properties.
    pub endpoint_name: Option<&'a str>,
    /// Publish an additional state update out of band.
    pub publish: Option<&'a (dyn Fn(State) + Send + Sync)>,
}

impl<'a> ConvertMeta<'a> {
    pub fn new(state: &'a State) -> Self {
        Self {
            state,
            endpoint: None,
            endpoint_name: None,
            publish: None,
        }
    }

    /// `name`, suffixed with the endpoint name when there is one.
    pub fn property(&self, name: &str) -> String {
        match self.endpoint_name {
            Some(endpoint) => format!("{}_{}", name, endpoint),
            None => name.to_string(),
        }
    }
}

pub trait FromZigbee: Converter {
    fn cluster(&self) -> Cluster;

    fn message_types(&self) -> &'static [&'static str];

    fn matches(&self, message: &Message) -> bool {
        self.cluster() == message.cluster && self.message_types().contains(&message.kind.as_str())
    }

    fn convert(&self, definition: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State>;
}

/// Inputs available to a `toZigbee` converter.
pub struct SetMeta<'a> {
    /// The whole requested change, converters may look at sibling keys.
    pub message: &'a State,
    pub state: &'a State,
    pub context: &'a Context,
    pub definition: &'a DefinitionMeta,
    pub endpoint_name: Option<&'a str>,
}

impl SetMeta<'_> {
    /// Transition time from the message in tenths of a second.
    pub fn transition_time(&self) -> u16 {
        self.message
            .get("transition")
            .and_then(Value::as_f64)
            .map(|seconds| (seconds * 10.0).round().clamp(0.0, f64::from(u16::MAX)) as u16)
            .unwrap_or(0)
    }

    pub fn has_transition(&self) -> bool {
        self.message.contains_key("transition")
    }

    /// `name`, suffixed with the endpoint name when there is one.
    pub fn property(&self, name: &str) -> String {
        match self.endpoint_name {
            Some(endpoint) => format!("{}_{}", name, endpoint),
            None => name.to_string(),
        }
    }
}

#[async_trait]
pub trait ToZigbee: Converter {
    /// Properties handled by this converter.
    fn keys(&self) -> &'static [&'static str];

    /// Apply `value` for `key`, returning the resulting state to publish.
    async fn convert_set(
        &self,
        _endpoint: &dyn Endpoint,
        key: &str,
        _value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        Err(DefinitionError::NoConverter(format!("set {}", key)))
    }

    /// Request a fresh value for `key`; the answer arrives as a message.
    async fn convert_get(&self, _endpoint: &dyn Endpoint, key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        Err(DefinitionError::NoConverter(format!("get {}", key)))
    }
}

/// Ordered set of converters keyed by id.
pub struct ConverterSet<T: ?Sized + 'static> {
    items: Vec<&'static T>,
}

pub type FromZigbeeSet = ConverterSet<dyn FromZigbee>;
pub type ToZigbeeSet = ConverterSet<dyn ToZigbee>;

impl<T: ?Sized + Converter> ConverterSet<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build from a list; later duplicates of an id are dropped.
    pub fn from_list(items: &[&'static T]) -> Self {
        let mut set = Self::new();
        for item in items {
            set.add(*item);
        }
        set
    }

    /// Append `converter` unless one with the same id is present.
    pub fn add(&mut self, converter: &'static T) -> bool {
        if self.contains(converter.id()) {
            return false;
        }
        self.items.push(converter);
        true
    }

    pub fn extend(&mut self, converters: &[&'static T]) {
        for converter in converters {
            self.add(*converter);
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Swap the converter `id` for `converter`, keeping its position.
    pub fn replace(&mut self, id: &str, converter: &'static T) -> bool {
        match self.position(id) {
            Some(index) => {
                self.items[index] = converter;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&'static T> {
        self.position(id).map(|index| self.items[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static T> + '_ {
        self.items.iter().copied()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.items.iter().map(|c| c.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|c| c.id() == id)
    }
}

impl<T: ?Sized + Converter> Default for ConverterSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for ConverterSet<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: ?Sized + Converter> fmt::Debug for ConverterSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ToZigbeeSet {
    /// First converter handling `key`.
    pub fn for_key(&self, key: &str) -> Option<&'static dyn ToZigbee> {
        self.iter().find(|c| c.keys().contains(&key))
    }

    /// Every key handled by any converter in the set.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        for converter in self.iter() {
            for key in converter.keys() {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }
}

/// Numeric value of `key`, rejecting anything else.
pub(crate) fn expect_number(key: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected a number, got {}", value)))
}

/// Round to `decimals` places.
pub(crate) fn precision_round(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::{from_zigbee as fz, to_zigbee as tz};

    #[test]
    fn test_set_keeps_order_and_identity() {
        let mut set = ToZigbeeSet::from_list(&[&tz::ON_OFF, &tz::EFFECT, &tz::READ]);
        assert_eq!(set.ids(), vec!["on_off", "effect", "read"]);

        assert!(!set.add(&tz::ON_OFF));
        assert_eq!(set.len(), 3);

        assert!(set.replace("effect", &tz::POWER_ON_BEHAVIOR));
        assert_eq!(set.ids(), vec!["on_off", "power_on_behavior", "read"]);

        assert!(set.remove("on_off"));
        assert!(!set.remove("on_off"));
        assert!(!set.contains("on_off"));
    }

    #[test]
    fn test_clones_are_independent() {
        let original = FromZigbeeSet::from_list(&[&fz::ON_OFF, &fz::BRIGHTNESS]);
        let mut copy = original.clone();
        copy.remove("brightness");
        assert_eq!(original.len(), 2);
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn test_for_key() {
        let set = ToZigbeeSet::from_list(&[&tz::LIGHT_ONOFF_BRIGHTNESS, &tz::ON_OFF]);
        assert_eq!(set.for_key("state").unwrap().id(), "light_onoff_brightness");
        assert!(set.for_key("color").is_none());
        assert!(set.keys().contains(&"brightness_percent"));
    }

    #[test]
    fn test_precision_round() {
        assert_eq!(precision_round(21.456, 2), 21.46);
        assert_eq!(precision_round(0.123456, 4), 0.1235);
    }
}
