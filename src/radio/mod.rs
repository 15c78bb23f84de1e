//! Handles supplied by the radio layer.
//!
//! The definitions never talk to a radio directly. Everything they need is
//! expressed through the [`Entity`], [`Endpoint`] and [`Device`] traits, which
//! the host bridge implements on top of its ZCL stack. Retries, transaction
//! ids and timeouts are the implementor's business.

mod recording;

pub use recording::{RadioCall, RecordingDevice, RecordingEndpoint};

use crate::cluster::Cluster;
use crate::error::Result;
use crate::reporting::ReportingPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Attribute name to value map, as returned by reads and passed to writes.
pub type AttributeValues = Map<String, Value>;

/// Anything the store or a bind can be keyed on.
///
/// `kind_name` is the kind reported by the radio layer. Only `Device`,
/// `Endpoint` and `Group` are understood, see [`crate::store::EntityKey`].
pub trait Entity: Send + Sync {
    fn kind_name(&self) -> &str;

    fn ieee_address(&self) -> Option<&str> {
        None
    }

    fn endpoint_id(&self) -> Option<u8> {
        None
    }

    fn group_id(&self) -> Option<u16> {
        None
    }
}

/// Zigbee logical device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Coordinator,
    Router,
    EndDevice,
}

/// Interview data of a single endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    #[serde(rename = "ID")]
    pub id: u8,
    #[serde(default)]
    pub profile_id: Option<u16>,
    #[serde(default)]
    pub device_id: Option<u16>,
    #[serde(default)]
    pub input_clusters: Vec<u16>,
    #[serde(default)]
    pub output_clusters: Vec<u16>,
}

impl EndpointInfo {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_input_clusters(mut self, clusters: &[Cluster]) -> Self {
        self.input_clusters = clusters.iter().map(|c| c.id()).collect();
        self
    }

    pub fn with_output_clusters(mut self, clusters: &[Cluster]) -> Self {
        self.output_clusters = clusters.iter().map(|c| c.id()).collect();
        self
    }

    pub fn supports_input_cluster(&self, cluster: Cluster) -> bool {
        self.input_clusters.contains(&cluster.id())
    }

    pub fn supports_output_cluster(&self, cluster: Cluster) -> bool {
        self.output_clusters.contains(&cluster.id())
    }
}

/// Interview data of a device: what the fingerprints are matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub ieee_addr: String,
    #[serde(default, rename = "modelID")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    #[serde(default, rename = "type")]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub power_source: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointInfo>,
}

impl DeviceInfo {
    pub fn new(ieee_addr: impl Into<String>) -> Self {
        Self {
            ieee_addr: ieee_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer_name = Some(manufacturer.into());
        self
    }

    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointInfo) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoint(&self, id: u8) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// A device endpoint, the unit all ZCL traffic is addressed to.
#[async_trait]
pub trait Endpoint: Entity {
    fn info(&self) -> &EndpointInfo;

    fn id(&self) -> u8 {
        self.info().id
    }

    fn supports_input_cluster(&self, cluster: Cluster) -> bool {
        self.info().supports_input_cluster(cluster)
    }

    fn supports_output_cluster(&self, cluster: Cluster) -> bool {
        self.info().supports_output_cluster(cluster)
    }

    /// Last known value of an attribute, as cached by the radio layer.
    fn cluster_attribute(&self, _cluster: Cluster, _attribute: &str) -> Option<Value> {
        None
    }

    /// Override cached attribute values (e.g. a multiplier the device reports wrong).
    fn save_cluster_attributes(&self, _cluster: Cluster, _values: AttributeValues) {}

    async fn bind(&self, cluster: Cluster, target: &dyn Entity) -> Result<()>;

    async fn read(&self, cluster: Cluster, attributes: &[&str]) -> Result<AttributeValues>;

    async fn write(&self, cluster: Cluster, attributes: AttributeValues) -> Result<()>;

    async fn configure_reporting(
        &self,
        cluster: Cluster,
        items: &[ReportingPayload],
    ) -> Result<()>;

    async fn command(&self, cluster: Cluster, command: &str, payload: Value) -> Result<()>;
}

/// A joined device.
pub trait Device: Entity {
    fn info(&self) -> &DeviceInfo;

    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>>;

    fn endpoint(&self, id: u8) -> Option<Arc<dyn Endpoint>> {
        self.endpoints().into_iter().find(|e| e.id() == id)
    }
}

/// A Zigbee group, only usable as store key or bind target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRef {
    pub group_id: u16,
}

impl GroupRef {
    pub fn new(group_id: u16) -> Self {
        Self { group_id }
    }
}

impl Entity for GroupRef {
    fn kind_name(&self) -> &str {
        "Group"
    }

    fn group_id(&self) -> Option<u16> {
        Some(self.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_from_interview_json() {
        let json = r#"{
            "ieeeAddr": "0x00124b0012345678",
            "modelID": "GL-H-001",
            "manufacturerName": "GLEDOPTO",
            "type": "Router",
            "endpoints": [
                {"ID": 11, "profileId": 49246, "deviceId": 528, "inputClusters": [0, 6, 8], "outputClusters": []}
            ]
        }"#;
        let info: DeviceInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.model_id.as_deref(), Some("GL-H-001"));
        assert_eq!(info.device_type, Some(DeviceType::Router));
        let ep = info.endpoint(11).unwrap();
        assert!(ep.supports_input_cluster(Cluster::GenOnOff));
        assert!(!ep.supports_input_cluster(Cluster::LightingColorCtrl));
    }

    #[test]
    fn test_group_ref_is_group_entity() {
        let group = GroupRef::new(901);
        assert_eq!(group.kind_name(), "Group");
        assert_eq!(group.group_id(), Some(901));
        assert_eq!(group.ieee_address(), None);
    }
}
