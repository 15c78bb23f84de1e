//! Radio handles that record instead of transmitting.
//!
//! Used for dry-running `configure` procedures from the CLI and as the test
//! double for the converter and reporting code. Every operation is appended to
//! a call log; reads are answered from a per-cluster attribute table.

use super::{AttributeValues, Device, DeviceInfo, Endpoint, EndpointInfo, Entity};
use crate::cluster::Cluster;
use crate::error::{DefinitionError, Result};
use crate::reporting::ReportingPayload;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Coordinator IEEE address used as bind target in dry runs.
pub const COORDINATOR_IEEE: &str = "0x0000000000000000";

/// One recorded radio operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RadioCall {
    Bind {
        cluster: Cluster,
        target: String,
    },
    Read {
        cluster: Cluster,
        attributes: Vec<String>,
    },
    Write {
        cluster: Cluster,
        attributes: AttributeValues,
    },
    ConfigureReporting {
        cluster: Cluster,
        items: Vec<ReportingPayload>,
    },
    Command {
        cluster: Cluster,
        command: String,
        payload: Value,
    },
}

impl RadioCall {
    pub fn cluster(&self) -> Cluster {
        match self {
            RadioCall::Bind { cluster, .. }
            | RadioCall::Read { cluster, .. }
            | RadioCall::Write { cluster, .. }
            | RadioCall::ConfigureReporting { cluster, .. }
            | RadioCall::Command { cluster, .. } => *cluster,
        }
    }
}

fn describe(entity: &dyn Entity) -> String {
    match (entity.ieee_address(), entity.endpoint_id(), entity.group_id()) {
        (Some(ieee), Some(id), _) => format!("{}/{}", ieee, id),
        (Some(ieee), None, _) => ieee.to_string(),
        (_, _, Some(group)) => format!("group {}", group),
        _ => entity.kind_name().to_string(),
    }
}

/// Endpoint that records every operation.
pub struct RecordingEndpoint {
    ieee_addr: String,
    info: EndpointInfo,
    calls: Mutex<Vec<RadioCall>>,
    attributes: RwLock<HashMap<Cluster, AttributeValues>>,
    failing: RwLock<HashSet<Cluster>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
}

impl RecordingEndpoint {
    pub fn new(ieee_addr: impl Into<String>, info: EndpointInfo) -> Self {
        Self {
            ieee_addr: ieee_addr.into(),
            info,
            calls: Mutex::new(Vec::new()),
            attributes: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// The coordinator endpoint, target of configure binds.
    pub fn coordinator() -> Self {
        Self::new(COORDINATOR_IEEE, EndpointInfo::new(1))
    }

    /// Make every operation suspend for `latency` before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Preload attribute values answered by `read`.
    pub fn with_attribute(self, cluster: Cluster, attribute: &str, value: Value) -> Self {
        self.attributes
            .write()
            .entry(cluster)
            .or_default()
            .insert(attribute.to_string(), value);
        self
    }

    /// Make every operation on `cluster` fail, like an unsupported attribute would.
    pub fn fail_cluster(&self, cluster: Cluster) {
        self.failing.write().insert(cluster);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().clone()
    }

    pub fn take_calls(&self) -> Vec<RadioCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Number of operations that started while another one was still in flight.
    pub fn overlapping_calls(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    async fn perform(&self, call: RadioCall) -> Result<()> {
        let cluster = call.cluster();
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.read().contains(&cluster) {
            return Err(DefinitionError::Radio(format!(
                "{} on endpoint {} responded UNSUPPORTED_ATTRIBUTE",
                cluster, self.info.id
            )));
        }
        Ok(())
    }
}

impl Entity for RecordingEndpoint {
    fn kind_name(&self) -> &str {
        "Endpoint"
    }

    fn ieee_address(&self) -> Option<&str> {
        Some(&self.ieee_addr)
    }

    fn endpoint_id(&self) -> Option<u8> {
        Some(self.info.id)
    }
}

#[async_trait]
impl Endpoint for RecordingEndpoint {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn cluster_attribute(&self, cluster: Cluster, attribute: &str) -> Option<Value> {
        self.attributes
            .read()
            .get(&cluster)
            .and_then(|values| values.get(attribute).cloned())
    }

    fn save_cluster_attributes(&self, cluster: Cluster, values: AttributeValues) {
        self.attributes
            .write()
            .entry(cluster)
            .or_default()
            .extend(values);
    }

    async fn bind(&self, cluster: Cluster, target: &dyn Entity) -> Result<()> {
        self.perform(RadioCall::Bind {
            cluster,
            target: describe(target),
        })
        .await
    }

    async fn read(&self, cluster: Cluster, attributes: &[&str]) -> Result<AttributeValues> {
        self.perform(RadioCall::Read {
            cluster,
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        })
        .await?;

        let table = self.attributes.read();
        let mut values = AttributeValues::new();
        if let Some(known) = table.get(&cluster) {
            for attribute in attributes {
                if let Some(value) = known.get(*attribute) {
                    values.insert(attribute.to_string(), value.clone());
                }
            }
        }
        Ok(values)
    }

    async fn write(&self, cluster: Cluster, attributes: AttributeValues) -> Result<()> {
        self.perform(RadioCall::Write {
            cluster,
            attributes: attributes.clone(),
        })
        .await?;
        self.save_cluster_attributes(cluster, attributes);
        Ok(())
    }

    async fn configure_reporting(
        &self,
        cluster: Cluster,
        items: &[ReportingPayload],
    ) -> Result<()> {
        self.perform(RadioCall::ConfigureReporting {
            cluster,
            items: items.to_vec(),
        })
        .await
    }

    async fn command(&self, cluster: Cluster, command: &str, payload: Value) -> Result<()> {
        self.perform(RadioCall::Command {
            cluster,
            command: command.to_string(),
            payload,
        })
        .await
    }
}

/// Device whose endpoints are all [`RecordingEndpoint`]s.
pub struct RecordingDevice {
    info: DeviceInfo,
    endpoints: Vec<Arc<RecordingEndpoint>>,
}

impl RecordingDevice {
    /// Create recording endpoints for every endpoint listed in the interview data.
    pub fn new(info: DeviceInfo) -> Self {
        let endpoints = info
            .endpoints
            .iter()
            .map(|e| Arc::new(RecordingEndpoint::new(info.ieee_addr.clone(), e.clone())))
            .collect();
        Self { info, endpoints }
    }

    /// Use pre-built endpoints (e.g. with preloaded attributes or latency).
    pub fn with_endpoints(info: DeviceInfo, endpoints: Vec<Arc<RecordingEndpoint>>) -> Self {
        Self { info, endpoints }
    }

    pub fn recording_endpoint(&self, id: u8) -> Option<Arc<RecordingEndpoint>> {
        self.endpoints.iter().find(|e| e.info.id == id).cloned()
    }

    /// All calls of all endpoints, grouped by endpoint id in endpoint order.
    pub fn calls(&self) -> Vec<(u8, RadioCall)> {
        self.endpoints
            .iter()
            .flat_map(|e| e.calls().into_iter().map(|c| (e.info.id, c)))
            .collect()
    }
}

impl Entity for RecordingDevice {
    fn kind_name(&self) -> &str {
        "Device"
    }

    fn ieee_address(&self) -> Option<&str> {
        Some(&self.info.ieee_addr)
    }
}

impl Device for RecordingDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>> {
        self.endpoints
            .iter()
            .map(|e| e.clone() as Arc<dyn Endpoint>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_answers_from_attribute_table() {
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1)).with_attribute(
            Cluster::GenOnOff,
            "onOff",
            json!(1),
        );

        let values = endpoint
            .read(Cluster::GenOnOff, &["onOff", "startUpOnOff"])
            .await
            .unwrap();
        assert_eq!(values.get("onOff"), Some(&json!(1)));
        assert!(!values.contains_key("startUpOnOff"));
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_cluster_still_records() {
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1));
        endpoint.fail_cluster(Cluster::SeMetering);

        let result = endpoint.read(Cluster::SeMetering, &["divisor"]).await;
        assert!(matches!(result, Err(DefinitionError::Radio(_))));
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_write_updates_cache() {
        let endpoint = RecordingEndpoint::new("0x01", EndpointInfo::new(1));
        let mut attrs = AttributeValues::new();
        attrs.insert("startUpOnOff".into(), json!(255));
        endpoint.write(Cluster::GenOnOff, attrs).await.unwrap();

        assert_eq!(
            endpoint.cluster_attribute(Cluster::GenOnOff, "startUpOnOff"),
            Some(json!(255))
        );
    }

    #[test]
    fn test_bind_target_description() {
        let coordinator = RecordingEndpoint::coordinator();
        assert_eq!(describe(&coordinator), "0x0000000000000000/1");
        assert_eq!(describe(&super::super::GroupRef::new(3)), "group 3");
    }
}
