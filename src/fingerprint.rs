//! Structured device identity predicates.

use crate::radio::{DeviceInfo, DeviceType, EndpointInfo};
use serde::{Deserialize, Serialize};

/// Matches a device on its interview data. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fingerprint {
    #[serde(rename = "modelID", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<EndpointFingerprint>>,
    /// Higher wins when several fingerprints match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointFingerprint {
    #[serde(rename = "ID")]
    pub id: u8,
    #[serde(rename = "profileID", skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<u16>,
    #[serde(rename = "deviceID", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_clusters: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_clusters: Option<Vec<u16>>,
}

fn same_set<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

fn field_matches<T: PartialEq>(expected: &Option<T>, actual: Option<&T>) -> bool {
    match expected {
        Some(expected) => actual == Some(expected),
        None => true,
    }
}

impl Fingerprint {
    pub fn model(model_id: &str) -> Self {
        Self {
            model_id: Some(model_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer_name = Some(manufacturer.to_string());
        self
    }

    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointFingerprint) -> Self {
        self.endpoints.get_or_insert_with(Vec::new).push(endpoint);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn matches(&self, device: &DeviceInfo) -> bool {
        let fields = field_matches(&self.model_id, device.model_id.as_ref())
            && field_matches(&self.manufacturer_name, device.manufacturer_name.as_ref())
            && field_matches(&self.device_type, device.device_type.as_ref())
            && field_matches(&self.power_source, device.power_source.as_ref());
        if !fields {
            return false;
        }

        let Some(endpoints) = &self.endpoints else {
            return true;
        };
        let expected_ids: Vec<u8> = endpoints.iter().map(|e| e.id).collect();
        let actual_ids: Vec<u8> = device.endpoints.iter().map(|e| e.id).collect();
        if !same_set(&expected_ids, &actual_ids) {
            return false;
        }

        endpoints
            .iter()
            .all(|expected| device.endpoint(expected.id).is_some_and(|actual| expected.matches(actual)))
    }

    /// Number of constrained fields, used to rank overlapping fingerprints.
    pub fn specificity(&self) -> usize {
        let fields = [
            self.model_id.is_some(),
            self.manufacturer_name.is_some(),
            self.device_type.is_some(),
            self.power_source.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        let endpoints = self
            .endpoints
            .as_ref()
            .map(|endpoints| 1 + endpoints.iter().map(EndpointFingerprint::specificity).sum::<usize>())
            .unwrap_or(0);
        fields + endpoints
    }
}

impl EndpointFingerprint {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_profile(mut self, profile_id: u16) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    pub fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn with_input_clusters(mut self, clusters: &[u16]) -> Self {
        self.input_clusters = Some(clusters.to_vec());
        self
    }

    pub fn with_output_clusters(mut self, clusters: &[u16]) -> Self {
        self.output_clusters = Some(clusters.to_vec());
        self
    }

    fn matches(&self, endpoint: &EndpointInfo) -> bool {
        field_matches(&self.profile_id, endpoint.profile_id.as_ref())
            && field_matches(&self.device_id, endpoint.device_id.as_ref())
            && self
                .input_clusters
                .as_ref()
                .is_none_or(|clusters| same_set(clusters, &endpoint.input_clusters))
            && self
                .output_clusters
                .as_ref()
                .is_none_or(|clusters| same_set(clusters, &endpoint.output_clusters))
    }

    fn specificity(&self) -> usize {
        [
            self.profile_id.is_some(),
            self.device_id.is_some(),
            self.input_clusters.is_some(),
            self.output_clusters.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceInfo {
        let mut info = DeviceInfo::new("0x01")
            .with_model_id("GL-C-006")
            .with_manufacturer("GLEDOPTO")
            .with_type(DeviceType::Router);
        info.endpoints = vec![
            EndpointInfo {
                id: 11,
                profile_id: Some(49246),
                device_id: Some(544),
                input_clusters: vec![0, 3, 4, 5, 6, 8, 768],
                output_clusters: vec![],
            },
            EndpointInfo {
                id: 13,
                profile_id: Some(49246),
                device_id: Some(57694),
                input_clusters: vec![4096],
                output_clusters: vec![4096],
            },
        ];
        info
    }

    #[test]
    fn test_fields_must_all_match() {
        assert!(Fingerprint::model("GL-C-006").matches(&device()));
        assert!(
            Fingerprint::model("GL-C-006")
                .with_manufacturer("GLEDOPTO")
                .with_type(DeviceType::Router)
                .matches(&device())
        );
        assert!(!Fingerprint::model("GL-C-006").with_type(DeviceType::EndDevice).matches(&device()));
        assert!(!Fingerprint::model("GL-C-007").matches(&device()));
    }

    #[test]
    fn test_endpoints_are_order_insensitive() {
        let fingerprint = Fingerprint::model("GL-C-006")
            .with_endpoint(EndpointFingerprint::new(13).with_input_clusters(&[4096]))
            .with_endpoint(
                EndpointFingerprint::new(11)
                    .with_device_id(544)
                    .with_input_clusters(&[768, 8, 6, 5, 4, 3, 0]),
            );
        assert!(fingerprint.matches(&device()));
    }

    #[test]
    fn test_endpoint_id_set_must_be_equal() {
        let fingerprint =
            Fingerprint::model("GL-C-006").with_endpoint(EndpointFingerprint::new(11).with_device_id(544));
        assert!(!fingerprint.matches(&device()));
    }

    #[test]
    fn test_cluster_lists_discriminate() {
        let fingerprint = Fingerprint::model("GL-C-006")
            .with_endpoint(EndpointFingerprint::new(11).with_input_clusters(&[0, 3, 4, 5, 6, 8]))
            .with_endpoint(EndpointFingerprint::new(13));
        assert!(!fingerprint.matches(&device()));
    }

    #[test]
    fn test_specificity() {
        let loose = Fingerprint::model("GL-C-006");
        let strict = Fingerprint::model("GL-C-006")
            .with_manufacturer("GLEDOPTO")
            .with_endpoint(EndpointFingerprint::new(11).with_device_id(544))
            .with_endpoint(EndpointFingerprint::new(13));
        assert_eq!(loose.specificity(), 1);
        assert_eq!(strict.specificity(), 4);
    }

    #[test]
    fn test_deserialize_herdsman_shape() {
        let json = r#"{"modelID": "GL-C-006", "endpoints": [{"ID": 11, "profileID": 49246, "inputClusters": [0, 6]}]}"#;
        let fingerprint: Fingerprint = serde_json::from_str(json).unwrap();
        let endpoints = fingerprint.endpoints.unwrap();
        assert_eq!(endpoints[0].profile_id, Some(49246));
        assert_eq!(endpoints[0].input_clusters, Some(vec![0, 6]));
        assert_eq!(endpoints[0].output_clusters, None);
    }
}
