//! Definition registry and device resolution.

use crate::config::MatchPolicy;
use crate::converters::to_zigbee as tz;
use crate::definition::{Definition, WhiteLabel};
use crate::error::Result;
use crate::exposes::presets;
use crate::fingerprint::Fingerprint;
use crate::radio::DeviceInfo;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Normalize a model id for lookup: lowercase, anything from the first NUL cut off.
fn lookup_key(model_id: &str) -> String {
    let trimmed = match model_id.find('\0') {
        Some(index) => &model_id[..index],
        None => model_id,
    };
    trimmed.trim().to_lowercase()
}

/// A resolved definition, possibly sold under a white label.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub definition: Arc<Definition>,
    pub white_label: Option<WhiteLabel>,
}

impl Resolved {
    pub fn model(&self) -> &str {
        match &self.white_label {
            Some(label) => &label.model,
            None => &self.definition.model,
        }
    }

    pub fn vendor(&self) -> &str {
        match &self.white_label {
            Some(label) => &label.vendor,
            None => &self.definition.vendor,
        }
    }

    pub fn description(&self) -> &str {
        match &self.white_label {
            Some(WhiteLabel {
                description: Some(description),
                ..
            }) => description,
            _ => &self.definition.description,
        }
    }
}

/// One fingerprint hit while resolving a device.
struct Candidate<'a> {
    index: usize,
    fingerprint: &'a Fingerprint,
    white_label: Option<&'a WhiteLabel>,
}

impl Candidate<'_> {
    fn rank(&self) -> (i32, usize) {
        (self.fingerprint.priority.unwrap_or(0), self.fingerprint.specificity())
    }
}

/// Every known definition, indexed by lowercase model id.
pub struct Registry {
    definitions: Vec<Arc<Definition>>,
    lookup: HashMap<String, Vec<usize>>,
    /// Definitions with a fingerprint lacking `model_id`, candidates for any device.
    unkeyed: Vec<usize>,
    policy: MatchPolicy,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(MatchPolicy::default())
    }
}

impl Registry {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            definitions: Vec::new(),
            lookup: HashMap::new(),
            unkeyed: Vec::new(),
            policy,
        }
    }

    /// Registry holding every bundled definition.
    pub fn with_bundled(policy: MatchPolicy) -> Result<Self> {
        let mut registry = Self::new(policy);
        for definition in crate::devices::all_definitions()? {
            registry.add(definition)?;
        }
        info!("Loaded {} definitions", registry.len());
        Ok(registry)
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.definitions.iter()
    }

    /// Complete, validate and index a definition.
    ///
    /// Every definition gains the generic `read`/`write` converters and a
    /// `linkquality` expose.
    pub fn add(&mut self, mut definition: Definition) -> Result<()> {
        definition.to_zigbee.extend(&[&tz::READ, &tz::WRITE]);
        if !definition
            .exposes
            .iter()
            .any(|e| e.name.as_deref() == Some("linkquality"))
        {
            definition.exposes.push(presets::linkquality());
        }
        definition.validate()?;

        let index = self.definitions.len();
        let mut keys: Vec<String> = Vec::new();
        let fingerprints = definition
            .fingerprint
            .iter()
            .chain(definition.white_label.iter().flat_map(|w| w.fingerprint.iter()));
        for fingerprint in fingerprints {
            match &fingerprint.model_id {
                Some(model_id) => keys.push(lookup_key(model_id)),
                None => {
                    if !self.unkeyed.contains(&index) {
                        self.unkeyed.push(index);
                    }
                }
            }
        }
        keys.extend(definition.zigbee_model.iter().map(|m| lookup_key(m)));

        for key in keys {
            let entries = self.lookup.entry(key).or_default();
            if !entries.contains(&index) {
                entries.push(index);
            }
        }
        debug!("Registered '{}' ({})", definition.model, definition.vendor);
        self.definitions.push(Arc::new(definition));
        Ok(())
    }

    fn candidates(&self, model_id: Option<&str>) -> Vec<usize> {
        let mut indexes: Vec<usize> = model_id
            .and_then(|m| self.lookup.get(&lookup_key(m)))
            .cloned()
            .unwrap_or_default();
        for index in &self.unkeyed {
            if !indexes.contains(index) {
                indexes.push(*index);
            }
        }
        indexes.sort_unstable();
        indexes
    }

    /// Definition registered for `model`, the first registered one on collisions.
    pub fn find_by_model(&self, model: &str) -> Option<Arc<Definition>> {
        self.lookup
            .get(&lookup_key(model))
            .and_then(|indexes| indexes.first())
            .map(|index| self.definitions[*index].clone())
    }

    /// Definition whose model or white label model is `model`, case-insensitive.
    pub fn find_by_name(&self, model: &str) -> Option<Resolved> {
        for definition in &self.definitions {
            if definition.model.eq_ignore_ascii_case(model) {
                return Some(Resolved {
                    definition: definition.clone(),
                    white_label: None,
                });
            }
            if let Some(label) = definition
                .white_label
                .iter()
                .find(|w| w.model.eq_ignore_ascii_case(model))
            {
                return Some(Resolved {
                    definition: definition.clone(),
                    white_label: Some(label.clone()),
                });
            }
        }
        None
    }

    /// Resolve an interviewed device.
    ///
    /// Fingerprints are tried first, chosen according to the match policy;
    /// definitions listing the model id in `zigbee_model` are the fallback.
    pub fn find_by_device(&self, device: &DeviceInfo) -> Option<Resolved> {
        let indexes = self.candidates(device.model_id.as_deref());

        let mut matches: Vec<Candidate<'_>> = Vec::new();
        for index in &indexes {
            let definition = &self.definitions[*index];
            for fingerprint in &definition.fingerprint {
                if fingerprint.matches(device) {
                    matches.push(Candidate {
                        index: *index,
                        fingerprint,
                        white_label: None,
                    });
                }
            }
            for label in &definition.white_label {
                for fingerprint in &label.fingerprint {
                    if fingerprint.matches(device) {
                        matches.push(Candidate {
                            index: *index,
                            fingerprint,
                            white_label: Some(label),
                        });
                    }
                }
            }
        }

        if let Some(chosen) = self.choose(&matches, device) {
            return Some(Resolved {
                definition: self.definitions[chosen.index].clone(),
                white_label: chosen.white_label.cloned(),
            });
        }

        let model_id = device.model_id.as_deref()?;
        let key = lookup_key(model_id);
        indexes
            .iter()
            .map(|index| &self.definitions[*index])
            .find(|definition| definition.zigbee_model.iter().any(|m| lookup_key(m) == key))
            .map(|definition| Resolved {
                definition: definition.clone(),
                white_label: None,
            })
    }

    fn choose<'a>(&self, matches: &'a [Candidate<'a>], device: &DeviceInfo) -> Option<&'a Candidate<'a>> {
        let first = matches.first()?;
        let chosen = match self.policy {
            MatchPolicy::FirstRegistered => first,
            MatchPolicy::MostSpecific => {
                // Keeps the earliest of equally ranked matches
                matches
                    .iter()
                    .fold(first, |best, candidate| if candidate.rank() > best.rank() { candidate } else { best })
            }
        };

        let ambiguous = matches
            .iter()
            .any(|c| c.index != chosen.index && c.rank() == chosen.rank());
        if ambiguous {
            warn!(
                "Device {} matches several definitions equally well, using '{}'",
                device.ieee_addr, self.definitions[chosen.index].model
            );
        }
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::{from_zigbee as fz, to_zigbee as tz};
    use crate::fingerprint::EndpointFingerprint;
    use crate::radio::EndpointInfo;

    fn plug(model: &str) -> Definition {
        Definition::new(model, "Test", "Smart plug")
            .with_exposes(vec![presets::switch()])
            .with_from_zigbee(&[&fz::ON_OFF])
            .with_to_zigbee(&[&tz::ON_OFF])
    }

    fn device(model_id: &str, endpoints: &[u8]) -> DeviceInfo {
        let mut info = DeviceInfo::new("0x00124b0001a2b3c4").with_model_id(model_id);
        for id in endpoints {
            info = info.with_endpoint(EndpointInfo::new(*id));
        }
        info
    }

    #[test]
    fn test_add_completes_definition() {
        let mut registry = Registry::default();
        registry.add(plug("PLUG-1").with_zigbee_model(&["plug1"])).unwrap();

        let definition = registry.find_by_model("plug1").unwrap();
        assert!(definition.to_zigbee.contains("read"));
        assert!(definition.to_zigbee.contains("write"));
        assert_eq!(
            definition
                .exposes
                .iter()
                .filter(|e| e.name.as_deref() == Some("linkquality"))
                .count(),
            1
        );
    }

    #[test]
    fn test_add_rejects_invalid_definition() {
        let mut registry = Registry::default();
        assert!(registry.add(plug("PLUG-1")).is_err());
        assert!(
            registry
                .add(
                    Definition::new("PLUG-2", "Test", "Plug")
                        .with_zigbee_model(&["plug2"])
                        .with_exposes(vec![presets::switch()])
                )
                .is_err()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_strips_nul() {
        let mut registry = Registry::default();
        registry.add(plug("PLUG-1").with_zigbee_model(&["Plug1"])).unwrap();

        assert!(registry.find_by_model("PLUG1").is_some());
        assert!(registry.find_by_model("plug1\0\0\0").is_some());
        assert!(registry.find_by_device(&device("plug1\0garbage", &[1])).is_some());
        assert!(registry.find_by_model("plug2").is_none());
    }

    #[test]
    fn test_fingerprint_wins_over_zigbee_model() {
        let mut registry = Registry::default();
        registry.add(plug("BY-MODEL").with_zigbee_model(&["shared"])).unwrap();
        registry
            .add(
                plug("BY-FINGERPRINT").with_fingerprint(
                    Fingerprint::model("shared").with_endpoint(EndpointFingerprint::new(11)),
                ),
            )
            .unwrap();

        let resolved = registry.find_by_device(&device("shared", &[11])).unwrap();
        assert_eq!(resolved.model(), "BY-FINGERPRINT");
        let resolved = registry.find_by_device(&device("shared", &[1])).unwrap();
        assert_eq!(resolved.model(), "BY-MODEL");
    }

    #[test]
    fn test_match_policies() {
        let definitions = || {
            vec![
                plug("LOOSE").with_fingerprint(Fingerprint::model("overlap")),
                plug("STRICT").with_fingerprint(
                    Fingerprint::model("overlap")
                        .with_manufacturer("ACME")
                        .with_endpoint(EndpointFingerprint::new(1)),
                ),
            ]
        };
        let info = device("overlap", &[1]).with_manufacturer("ACME");

        let mut first = Registry::new(MatchPolicy::FirstRegistered);
        let mut specific = Registry::new(MatchPolicy::MostSpecific);
        for definition in definitions() {
            first.add(definition.clone()).unwrap();
            specific.add(definition).unwrap();
        }

        assert_eq!(first.find_by_device(&info).unwrap().model(), "LOOSE");
        assert_eq!(specific.find_by_device(&info).unwrap().model(), "STRICT");
        // Only the loose fingerprint matches another manufacturer
        let other = device("overlap", &[1]).with_manufacturer("Other");
        assert_eq!(specific.find_by_device(&other).unwrap().model(), "LOOSE");
    }

    #[test]
    fn test_priority_beats_specificity() {
        let mut registry = Registry::new(MatchPolicy::MostSpecific);
        registry
            .add(plug("STRICT").with_fingerprint(Fingerprint::model("m").with_manufacturer("ACME")))
            .unwrap();
        registry
            .add(plug("PREFERRED").with_fingerprint(Fingerprint::model("m").with_priority(1)))
            .unwrap();

        let info = device("m", &[1]).with_manufacturer("ACME");
        assert_eq!(registry.find_by_device(&info).unwrap().model(), "PREFERRED");
    }

    #[test]
    fn test_equal_rank_goes_to_first_registered() {
        let mut registry = Registry::new(MatchPolicy::MostSpecific);
        registry.add(plug("A").with_fingerprint(Fingerprint::model("same"))).unwrap();
        registry.add(plug("B").with_fingerprint(Fingerprint::model("same"))).unwrap();
        assert_eq!(registry.find_by_device(&device("same", &[1])).unwrap().model(), "A");
    }

    #[test]
    fn test_unkeyed_fingerprint_matches_any_model() {
        let mut registry = Registry::default();
        registry
            .add(plug("BY-MANUFACTURER").with_fingerprint(Fingerprint {
                manufacturer_name: Some("ACME".to_string()),
                ..Default::default()
            }))
            .unwrap();

        let info = device("whatever", &[1]).with_manufacturer("ACME");
        assert_eq!(registry.find_by_device(&info).unwrap().model(), "BY-MANUFACTURER");
        assert!(registry.find_by_device(&device("whatever", &[1])).is_none());
    }

    #[test]
    fn test_white_label() {
        let mut registry = Registry::default();
        registry
            .add(plug("PLUG-1").with_zigbee_model(&["plug1"]).with_white_label(WhiteLabel {
                vendor: "Rebrand".to_string(),
                model: "RB-1".to_string(),
                description: None,
                fingerprint: vec![Fingerprint::model("plug1").with_manufacturer("Rebrand")],
            }))
            .unwrap();

        let original = registry.find_by_device(&device("plug1", &[1])).unwrap();
        assert_eq!(original.model(), "PLUG-1");
        assert!(original.white_label.is_none());

        let label = registry
            .find_by_device(&device("plug1", &[1]).with_manufacturer("Rebrand"))
            .unwrap();
        assert_eq!(label.model(), "RB-1");
        assert_eq!(label.vendor(), "Rebrand");
        assert_eq!(label.description(), "Smart plug");
        assert_eq!(registry.find_by_name("rb-1").unwrap().model(), "RB-1");
    }

    #[test]
    fn test_unknown_device() {
        let registry = Registry::default();
        assert!(registry.find_by_device(&DeviceInfo::new("0x01")).is_none());
    }
}
