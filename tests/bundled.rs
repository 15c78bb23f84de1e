use std::collections::HashSet;
use zigbee_definitions::radio::{DeviceInfo, DeviceType, EndpointInfo, RecordingDevice, RecordingEndpoint};
use zigbee_definitions::{Cluster, Context, MatchPolicy, Registry, devices};

fn gledopto_endpoints(info: DeviceInfo, device_id: u16) -> DeviceInfo {
    let mut light = EndpointInfo::new(11).with_input_clusters(&[
        Cluster::GenBasic,
        Cluster::GenIdentify,
        Cluster::GenGroups,
        Cluster::GenScenes,
        Cluster::GenOnOff,
        Cluster::GenLevelCtrl,
        Cluster::LightingColorCtrl,
    ]);
    light.profile_id = Some(49246);
    light.device_id = Some(device_id);

    let mut touchlink = EndpointInfo::new(13)
        .with_input_clusters(&[Cluster::Touchlink])
        .with_output_clusters(&[Cluster::Touchlink]);
    touchlink.profile_id = Some(49246);
    touchlink.device_id = Some(57694);

    info.with_endpoint(light).with_endpoint(touchlink)
}

#[test]
fn test_bundled_definitions_load() {
    let definitions = devices::all_definitions().unwrap();
    let mut models = HashSet::new();
    for definition in &definitions {
        assert!(models.insert(definition.model.clone()), "duplicate {}", definition.model);
        definition.validate().unwrap();
    }

    let registry = Registry::with_bundled(MatchPolicy::MostSpecific).unwrap();
    assert_eq!(registry.len(), definitions.len());
    for vendor in ["Gledopto", "LEDVANCE", "Develco"] {
        assert!(registry.iter().any(|d| d.vendor == vendor), "no {} records", vendor);
    }
}

#[test]
fn test_generic_gledopto_model_id_is_resolved_by_endpoints() {
    let registry = Registry::with_bundled(MatchPolicy::MostSpecific).unwrap();
    let base = DeviceInfo::new("0x00124b0012345678")
        .with_model_id("GLEDOPTO")
        .with_manufacturer("GLEDOPTO")
        .with_type(DeviceType::Router);

    let resolved = registry.find_by_device(&gledopto_endpoints(base.clone(), 544)).unwrap();
    assert_eq!(resolved.model(), "GL-C-006");
    let resolved = registry.find_by_device(&gledopto_endpoints(base.clone(), 528)).unwrap();
    assert_eq!(resolved.model(), "GL-C-008-1ID");
    assert!(registry.find_by_device(&gledopto_endpoints(base, 999)).is_none());
}

#[test]
fn test_bundled_lookups() {
    let registry = Registry::with_bundled(MatchPolicy::default()).unwrap();
    assert_eq!(registry.find_by_model("smrzb-143").unwrap().model, "SMRZB-143");
    assert_eq!(registry.find_by_model("Panel TW Z3").unwrap().vendor, "LEDVANCE");

    let label = registry.find_by_name("GL-C-001P").unwrap();
    assert_eq!(label.vendor(), "Gledopto");
    assert_eq!(label.definition.model, "GL-C-008P");
}

#[test]
fn test_dry_run_configure() {
    let registry = Registry::with_bundled(MatchPolicy::default()).unwrap();
    let definition = registry.find_by_model("SMRZB-143").unwrap();
    let device = RecordingDevice::new(
        DeviceInfo::new("0x0015bc001b000001")
            .with_endpoint(EndpointInfo::new(2).with_input_clusters(&[Cluster::GenOnOff, Cluster::SeMetering])),
    );

    tokio_test::block_on(definition.run_configure(
        &device,
        &RecordingEndpoint::coordinator(),
        &Context::default(),
    ))
    .unwrap();

    let calls = device.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|(endpoint, _)| *endpoint == 2));
}
