use serde_json::{Value, json};
use zigbee_definitions::converters::{ConvertMeta, Message, State};
use zigbee_definitions::exposes::ExposeKind;
use zigbee_definitions::radio::{DeviceInfo, EndpointInfo, RadioCall, RecordingEndpoint};
use zigbee_definitions::{Cluster, Context, Definition, Extend, LightOptions, Registry, SwitchOptions};

fn rgbcct_light() -> Definition {
    let options: LightOptions =
        serde_json::from_value(json!({"colorTempRange": [153, 500], "supportsHS": true})).unwrap();
    Definition::new("TEST-RGBCCT", "Test", "RGB+CCT light")
        .with_zigbee_model(&["test_rgbcct"])
        .with_extend(Extend::light_onoff_brightness_colortemp_color(options))
}

#[test]
fn test_light_definition_end_to_end() {
    let mut registry = Registry::default();
    registry.add(rgbcct_light()).unwrap();

    let device = DeviceInfo::new("0x00158d0001a2b3c4")
        .with_model_id("TEST_RGBCCT")
        .with_endpoint(EndpointInfo::new(1));
    let resolved = registry.find_by_device(&device).unwrap();
    let definition = &resolved.definition;
    assert!(definition.meta.supports_hs);

    let light = definition
        .exposes
        .iter()
        .find(|e| e.kind == ExposeKind::Light)
        .unwrap();
    let color_temp = light.feature("color_temp").unwrap();
    assert_eq!(color_temp.value_min, Some(153.0));
    assert_eq!(color_temp.value_max, Some(500.0));
    assert!(light.has_feature("color_xy"));
    assert!(light.has_feature("color_hs"));

    let state = State::new();
    let message = Message::attribute_report(
        Cluster::GenLevelCtrl,
        json!({"currentLevel": 128}).as_object().cloned().unwrap(),
    );
    let update = definition.process_message(&message, &ConvertMeta::new(&state));
    assert_eq!(Value::Object(update), json!({"brightness": 128}));
}

#[tokio::test]
async fn test_switch_set_and_report() {
    let mut registry = Registry::default();
    registry
        .add(
            Definition::new("TEST-SWITCH", "Test", "Wall switch")
                .with_zigbee_model(&["test_switch"])
                .with_extend(Extend::switch(SwitchOptions::default())),
        )
        .unwrap();
    let definition = registry.find_by_model("test_switch").unwrap();

    let endpoint = RecordingEndpoint::new(
        "0x01",
        EndpointInfo::new(1).with_input_clusters(&[Cluster::GenOnOff]),
    );
    let message = json!({"state": "ON"}).as_object().cloned().unwrap();
    let result = definition
        .set(&endpoint, &message, &State::new(), &Context::default())
        .await
        .unwrap();
    assert_eq!(result.get("state"), Some(&json!("ON")));
    assert_eq!(
        endpoint.calls(),
        vec![RadioCall::Command {
            cluster: Cluster::GenOnOff,
            command: "on".to_string(),
            payload: json!({}),
        }]
    );

    let report = Message::attribute_report(Cluster::GenOnOff, json!({"onOff": 0}).as_object().cloned().unwrap())
        .with_linkquality(120);
    let update = definition.process_message(&report, &ConvertMeta::new(&result));
    assert_eq!(Value::Object(update), json!({"state": "OFF", "linkquality": 120}));
}
