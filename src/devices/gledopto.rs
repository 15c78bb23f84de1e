//! Gledopto LED controllers, bulbs and switches.
//!
//! Gledopto firmware runs transitions about 3.3 times faster than asked, so
//! the light converters are swapped for scaling variants.

use crate::cluster::Cluster;
use crate::converters::{ToZigbee, to_zigbee as tz};
use crate::definition::{ConfigureFn, Definition, WhiteLabel, configure_fn};
use crate::error::Result;
use crate::extend::{Extend, LightOptions, SwitchOptions};
use crate::fingerprint::{EndpointFingerprint, Fingerprint};
use crate::light::{self, LightCapabilities};
use crate::polling::{PollRead, poll_on_event};
use crate::radio::{Device, DeviceType, Entity};
use futures_util::FutureExt;
use log::info;

const VENDOR: &str = "Gledopto";
const MANUFACTURER: &str = "GLEDOPTO";
const GLEDOPTO_PROFILE: u16 = 49246;
const HA_PROFILE: u16 = 260;

const SWITCH_POLL: &[PollRead] = &[PollRead::new(Cluster::GenOnOff, &["onOff"])];

fn swap(mut extend: Extend, swaps: &[(&str, &'static dyn ToZigbee)]) -> Result<Extend> {
    for (id, converter) in swaps {
        extend = extend.replace_to_zigbee(id, *converter)?;
    }
    Ok(extend)
}

pub fn light_onoff_brightness(options: LightOptions) -> Result<Extend> {
    swap(
        Extend::light_onoff_brightness(options),
        &[("light_onoff_brightness", &tz::GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS)],
    )
}

pub fn light_onoff_brightness_colortemp(options: LightOptions) -> Result<Extend> {
    swap(
        Extend::light_onoff_brightness_colortemp(options),
        &[
            ("light_onoff_brightness", &tz::GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS),
            ("light_colortemp", &tz::GLEDOPTO_LIGHT_COLORTEMP),
        ],
    )
}

pub fn light_onoff_brightness_color(options: LightOptions) -> Result<Extend> {
    let options = LightOptions {
        supports_hs: true,
        ..options
    };
    swap(
        Extend::light_onoff_brightness_color(options),
        &[
            ("light_onoff_brightness", &tz::GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS),
            ("light_color", &tz::GLEDOPTO_LIGHT_COLOR),
        ],
    )
}

pub fn light_onoff_brightness_colortemp_color(options: LightOptions) -> Result<Extend> {
    let options = LightOptions {
        supports_hs: true,
        ..options
    };
    swap(
        Extend::light_onoff_brightness_colortemp_color(options),
        &[
            ("light_onoff_brightness", &tz::GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS),
            ("light_color_colortemp", &tz::GLEDOPTO_LIGHT_COLOR_COLORTEMP),
        ],
    )
}

/// Switch without attribute reporting, polled instead.
fn switch(model: &str, description: &str) -> Definition {
    let options = SwitchOptions {
        no_configure: true,
        ..Default::default()
    };
    Definition::new(model, VENDOR, description)
        .with_zigbee_model(&[model])
        .with_extend(Extend::switch(options))
        .with_on_event(poll_on_event(SWITCH_POLL))
}

/// Log when the controller was switched to another mode with its button.
async fn read_model_id(device: &dyn Device) -> Result<()> {
    let Some(endpoint) = device.endpoints().into_iter().next() else {
        return Ok(());
    };
    let values = endpoint.read(Cluster::GenBasic, &["modelId"]).await?;
    let new_model = values.get("modelId").and_then(|v| v.as_str());
    let old_model = device.info().model_id.as_deref();
    if let Some(new_model) = new_model
        && old_model != Some(new_model)
    {
        info!(
            "Detected Gledopto device mode change, from '{}' to '{}'",
            old_model.unwrap_or_default(),
            new_model
        );
    }
    Ok(())
}

async fn configure_pro(device: &dyn Device, coordinator: &dyn Entity, capabilities: LightCapabilities) -> Result<()> {
    light::configure(device, coordinator, capabilities).await?;
    read_model_id(device).await
}

fn pro_configure(capabilities: LightCapabilities) -> ConfigureFn {
    configure_fn(move |device, coordinator, _| configure_pro(device, coordinator, capabilities).boxed())
}

fn no_configure() -> LightOptions {
    LightOptions {
        no_configure: true,
        ..Default::default()
    }
}

fn controller(model_id: &str, endpoints: &[EndpointFingerprint]) -> Fingerprint {
    let mut fingerprint = Fingerprint::model(model_id)
        .with_manufacturer(MANUFACTURER)
        .with_type(DeviceType::Router);
    for endpoint in endpoints {
        fingerprint = fingerprint.with_endpoint(endpoint.clone());
    }
    fingerprint
}

fn light_endpoint(id: u8, profile: u16, device_id: u16, clusters: &[u16]) -> EndpointFingerprint {
    EndpointFingerprint::new(id)
        .with_profile(profile)
        .with_device_id(device_id)
        .with_input_clusters(clusters)
        .with_output_clusters(&[])
}

fn touchlink_endpoint(device_id: u16) -> EndpointFingerprint {
    EndpointFingerprint::new(13)
        .with_profile(GLEDOPTO_PROFILE)
        .with_device_id(device_id)
        .with_input_clusters(&[4096])
        .with_output_clusters(&[4096])
}

const COLOR_CLUSTERS: &[u16] = &[0, 3, 4, 5, 6, 8, 768];
const DIM_CLUSTERS: &[u16] = &[0, 3, 4, 5, 6, 8];

pub fn definitions() -> Result<Vec<Definition>> {
    let rgbcct = LightCapabilities {
        level: true,
        color_temp: true,
        color: true,
    };

    Ok(vec![
        Definition::new("GL-H-001", VENDOR, "Zigbee RF Hub")
            .with_fingerprint(controller(
                "GL-H-001",
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 528, COLOR_CLUSTERS),
                    touchlink_endpoint(528),
                ],
            ))
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())?),
        Definition::new("GL-SD-001", VENDOR, "Zigbee triac AC dimmer")
            .with_zigbee_model(&["GL-SD-001"])
            .with_extend(light_onoff_brightness(LightOptions::default())?),
        Definition::new("GL-C-006", VENDOR, "Zigbee LED Controller WW/CW")
            .with_zigbee_model(&["GL-C-006"])
            .with_fingerprint(controller(
                MANUFACTURER,
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 544, COLOR_CLUSTERS),
                    touchlink_endpoint(57694),
                ],
            ))
            .with_extend(light_onoff_brightness_colortemp(LightOptions::default())?),
        Definition::new("GL-C-006P", VENDOR, "Zigbee LED Controller WW/CW (pro)")
            .with_zigbee_model(&["GL-C-006P"])
            .with_extend(light_onoff_brightness_colortemp(no_configure())?)
            .with_configure(pro_configure(LightCapabilities {
                level: true,
                color_temp: true,
                color: false,
            })),
        // One ID controls white and color together
        Definition::new("GL-C-007-1ID", VENDOR, "Zigbee LED Controller RGBW (1 ID)")
            .with_fingerprint(controller(
                "GL-C-007",
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 528, COLOR_CLUSTERS),
                    touchlink_endpoint(528),
                ],
            ))
            .with_fingerprint(controller(
                "GL-C-007",
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 528, COLOR_CLUSTERS),
                    light_endpoint(12, HA_PROFILE, 258, COLOR_CLUSTERS),
                    touchlink_endpoint(57694),
                ],
            ))
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())?),
        Definition::new("GL-C-008-1ID", VENDOR, "Zigbee LED Controller RGB+CCT (1 ID)")
            .with_zigbee_model(&["GL-C-008"])
            .with_fingerprint(controller(
                MANUFACTURER,
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 528, COLOR_CLUSTERS),
                    touchlink_endpoint(57694),
                ],
            ))
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())?),
        Definition::new("GL-C-003P", VENDOR, "Zigbee LED Controller RGB (pro)")
            .with_zigbee_model(&["GL-C-003P"])
            .with_extend(light_onoff_brightness_color(no_configure())?)
            .with_configure(pro_configure(LightCapabilities {
                level: true,
                color_temp: false,
                color: true,
            })),
        Definition::new("GL-C-008P", VENDOR, "Zigbee LED Controller RGB+CCT (pro)")
            .with_zigbee_model(&["GL-C-008P"])
            .with_white_label(white_label("GL-C-001P"))
            .with_white_label(white_label("GL-C-002P"))
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions {
                color_temp_range: Some([158, 495]),
                ..no_configure()
            })?)
            .with_configure(pro_configure(rgbcct)),
        Definition::new("GL-C-009", VENDOR, "Zigbee LED Controller W")
            .with_zigbee_model(&["GL-C-009"])
            .with_fingerprint(controller(
                MANUFACTURER,
                &[
                    light_endpoint(11, GLEDOPTO_PROFILE, 256, DIM_CLUSTERS),
                    touchlink_endpoint(57694),
                ],
            ))
            .with_extend(light_onoff_brightness(LightOptions::default())?),
        Definition::new("GL-G-007Z", VENDOR, "Zigbee 9W garden lamp RGB+CCT")
            .with_zigbee_model(&["GL-G-007Z"])
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())?),
        switch("GL-W-001Z", "Zigbee on/off wall switch"),
        switch("GL-SD-002", "Zigbee 3.0 smart home switch"),
        // Stock converters, this bulb handles transitions correctly
        Definition::new("GL-B-004P", VENDOR, "Filament LED light bulb E27 G95 7W pro")
            .with_zigbee_model(&["GL-B-004P"])
            .with_extend(Extend::light_onoff_brightness_colortemp_color(LightOptions {
                color_temp_range: Some([158, 495]),
                ..Default::default()
            })),
    ])
}

fn white_label(model: &str) -> WhiteLabel {
    WhiteLabel {
        vendor: VENDOR.to_string(),
        model: model.to_string(),
        description: None,
        fingerprint: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::radio::{DeviceInfo, EndpointInfo, RadioCall, RecordingDevice, RecordingEndpoint};
    use serde_json::json;
    use std::sync::Arc;

    fn find(model: &str) -> Definition {
        definitions()
            .unwrap()
            .into_iter()
            .find(|d| d.model == model)
            .unwrap()
    }

    #[test]
    fn test_converters_are_swapped() {
        let definition = find("GL-C-008-1ID");
        assert!(definition.to_zigbee.contains("gledopto_light_onoff_brightness"));
        assert!(definition.to_zigbee.contains("gledopto_light_color_colortemp"));
        assert!(!definition.to_zigbee.contains("light_onoff_brightness"));
        assert!(!definition.to_zigbee.contains("light_color_colortemp"));
        assert!(definition.meta.supports_hs);

        let stock = find("GL-B-004P");
        assert!(stock.to_zigbee.contains("light_onoff_brightness"));
    }

    #[test]
    fn test_polling_switch() {
        let definition = find("GL-W-001Z");
        assert!(definition.on_event.is_some());
        assert!(definition.configure.is_none());
        assert!(definition.to_zigbee.contains("on_off"));
    }

    #[test]
    fn test_every_record_validates() {
        for definition in definitions().unwrap() {
            definition.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_pro_configure_reads_model_id() {
        let info = EndpointInfo::new(11).with_input_clusters(&[
            Cluster::GenBasic,
            Cluster::GenOnOff,
            Cluster::GenLevelCtrl,
            Cluster::LightingColorCtrl,
        ]);
        let endpoint = Arc::new(
            RecordingEndpoint::new("0x01", info.clone()).with_attribute(Cluster::GenBasic, "modelId", json!("GL-C-006P")),
        );
        let device = RecordingDevice::with_endpoints(
            DeviceInfo::new("0x01").with_model_id("GL-C-008P").with_endpoint(info),
            vec![endpoint.clone()],
        );

        let definition = find("GL-C-008P");
        definition
            .run_configure(&device, &RecordingEndpoint::coordinator(), &Context::default())
            .await
            .unwrap();

        let calls = endpoint.calls();
        assert!(matches!(calls.first(), Some(RadioCall::Bind { .. })));
        assert_eq!(
            calls.last(),
            Some(&RadioCall::Read {
                cluster: Cluster::GenBasic,
                attributes: vec!["modelId".to_string()],
            })
        );
    }
}
