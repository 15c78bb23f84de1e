//! Archetype factories producing ready-to-use definition fragments.
//!
//! Every factory call builds fresh `exposes` and converter lists. The
//! converters themselves are shared singletons, so fragments can be compared
//! by converter identity. Higher archetypes only ever add converters to the
//! on/off and brightness ones of [`Extend::light_onoff_brightness`].

use crate::cluster::Cluster;
use crate::converters::{
    Converter, FromZigbee, FromZigbeeSet, ToZigbee, ToZigbeeSet, from_zigbee as fz, to_zigbee as tz,
};
use crate::definition::{ConfigureFn, DefinitionMeta, configure_fn};
use crate::error::{DefinitionError, Result};
use crate::exposes::{Expose, presets};
use crate::light::{self, LightCapabilities};
use crate::radio::{Device, Entity};
use crate::reporting;
use futures_util::FutureExt;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use strum::{AsRefStr, Display, EnumString};

const POWER_ON_BEHAVIOR_VALUES: &[&str] = &["off", "on", "toggle", "previous"];

/// Options of the `switch` archetype.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwitchOptions {
    pub disable_power_on_behavior: bool,
    pub no_configure: bool,
}

/// Options of the light archetypes. Unknown keys are ignored when parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LightOptions {
    pub disable_effect: bool,
    pub disable_power_on_behavior: bool,
    pub disable_color_temp_startup: bool,
    /// `light_onoff_brightness` only.
    pub disable_move_step: bool,
    /// `light_onoff_brightness` only.
    pub disable_transition: bool,
    #[serde(rename = "supportsHS", alias = "supportsHueAndSaturation")]
    pub supports_hs: bool,
    #[serde(rename = "preferHS", alias = "preferHueAndSaturation")]
    pub prefer_hs: bool,
    pub color_temp_range: Option<[u16; 2]>,
    pub no_configure: bool,
}

/// Archetype names accepted by [`Extend::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Archetype {
    Switch,
    LightOnoffBrightness,
    LightOnoffBrightnessColortemp,
    LightOnoffBrightnessColor,
    LightOnoffBrightnessColortempColor,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::Switch,
        Archetype::LightOnoffBrightness,
        Archetype::LightOnoffBrightnessColortemp,
        Archetype::LightOnoffBrightnessColor,
        Archetype::LightOnoffBrightnessColortempColor,
    ];
}

/// A definition fragment: capabilities, converters and configure procedure.
#[derive(Clone, Default)]
pub struct Extend {
    pub exposes: Vec<Expose>,
    pub from_zigbee: FromZigbeeSet,
    pub to_zigbee: ToZigbeeSet,
    pub configure: Option<ConfigureFn>,
    pub meta: DefinitionMeta,
}

impl fmt::Debug for Extend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extend")
            .field("exposes", &self.exposes.len())
            .field("from_zigbee", &self.from_zigbee)
            .field("to_zigbee", &self.to_zigbee)
            .field("configure", &self.configure.is_some())
            .field("meta", &self.meta)
            .finish()
    }
}

fn light_configure(capabilities: LightCapabilities) -> ConfigureFn {
    configure_fn(move |device, coordinator, _| light::configure(device, coordinator, capabilities).boxed())
}

async fn configure_switch(device: &dyn Device, coordinator: &dyn Entity) -> Result<()> {
    for endpoint in device.endpoints() {
        if !endpoint.supports_input_cluster(Cluster::GenOnOff) {
            continue;
        }
        reporting::bind(endpoint.as_ref(), coordinator, &[Cluster::GenOnOff]).await?;
        reporting::on_off(endpoint.as_ref(), None).await?;
    }
    Ok(())
}

impl Extend {
    /// Build an archetype from its name and a JSON options object.
    pub fn build(archetype: Archetype, options: &Value) -> Result<Self> {
        let options = if options.is_null() { Value::Object(Default::default()) } else { options.clone() };
        let light_options = || -> Result<LightOptions> { Ok(serde_json::from_value(options.clone())?) };
        Ok(match archetype {
            Archetype::Switch => Self::switch(serde_json::from_value(options.clone())?),
            Archetype::LightOnoffBrightness => Self::light_onoff_brightness(light_options()?),
            Archetype::LightOnoffBrightnessColortemp => Self::light_onoff_brightness_colortemp(light_options()?),
            Archetype::LightOnoffBrightnessColor => Self::light_onoff_brightness_color(light_options()?),
            Archetype::LightOnoffBrightnessColortempColor => {
                Self::light_onoff_brightness_colortemp_color(light_options()?)
            }
        })
    }

    pub fn switch(options: SwitchOptions) -> Self {
        let mut extend = Self {
            exposes: vec![presets::switch()],
            from_zigbee: FromZigbeeSet::from_list(&[&fz::ON_OFF, &fz::IGNORE_BASIC_REPORT]),
            to_zigbee: ToZigbeeSet::from_list(&[&tz::ON_OFF]),
            ..Default::default()
        };
        if !options.disable_power_on_behavior {
            extend.add_power_on_behavior();
        }
        if !options.no_configure {
            extend.configure = Some(configure_fn(|device, coordinator, _| {
                configure_switch(device, coordinator).boxed()
            }));
        }
        extend
    }

    pub fn light_onoff_brightness(options: LightOptions) -> Self {
        let mut exposes = vec![presets::light_brightness()];
        if !options.disable_effect {
            exposes.push(presets::effect());
        }

        let mut to_zigbee = ToZigbeeSet::from_list(&[&tz::LIGHT_ONOFF_BRIGHTNESS, &tz::IGNORE_RATE, &tz::LEVEL_CONFIG]);
        if !options.disable_transition {
            to_zigbee.add(&tz::IGNORE_TRANSITION);
        }
        if !options.disable_effect {
            to_zigbee.add(&tz::EFFECT);
        }
        if !options.disable_move_step {
            to_zigbee.extend(&[&tz::LIGHT_BRIGHTNESS_MOVE, &tz::LIGHT_BRIGHTNESS_STEP]);
        }

        let mut extend = Self {
            exposes,
            from_zigbee: FromZigbeeSet::from_list(&[
                &fz::ON_OFF,
                &fz::BRIGHTNESS,
                &fz::LEVEL_CONFIG,
                &fz::IGNORE_BASIC_REPORT,
            ]),
            to_zigbee,
            ..Default::default()
        };
        extend.finish_light(
            &options,
            LightCapabilities {
                level: true,
                color_temp: false,
                color: false,
            },
        );
        extend
    }

    pub fn light_onoff_brightness_colortemp(options: LightOptions) -> Self {
        let mut exposes = vec![presets::light_brightness_colortemp(options.color_temp_range)];
        if !options.disable_effect {
            exposes.push(presets::effect());
        }

        let mut to_zigbee = ToZigbeeSet::from_list(&[
            &tz::LIGHT_ONOFF_BRIGHTNESS,
            &tz::LIGHT_COLORTEMP,
            &tz::IGNORE_TRANSITION,
            &tz::IGNORE_RATE,
            &tz::LIGHT_BRIGHTNESS_MOVE,
            &tz::LIGHT_COLORTEMP_MOVE,
            &tz::LIGHT_BRIGHTNESS_STEP,
            &tz::LIGHT_COLORTEMP_STEP,
            &tz::LIGHT_COLORTEMP_STARTUP,
            &tz::LEVEL_CONFIG,
            &tz::LIGHT_COLOR_OPTIONS,
            &tz::LIGHT_COLOR_MODE,
        ]);
        if !options.disable_effect {
            to_zigbee.add(&tz::EFFECT);
        }

        let mut extend = Self {
            exposes,
            from_zigbee: color_from_zigbee(),
            to_zigbee,
            ..Default::default()
        };
        extend.finish_light(
            &options,
            LightCapabilities {
                level: true,
                color_temp: true,
                color: false,
            },
        );
        extend
    }

    pub fn light_onoff_brightness_color(options: LightOptions) -> Self {
        let light = if options.supports_hs {
            presets::light_brightness_color(options.prefer_hs)
        } else {
            presets::light_brightness_colorxy()
        };
        let mut exposes = vec![light];
        if !options.disable_effect {
            exposes.push(presets::effect());
        }

        let mut to_zigbee = ToZigbeeSet::from_list(&[
            &tz::LIGHT_ONOFF_BRIGHTNESS,
            &tz::LIGHT_COLOR,
            &tz::IGNORE_TRANSITION,
            &tz::IGNORE_RATE,
            &tz::LIGHT_BRIGHTNESS_MOVE,
            &tz::LIGHT_BRIGHTNESS_STEP,
            &tz::LEVEL_CONFIG,
            &tz::LIGHT_HUE_SATURATION_MOVE,
            &tz::LIGHT_HUE_SATURATION_STEP,
            &tz::LIGHT_COLOR_OPTIONS,
            &tz::LIGHT_COLOR_MODE,
        ]);
        if !options.disable_effect {
            to_zigbee.add(&tz::EFFECT);
        }

        let mut extend = Self {
            exposes,
            from_zigbee: color_from_zigbee(),
            to_zigbee,
            meta: DefinitionMeta {
                supports_hs: options.supports_hs,
            },
            ..Default::default()
        };
        extend.finish_light(
            &options,
            LightCapabilities {
                level: true,
                color_temp: false,
                color: true,
            },
        );
        extend
    }

    pub fn light_onoff_brightness_colortemp_color(options: LightOptions) -> Self {
        let light = if options.supports_hs {
            presets::light_brightness_colortemp_color(options.color_temp_range, options.prefer_hs)
        } else {
            presets::light_brightness_colortemp_colorxy(options.color_temp_range)
        };
        let mut exposes = vec![light];
        if !options.disable_effect {
            exposes.push(presets::effect());
        }

        let mut to_zigbee = ToZigbeeSet::from_list(&[
            &tz::LIGHT_ONOFF_BRIGHTNESS,
            &tz::LIGHT_COLOR_COLORTEMP,
            &tz::IGNORE_TRANSITION,
            &tz::IGNORE_RATE,
            &tz::LIGHT_BRIGHTNESS_MOVE,
            &tz::LIGHT_COLORTEMP_MOVE,
            &tz::LIGHT_BRIGHTNESS_STEP,
            &tz::LIGHT_COLORTEMP_STEP,
            &tz::LIGHT_HUE_SATURATION_MOVE,
            &tz::LIGHT_HUE_SATURATION_STEP,
            &tz::LIGHT_COLORTEMP_STARTUP,
            &tz::LEVEL_CONFIG,
            &tz::LIGHT_COLOR_OPTIONS,
            &tz::LIGHT_COLOR_MODE,
        ]);
        if !options.disable_effect {
            to_zigbee.add(&tz::EFFECT);
        }

        let mut extend = Self {
            exposes,
            from_zigbee: color_from_zigbee(),
            to_zigbee,
            meta: DefinitionMeta {
                supports_hs: options.supports_hs,
            },
            ..Default::default()
        };
        extend.finish_light(
            &options,
            LightCapabilities {
                level: true,
                color_temp: true,
                color: true,
            },
        );
        extend
    }

    /// Apply the options shared by all light archetypes.
    fn finish_light(&mut self, options: &LightOptions, capabilities: LightCapabilities) {
        if capabilities.color_temp && options.disable_color_temp_startup {
            self.disable_color_temp_startup();
        }
        if !options.disable_power_on_behavior {
            self.add_power_on_behavior();
        }
        if !options.no_configure {
            self.configure = Some(light_configure(capabilities));
        }
    }

    /// Retract `color_temp_startup` from the light expose and its converter together.
    fn disable_color_temp_startup(&mut self) {
        if let Some(light) = self.exposes.first_mut()
            && let Err(e) = light.remove_feature("color_temp_startup")
        {
            debug!("Nothing to disable: {}", e);
        }
        self.to_zigbee.remove(tz::LIGHT_COLORTEMP_STARTUP.id());
    }

    fn add_power_on_behavior(&mut self) {
        self.exposes.push(presets::power_on_behavior(POWER_ON_BEHAVIOR_VALUES));
        self.from_zigbee.add(&fz::POWER_ON_BEHAVIOR);
        self.to_zigbee.add(&tz::POWER_ON_BEHAVIOR);
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

    /// Swap the `toZigbee` converter `id` for `converter`, keeping its position.
    pub fn replace_to_zigbee(mut self, id: &str, converter: &'static dyn ToZigbee) -> Result<Self> {
        if !self.to_zigbee.replace(id, converter) {
            return Err(DefinitionError::NoConverter(id.to_string()));
        }
        Ok(self)
    }
}

fn color_from_zigbee() -> FromZigbeeSet {
    FromZigbeeSet::from_list(&[
        &fz::COLOR_COLORTEMP,
        &fz::ON_OFF,
        &fz::BRIGHTNESS,
        &fz::LEVEL_CONFIG,
        &fz::IGNORE_BASIC_REPORT,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::radio::{DeviceInfo, EndpointInfo, RadioCall, RecordingDevice, RecordingEndpoint};
    use serde_json::json;
    use std::sync::Arc;

    fn all_light_factories() -> Vec<fn(LightOptions) -> Extend> {
        vec![
            Extend::light_onoff_brightness,
            Extend::light_onoff_brightness_colortemp,
            Extend::light_onoff_brightness_color,
            Extend::light_onoff_brightness_colortemp_color,
        ]
    }

    fn same_converter(a: &dyn ToZigbee, b: &dyn ToZigbee) -> bool {
        std::ptr::eq(a as *const dyn ToZigbee as *const u8, b as *const dyn ToZigbee as *const u8)
    }

    #[test]
    fn test_factories_return_independent_fragments() {
        for factory in all_light_factories() {
            let mut first = factory(LightOptions::default());
            let second = factory(LightOptions {
                disable_effect: true,
                ..Default::default()
            });
            let second_exposes = second.exposes.clone();
            let second_to_zigbee = second.to_zigbee.ids();

            first.exposes.clear();
            first.to_zigbee.remove("light_onoff_brightness");
            first.from_zigbee.remove("on_off");

            assert_eq!(second.exposes, second_exposes);
            assert_eq!(second.to_zigbee.ids(), second_to_zigbee);
            assert!(second.from_zigbee.contains("on_off"));

            let again = factory(LightOptions::default());
            assert!(again.to_zigbee.contains("light_onoff_brightness"));
            assert!(!again.exposes.is_empty());
        }
    }

    #[test]
    fn test_color_archetype_is_superset_for_on_off_and_brightness() {
        let options = LightOptions::default();
        let base = Extend::light_onoff_brightness(options.clone());
        let full = Extend::light_onoff_brightness_colortemp_color(options);

        for converter in base.to_zigbee.iter() {
            let addresses_on_off_or_brightness = converter
                .keys()
                .iter()
                .any(|key| key.contains("state") || key.contains("brightness") || *key == "on_time");
            if !addresses_on_off_or_brightness {
                continue;
            }
            let found = full
                .to_zigbee
                .get(converter.id())
                .is_some_and(|other| same_converter(other, converter));
            assert!(found, "{} missing from colortemp_color", converter.id());
        }
        assert!(full.to_zigbee.contains("light_brightness_move"));
        assert!(full.to_zigbee.contains("light_brightness_step"));
    }

    #[test]
    fn test_disable_color_temp_startup_keeps_lists_consistent() {
        let factories: [fn(LightOptions) -> Extend; 2] = [
            Extend::light_onoff_brightness_colortemp,
            Extend::light_onoff_brightness_colortemp_color,
        ];
        for factory in factories {
            let enabled = factory(LightOptions::default());
            assert!(enabled.exposes[0].has_feature("color_temp_startup"));
            assert!(enabled.to_zigbee.contains("light_colortemp_startup"));

            let disabled = factory(LightOptions {
                disable_color_temp_startup: true,
                ..Default::default()
            });
            assert!(!disabled.exposes[0].has_feature("color_temp_startup"));
            assert!(!disabled.to_zigbee.contains("light_colortemp_startup"));
        }
    }

    #[test]
    fn test_disable_color_temp_startup_when_absent() {
        let mut extend = Extend::light_onoff_brightness_colortemp(LightOptions {
            disable_color_temp_startup: true,
            ..Default::default()
        });
        let exposes = extend.exposes.clone();
        let converters = extend.to_zigbee.ids();

        extend.disable_color_temp_startup();
        assert_eq!(extend.exposes, exposes);
        assert_eq!(extend.to_zigbee.ids(), converters);

        let brightness = Extend::light_onoff_brightness(LightOptions {
            disable_color_temp_startup: true,
            ..Default::default()
        });
        assert_eq!(brightness.exposes, Extend::light_onoff_brightness(LightOptions::default()).exposes);
    }

    #[test]
    fn test_no_configure() {
        for factory in all_light_factories() {
            assert!(factory(LightOptions::default()).configure.is_some());
            let options = LightOptions {
                no_configure: true,
                ..Default::default()
            };
            assert!(factory(options).configure.is_none());
        }
        assert!(Extend::switch(SwitchOptions::default()).configure.is_some());
        let options = SwitchOptions {
            no_configure: true,
            ..Default::default()
        };
        assert!(Extend::switch(options).configure.is_none());
    }

    #[test]
    fn test_power_on_behavior_is_consistent() {
        let with = Extend::switch(SwitchOptions::default());
        assert!(with.exposes.iter().any(|e| e.name.as_deref() == Some("power_on_behavior")));
        assert!(with.to_zigbee.contains("power_on_behavior"));
        assert!(with.from_zigbee.contains("power_on_behavior"));

        let without = Extend::light_onoff_brightness(LightOptions {
            disable_power_on_behavior: true,
            ..Default::default()
        });
        assert!(!without.exposes.iter().any(|e| e.name.as_deref() == Some("power_on_behavior")));
        assert!(!without.to_zigbee.contains("power_on_behavior"));
    }

    #[test]
    fn test_hs_options() {
        let xy_only = Extend::light_onoff_brightness_color(LightOptions::default());
        assert!(!xy_only.meta.supports_hs);
        assert!(xy_only.exposes[0].has_feature("color_xy"));
        assert!(!xy_only.exposes[0].has_feature("color_hs"));

        let hs = Extend::light_onoff_brightness_colortemp_color(LightOptions {
            supports_hs: true,
            prefer_hs: true,
            ..Default::default()
        });
        assert!(hs.meta.supports_hs);
        let color_features: Vec<_> = hs.exposes[0]
            .features
            .iter()
            .filter_map(|f| f.name.as_deref())
            .filter(|name| name.starts_with("color_") && *name != "color_temp" && *name != "color_temp_startup")
            .collect();
        assert_eq!(color_features, vec!["color_hs", "color_xy"]);
    }

    #[test]
    fn test_build_ignores_unknown_options() {
        let extend = Extend::build(
            Archetype::LightOnoffBrightnessColortemp,
            &json!({"disableColorTempStartup": true, "colorTempRange": [153, 370], "someFutureFlag": 1}),
        )
        .unwrap();
        assert!(!extend.to_zigbee.contains("light_colortemp_startup"));
        let color_temp = extend.exposes[0].feature("color_temp").unwrap();
        assert_eq!(color_temp.value_min, Some(153.0));
        assert_eq!(color_temp.value_max, Some(370.0));

        let switch = Extend::build("switch".parse().unwrap(), &Value::Null).unwrap();
        assert!(switch.to_zigbee.contains("on_off"));
        assert!("dimmer".parse::<Archetype>().is_err());
    }

    #[test]
    fn test_every_archetype_validates() {
        for archetype in Archetype::ALL {
            let extend = Extend::build(archetype, &json!({})).unwrap();
            let keys = extend.to_zigbee.keys();
            for expose in &extend.exposes {
                for property in expose.settable_properties() {
                    assert!(keys.contains(&property.as_str()), "{}: {}", archetype, property);
                }
            }
        }
    }

    #[test]
    fn test_replace_to_zigbee() {
        let extend = Extend::light_onoff_brightness(LightOptions::default())
            .replace_to_zigbee("light_onoff_brightness", &tz::GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS)
            .unwrap();
        assert_eq!(extend.to_zigbee.ids()[0], "gledopto_light_onoff_brightness");
        assert!(
            Extend::switch(SwitchOptions::default())
                .replace_to_zigbee("light_color", &tz::GLEDOPTO_LIGHT_COLOR)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_switch_configure_binds_on_off() {
        let info = EndpointInfo::new(1).with_input_clusters(&[Cluster::GenBasic, Cluster::GenOnOff]);
        let endpoint = Arc::new(RecordingEndpoint::new("0x01", info.clone()));
        let device = RecordingDevice::with_endpoints(DeviceInfo::new("0x01").with_endpoint(info), vec![endpoint.clone()]);
        let coordinator = RecordingEndpoint::coordinator();

        let extend = Extend::switch(SwitchOptions::default());
        let configure = extend.configure.unwrap();
        configure(&device, &coordinator, &Context::default()).await.unwrap();

        let calls = endpoint.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], RadioCall::Bind { cluster: Cluster::GenOnOff, .. }));
        assert!(matches!(calls[1], RadioCall::ConfigureReporting { cluster: Cluster::GenOnOff, .. }));
    }
}
