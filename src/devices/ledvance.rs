//! LEDVANCE / OSRAM lights.

use crate::converters::to_zigbee as tz;
use crate::definition::Definition;
use crate::extend::{Extend, LightOptions};

const VENDOR: &str = "LEDVANCE";

/// The bulbs reject the power-on and startup attributes.
fn ledvance_options(options: LightOptions) -> LightOptions {
    LightOptions {
        disable_power_on_behavior: true,
        disable_color_temp_startup: true,
        ..options
    }
}

pub fn light_onoff_brightness(options: LightOptions) -> Extend {
    Extend::light_onoff_brightness(ledvance_options(options)).with_to_zigbee(&[&tz::LEDVANCE_COMMANDS])
}

pub fn light_onoff_brightness_colortemp(options: LightOptions) -> Extend {
    Extend::light_onoff_brightness_colortemp(ledvance_options(options)).with_to_zigbee(&[&tz::LEDVANCE_COMMANDS])
}

pub fn light_onoff_brightness_color(options: LightOptions) -> Extend {
    let options = LightOptions {
        supports_hs: true,
        ..ledvance_options(options)
    };
    Extend::light_onoff_brightness_color(options).with_to_zigbee(&[&tz::LEDVANCE_COMMANDS])
}

pub fn light_onoff_brightness_colortemp_color(options: LightOptions) -> Extend {
    let options = LightOptions {
        supports_hs: true,
        ..ledvance_options(options)
    };
    Extend::light_onoff_brightness_colortemp_color(options).with_to_zigbee(&[&tz::LEDVANCE_COMMANDS])
}

fn range(min: u16, max: u16) -> LightOptions {
    LightOptions {
        color_temp_range: Some([min, max]),
        ..Default::default()
    }
}

pub fn definitions() -> Vec<Definition> {
    vec![
        Definition::new("4058075181472", VENDOR, "SMART+ panel 60 x 60cm tunable white")
            .with_zigbee_model(&["Panel TW Z3"])
            .with_extend(light_onoff_brightness_colortemp(LightOptions::default())),
        Definition::new("GPDRPLOP401100CE", VENDOR, "Panel TW LED 625 UGR19")
            .with_zigbee_model(&["Panel TW 620 UGR19"])
            .with_extend(light_onoff_brightness_colortemp_color(range(153, 370))),
        Definition::new("AC25697", VENDOR, "SMART+ CLASSIC MULTICOLOUR 60 10W E27")
            .with_zigbee_model(&["A60 RGBW Value II"])
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())),
        Definition::new("AC08560", VENDOR, "SMART+ spot GU10 multicolor RGBW")
            .with_zigbee_model(&["PAR16 RGBW Value"])
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())),
        Definition::new("4058075208414", VENDOR, "SMART+ candle E14 tunable white")
            .with_zigbee_model(&["B40 TW Z3"])
            .with_extend(light_onoff_brightness_colortemp(LightOptions::default())),
        Definition::new("4058075208421", VENDOR, "SMART+ candle E14 tunable white")
            .with_zigbee_model(&["LEDVANCE DIM"])
            .with_extend(light_onoff_brightness(LightOptions::default())),
        Definition::new("4058075208353", VENDOR, "SMART+ gardenpole multicolour")
            .with_zigbee_model(&["Gardenpole Mini RGBW Z3"])
            .with_extend(light_onoff_brightness_colortemp_color(range(153, 526))),
        Definition::new("4058075208339", VENDOR, "Flex 3P multicolor")
            .with_zigbee_model(&["FLEX RGBW Z3"])
            .with_extend(light_onoff_brightness_colortemp_color(LightOptions::default())),
        Definition::new("4058075173989", VENDOR, "SMART+ indoor undercabinet light")
            .with_zigbee_model(&["Undercabinet TW Z3"])
            .with_extend(light_onoff_brightness_colortemp(LightOptions::default())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_extend() {
        let extend = light_onoff_brightness_colortemp_color(range(153, 370));
        assert_eq!(extend.to_zigbee.ids().last(), Some(&"ledvance_commands"));
        assert!(!extend.to_zigbee.contains("power_on_behavior"));
        assert!(!extend.to_zigbee.contains("light_colortemp_startup"));
        assert!(!extend.exposes[0].has_feature("color_temp_startup"));
        assert!(
            !extend
                .exposes
                .iter()
                .any(|e| e.name.as_deref() == Some("power_on_behavior"))
        );
        assert!(extend.meta.supports_hs);
        assert_eq!(extend.exposes[0].feature("color_temp").and_then(|f| f.value_max), Some(370.0));
    }

    #[test]
    fn test_caller_options_are_kept() {
        let extend = light_onoff_brightness(LightOptions {
            disable_effect: true,
            ..Default::default()
        });
        assert!(!extend.to_zigbee.contains("effect"));
        assert!(extend.to_zigbee.contains("ledvance_commands"));
        assert!(extend.configure.is_some());

        let color = light_onoff_brightness_color(LightOptions::default());
        assert!(color.meta.supports_hs);
        assert!(color.exposes[0].has_feature("color_hs"));
        assert!(color.to_zigbee.contains("ledvance_commands"));
    }

    #[test]
    fn test_every_record_validates() {
        for definition in definitions() {
            definition.validate().unwrap();
        }
    }
}
