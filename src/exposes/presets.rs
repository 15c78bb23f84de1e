//! Ready-made exposes shared by many devices.

use super::{Access, ColorSpace, Expose};

pub fn switch() -> Expose {
    Expose::switch().with_state("state", "On/off state of the switch")
}

pub fn light_brightness() -> Expose {
    Expose::light().with_brightness()
}

pub fn light_brightness_colortemp(range: Option<[u16; 2]>) -> Expose {
    Expose::light()
        .with_brightness()
        .with_color_temp(range)
        .with_color_temp_startup(range)
}

pub fn light_brightness_colorxy() -> Expose {
    Expose::light().with_brightness().with_color(&[ColorSpace::Xy])
}

pub fn light_brightness_color(prefer_hs: bool) -> Expose {
    Expose::light().with_brightness().with_color(color_spaces(prefer_hs))
}

pub fn light_brightness_colortemp_colorxy(range: Option<[u16; 2]>) -> Expose {
    light_brightness_colortemp(range).with_color(&[ColorSpace::Xy])
}

pub fn light_brightness_colortemp_color(range: Option<[u16; 2]>, prefer_hs: bool) -> Expose {
    light_brightness_colortemp(range).with_color(color_spaces(prefer_hs))
}

fn color_spaces(prefer_hs: bool) -> &'static [ColorSpace] {
    if prefer_hs {
        &[ColorSpace::Hs, ColorSpace::Xy]
    } else {
        &[ColorSpace::Xy, ColorSpace::Hs]
    }
}

pub fn effect() -> Expose {
    Expose::enumeration(
        "effect",
        Access::SET,
        &["blink", "breathe", "okay", "channel_change", "finish_effect", "stop_effect"],
    )
    .with_description("Triggers an effect on the light (e.g. make light blink for a few seconds)")
}

pub fn power_on_behavior(values: &[&str]) -> Expose {
    Expose::enumeration("power_on_behavior", Access::ALL, values).with_description(
        "Controls the behavior when the device is powered on after power loss. If you get an `UNSUPPORTED_ATTRIBUTE` error, the device does not support it.",
    )
}

pub fn linkquality() -> Expose {
    Expose::numeric("linkquality", Access::STATE)
        .with_unit("lqi")
        .with_description("Link quality (signal strength)")
        .with_value_min(0.0)
        .with_value_max(255.0)
}

pub fn battery() -> Expose {
    Expose::numeric("battery", Access::STATE)
        .with_unit("%")
        .with_description("Remaining battery in %")
        .with_value_min(0.0)
        .with_value_max(100.0)
}

pub fn battery_voltage() -> Expose {
    Expose::numeric("voltage", Access::STATE)
        .with_unit("mV")
        .with_description("Voltage of the battery in millivolts")
}

pub fn battery_low() -> Expose {
    Expose::binary("battery_low", Access::STATE, true, false)
        .with_description("Indicates if the battery of this device is almost empty")
}

pub fn power() -> Expose {
    Expose::numeric("power", Access::STATE)
        .with_unit("W")
        .with_description("Instantaneous measured power")
}

pub fn energy() -> Expose {
    Expose::numeric("energy", Access::STATE)
        .with_unit("kWh")
        .with_description("Sum of consumed energy")
}

pub fn current() -> Expose {
    Expose::numeric("current", Access::STATE)
        .with_unit("A")
        .with_description("Instantaneous measured electrical current")
}

pub fn voltage() -> Expose {
    Expose::numeric("voltage", Access::STATE)
        .with_unit("V")
        .with_description("Measured electrical potential value")
}

pub fn ac_frequency() -> Expose {
    Expose::numeric("ac_frequency", Access::STATE)
        .with_unit("Hz")
        .with_description("Measured electrical AC frequency")
}

pub fn device_temperature() -> Expose {
    Expose::numeric("device_temperature", Access::STATE)
        .with_unit("°C")
        .with_description("Temperature of the device")
}

pub fn temperature() -> Expose {
    Expose::numeric("temperature", Access::STATE)
        .with_unit("°C")
        .with_description("Measured temperature value")
}

pub fn humidity() -> Expose {
    Expose::numeric("humidity", Access::STATE)
        .with_unit("%")
        .with_description("Measured relative humidity")
}

pub fn occupancy() -> Expose {
    Expose::binary("occupancy", Access::STATE, true, false)
        .with_description("Indicates whether the device detected occupancy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_state_is_settable() {
        assert_eq!(switch().settable_properties(), vec!["state".to_string()]);
    }

    #[test]
    fn test_color_order_follows_preference() {
        let xy_first = light_brightness_color(false);
        let hs_first = light_brightness_color(true);
        assert_eq!(xy_first.features[2].name.as_deref(), Some("color_xy"));
        assert_eq!(hs_first.features[2].name.as_deref(), Some("color_hs"));
    }

    #[test]
    fn test_effect_is_set_only() {
        let effect = effect();
        assert_eq!(effect.access, Some(Access::SET));
        assert_eq!(effect.values.len(), 6);
    }

    #[test]
    fn test_colortemp_color_has_startup() {
        let light = light_brightness_colortemp_color(Some([153, 500]), false);
        assert!(light.has_feature("color_temp"));
        assert!(light.has_feature("color_temp_startup"));
        assert!(light.has_feature("color_xy"));
        assert!(light.has_feature("color_hs"));
    }
}
