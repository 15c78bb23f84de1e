//! Shared `fromZigbee` converters.

use super::{ATTRIBUTE_MESSAGES, ConvertMeta, Converter, FromZigbee, Message, State, precision_round};
use crate::cluster::Cluster;
use crate::definition::Definition;
use serde_json::{Value, json};

type ConvertFn = fn(&Definition, &Message, &ConvertMeta<'_>) -> Option<State>;

/// A `fromZigbee` converter backed by a plain function.
pub struct FromZigbeeFn {
    id: &'static str,
    cluster: Cluster,
    message_types: &'static [&'static str],
    convert: ConvertFn,
}

impl FromZigbeeFn {
    pub const fn new(
        id: &'static str,
        cluster: Cluster,
        message_types: &'static [&'static str],
        convert: ConvertFn,
    ) -> Self {
        Self {
            id,
            cluster,
            message_types,
            convert,
        }
    }
}

impl Converter for FromZigbeeFn {
    fn id(&self) -> &'static str {
        self.id
    }
}

impl FromZigbee for FromZigbeeFn {
    fn cluster(&self) -> Cluster {
        self.cluster
    }

    fn message_types(&self) -> &'static [&'static str] {
        self.message_types
    }

    fn convert(&self, definition: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
        (self.convert)(definition, message, meta)
    }
}

pub static ON_OFF: FromZigbeeFn = FromZigbeeFn::new("on_off", Cluster::GenOnOff, ATTRIBUTE_MESSAGES, on_off);
pub static BRIGHTNESS: FromZigbeeFn =
    FromZigbeeFn::new("brightness", Cluster::GenLevelCtrl, ATTRIBUTE_MESSAGES, brightness);
pub static LEVEL_CONFIG: FromZigbeeFn =
    FromZigbeeFn::new("level_config", Cluster::GenLevelCtrl, ATTRIBUTE_MESSAGES, level_config);
pub static COLOR_COLORTEMP: FromZigbeeFn = FromZigbeeFn::new(
    "color_colortemp",
    Cluster::LightingColorCtrl,
    ATTRIBUTE_MESSAGES,
    color_colortemp,
);
pub static POWER_ON_BEHAVIOR: FromZigbeeFn =
    FromZigbeeFn::new("power_on_behavior", Cluster::GenOnOff, ATTRIBUTE_MESSAGES, power_on_behavior);
pub static IGNORE_BASIC_REPORT: FromZigbeeFn =
    FromZigbeeFn::new("ignore_basic_report", Cluster::GenBasic, ATTRIBUTE_MESSAGES, ignore);
pub static BATTERY: FromZigbeeFn = FromZigbeeFn::new("battery", Cluster::GenPowerCfg, ATTRIBUTE_MESSAGES, battery);
pub static TEMPERATURE: FromZigbeeFn = FromZigbeeFn::new(
    "temperature",
    Cluster::MsTemperatureMeasurement,
    ATTRIBUTE_MESSAGES,
    temperature,
);
pub static HUMIDITY: FromZigbeeFn =
    FromZigbeeFn::new("humidity", Cluster::MsRelativeHumidity, ATTRIBUTE_MESSAGES, humidity);
pub static DEVICE_TEMPERATURE: FromZigbeeFn = FromZigbeeFn::new(
    "device_temperature",
    Cluster::GenDeviceTempCfg,
    ATTRIBUTE_MESSAGES,
    device_temperature,
);
pub static ELECTRICAL_MEASUREMENT: FromZigbeeFn = FromZigbeeFn::new(
    "electrical_measurement",
    Cluster::HaElectricalMeasurement,
    ATTRIBUTE_MESSAGES,
    electrical_measurement,
);
pub static METERING: FromZigbeeFn = FromZigbeeFn::new("metering", Cluster::SeMetering, ATTRIBUTE_MESSAGES, metering);

/// Attribute as a float. 48-bit values arrive as `[high, low]` 32-bit words.
pub(crate) fn attribute_f64(message: &Message, attribute: &str) -> Option<f64> {
    match message.data.get(attribute)? {
        Value::Number(number) => number.as_f64(),
        Value::Array(words) if words.len() == 2 => {
            let high = words[0].as_f64()?;
            let low = words[1].as_f64()?;
            Some(high * 4_294_967_296.0 + low)
        }
        _ => None,
    }
}

/// JSON number, integral values without a fraction.
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

fn single(property: String, value: Value) -> Option<State> {
    let mut state = State::new();
    state.insert(property, value);
    Some(state)
}

fn non_empty(state: State) -> Option<State> {
    if state.is_empty() { None } else { Some(state) }
}

fn ignore(_: &Definition, _: &Message, _: &ConvertMeta<'_>) -> Option<State> {
    None
}

fn on_off(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let on_off = attribute_f64(message, "onOff")?;
    let state = if on_off == 1.0 { "ON" } else { "OFF" };
    single(meta.property("state"), json!(state))
}

fn brightness(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let level = message.data.get("currentLevel")?;
    single(meta.property("brightness"), level.clone())
}

fn level_config(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let mut config = State::new();

    if let Some(time) = attribute_f64(message, "onOffTransitionTime") {
        config.insert("on_off_transition_time".into(), number(time));
    }
    for (attribute, name) in [
        ("onTransitionTime", "on_transition_time"),
        ("offTransitionTime", "off_transition_time"),
    ] {
        if let Some(time) = attribute_f64(message, attribute) {
            let value = if time == 65535.0 { json!("disabled") } else { number(time) };
            config.insert(name.into(), value);
        }
    }
    if let Some(level) = attribute_f64(message, "startUpCurrentLevel") {
        let value = match level as u16 {
            0 => json!("minimum"),
            255 => json!("previous"),
            _ => number(level),
        };
        config.insert("current_level_startup".into(), value);
    }
    if let Some(level) = attribute_f64(message, "onLevel") {
        let value = if level == 255.0 { json!("previous") } else { number(level) };
        config.insert("on_level".into(), value);
    }
    if let Some(options) = attribute_f64(message, "options") {
        config.insert("execute_if_off".into(), json!((options as u8) & 1 == 1));
    }

    if config.is_empty() {
        return None;
    }
    single(meta.property("level_config"), Value::Object(config))
}

fn color_mode_name(mode: f64) -> Value {
    match mode as u8 {
        0 => json!("hs"),
        1 => json!("xy"),
        2 => json!("color_temp"),
        _ => number(mode),
    }
}

fn color_colortemp(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let mut result = State::new();

    if let Some(value) = message.data.get("colorTemperature") {
        result.insert(meta.property("color_temp"), value.clone());
    }
    if let Some(value) = message.data.get("startUpColorTemperature") {
        result.insert(meta.property("color_temp_startup"), value.clone());
    }
    if let Some(mode) = attribute_f64(message, "colorMode") {
        result.insert(meta.property("color_mode"), color_mode_name(mode));
    }

    let mut color = State::new();
    if let Some(x) = attribute_f64(message, "currentX") {
        color.insert("x".into(), number(precision_round(x / 65535.0, 4)));
    }
    if let Some(y) = attribute_f64(message, "currentY") {
        color.insert("y".into(), number(precision_round(y / 65535.0, 4)));
    }
    if let Some(saturation) = attribute_f64(message, "currentSaturation") {
        color.insert("saturation".into(), number((saturation * 100.0 / 254.0).round()));
    }
    if let Some(hue) = attribute_f64(message, "currentHue") {
        color.insert("hue".into(), number((hue * 360.0 / 254.0).round()));
    }
    if let Some(hue) = attribute_f64(message, "enhancedCurrentHue") {
        color.insert("hue".into(), number(precision_round(hue * 360.0 / 65535.0, 1)));
    }
    if !color.is_empty() {
        result.insert(meta.property("color"), Value::Object(color));
    }

    if let Some(options) = attribute_f64(message, "options") {
        result.insert(
            meta.property("color_options"),
            json!({ "execute_if_off": (options as u8) & 1 == 1 }),
        );
    }

    non_empty(result)
}

fn power_on_behavior(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let value = attribute_f64(message, "startUpOnOff")?;
    let behavior = match value as u8 {
        0 => "off",
        1 => "on",
        2 => "toggle",
        255 => "previous",
        _ => return None,
    };
    single(meta.property("power_on_behavior"), json!(behavior))
}

fn battery(_: &Definition, message: &Message, _: &ConvertMeta<'_>) -> Option<State> {
    let mut result = State::new();

    // ZCL reports half percent steps, 255 means invalid
    if let Some(percentage) = attribute_f64(message, "batteryPercentageRemaining")
        && percentage < 255.0
    {
        result.insert("battery".into(), number(precision_round(percentage / 2.0, 2)));
    }
    if let Some(voltage) = attribute_f64(message, "batteryVoltage")
        && voltage < 255.0
    {
        result.insert("voltage".into(), number(voltage * 100.0));
    }
    if let Some(alarm) = attribute_f64(message, "batteryAlarmState") {
        let alarm = alarm as u32;
        let low = [0x0F, 0x0F << 10, 0x0F << 20]
            .iter()
            .any(|mask| alarm & mask != 0);
        result.insert("battery_low".into(), json!(low));
    }

    non_empty(result)
}

fn temperature(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let value = attribute_f64(message, "measuredValue")?;
    single(meta.property("temperature"), number(precision_round(value / 100.0, 2)))
}

fn humidity(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let humidity = attribute_f64(message, "measuredValue")? / 100.0;
    // Some sensors publish unrealistic values, drop anything outside 0-100
    if !(0.0..=100.0).contains(&humidity) {
        return None;
    }
    single(meta.property("humidity"), number(precision_round(humidity, 2)))
}

fn device_temperature(_: &Definition, message: &Message, _: &ConvertMeta<'_>) -> Option<State> {
    let value = message.data.get("currentTemperature")?;
    single("device_temperature".to_string(), value.clone())
}

fn cached_factor(meta: &ConvertMeta<'_>, cluster: Cluster, multiplier: &str, divisor: &str) -> Option<f64> {
    let endpoint = meta.endpoint?;
    let multiplier = endpoint.cluster_attribute(cluster, multiplier)?.as_f64()?;
    let divisor = endpoint.cluster_attribute(cluster, divisor)?.as_f64()?;
    if multiplier == 0.0 || divisor == 0.0 {
        return None;
    }
    Some(multiplier / divisor)
}

fn electrical_measurement(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    const LOOKUP: &[(&str, &str, &str)] = &[
        ("activePower", "power", "acPower"),
        ("apparentPower", "power_apparent", "acPower"),
        ("reactivePower", "power_reactive", "acPower"),
        ("rmsCurrent", "current", "acCurrent"),
        ("rmsVoltage", "voltage", "acVoltage"),
        ("acFrequency", "ac_frequency", "acFrequency"),
    ];

    let mut result = State::new();
    for (attribute, name, factor) in LOOKUP {
        if let Some(value) = attribute_f64(message, attribute) {
            let factor = cached_factor(
                meta,
                Cluster::HaElectricalMeasurement,
                &format!("{}Multiplier", factor),
                &format!("{}Divisor", factor),
            )
            .unwrap_or(1.0);
            result.insert(meta.property(name), number(value * factor));
        }
    }
    if let Some(power_factor) = attribute_f64(message, "powerFactor") {
        result.insert(
            meta.property("power_factor"),
            number(precision_round(power_factor / 100.0, 2)),
        );
    }

    non_empty(result)
}

fn metering(_: &Definition, message: &Message, meta: &ConvertMeta<'_>) -> Option<State> {
    let factor = cached_factor(meta, Cluster::SeMetering, "multiplier", "divisor");
    let mut result = State::new();

    if let Some(demand) = attribute_f64(message, "instantaneousDemand") {
        // Demand is in kW once scaled
        let power = match factor {
            Some(factor) => demand * factor * 1000.0,
            None => demand,
        };
        result.insert(meta.property("power"), number(power));
    }
    if let Some(delivered) = attribute_f64(message, "currentSummDelivered") {
        result.insert(meta.property("energy"), number(delivered * factor.unwrap_or(1.0)));
    }
    if let Some(received) = attribute_f64(message, "currentSummReceived") {
        result.insert(
            meta.property("produced_energy"),
            number(received * factor.unwrap_or(1.0)),
        );
    }

    non_empty(result)
}
