//! Shared `toZigbee` converters.

use super::from_zigbee::number;
use super::{Converter, SetMeta, State, ToZigbee, expect_number, precision_round};
use crate::cluster::Cluster;
use crate::error::{DefinitionError, Result};
use crate::light::{clamp_color_temp, find_color_temp_range, hs_to_rgb, parse_hex, rgb_to_xy};
use crate::radio::{AttributeValues, Endpoint};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Duration;

/// Declare a unit converter type with its singleton and id.
macro_rules! tz_converter {
    ($(#[$doc:meta])* $name:ident: $ty:ident = $id:literal) => {
        $(#[$doc])*
        pub struct $ty;

        $(#[$doc])*
        pub static $name: $ty = $ty;

        impl Converter for $ty {
            fn id(&self) -> &'static str {
                $id
            }
        }
    };
}

/// Linear map of `value` from one range onto another, rounded.
pub(crate) fn map_number_range(value: f64, from_low: f64, from_high: f64, to_low: f64, to_high: f64) -> f64 {
    (to_low + (value - from_low) * (to_high - to_low) / (from_high - from_low)).round()
}

fn attributes(pairs: &[(&str, Value)]) -> AttributeValues {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn state_of(pairs: &[(&str, Value)]) -> Option<State> {
    Some(attributes(pairs))
}

fn lowercase_str(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_lowercase)
        .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected a string, got {}", value)))
}

fn lookup(key: &str, value: &str, table: &[(&str, u16)]) -> Result<u16> {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            let names: Vec<&str> = table.iter().map(|(name, _)| *name).collect();
            DefinitionError::invalid_value(key, format!("'{}' is not one of {}", value, names.join(", ")))
        })
}

fn is_on(meta: &SetMeta<'_>) -> bool {
    meta.state.get(&meta.property("state")).and_then(Value::as_str) == Some("ON")
}

tz_converter!(ON_OFF: OnOff = "on_off");

#[async_trait]
impl ToZigbee for OnOff {
    fn keys(&self) -> &'static [&'static str] {
        &["state", "on_time", "off_wait_time"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let requested = if key == "state" {
            value
        } else {
            meta.message.get("state").unwrap_or(&Value::Null)
        };
        let state = lowercase_str("state", requested)?;
        if !["on", "off", "toggle"].contains(&state.as_str()) {
            return Err(DefinitionError::invalid_value(
                "state",
                format!("'{}' must be 'ON', 'OFF' or 'TOGGLE'", state),
            ));
        }

        let on_time = meta.message.get("on_time");
        let off_wait_time = meta.message.get("off_wait_time");
        if state == "on" && (on_time.is_some() || off_wait_time.is_some()) {
            let on_time = on_time.map(|v| expect_number("on_time", v)).transpose()?.unwrap_or(0.0);
            let off_wait_time = off_wait_time
                .map(|v| expect_number("off_wait_time", v))
                .transpose()?
                .unwrap_or(0.0);
            let payload = json!({
                "ctrlbits": 0,
                "ontime": (on_time * 10.0).round() as u32,
                "offwaittime": (off_wait_time * 10.0).round() as u32,
            });
            endpoint.command(Cluster::GenOnOff, "onWithTimedOff", payload).await?;
            return Ok(None);
        }

        endpoint.command(Cluster::GenOnOff, &state, json!({})).await?;
        if state == "toggle" {
            let current = meta.state.get(&meta.property("state")).and_then(Value::as_str);
            return Ok(current.and_then(|current| {
                let flipped = if current == "OFF" { "ON" } else { "OFF" };
                state_of(&[("state", json!(flipped))])
            }));
        }
        Ok(state_of(&[("state", json!(state.to_uppercase()))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint.read(Cluster::GenOnOff, &["onOff"]).await?;
        Ok(())
    }
}

tz_converter!(LIGHT_ONOFF_BRIGHTNESS: LightOnOffBrightness = "light_onoff_brightness");

impl LightOnOffBrightness {
    fn requested_brightness(meta: &SetMeta<'_>) -> Result<Option<f64>> {
        let brightness = if let Some(value) = meta.message.get("brightness") {
            Some(expect_number("brightness", value)?)
        } else if let Some(value) = meta.message.get("brightness_percent") {
            let percent = expect_number("brightness_percent", value)?;
            Some(map_number_range(percent, 0.0, 100.0, 0.0, 255.0))
        } else {
            None
        };

        // 255 is accepted for backwards compatibility
        let brightness = brightness.map(|b| if b == 255.0 { 254.0 } else { b });
        if let Some(b) = brightness
            && !(0.0..=254.0).contains(&b)
        {
            return Err(DefinitionError::invalid_value(
                "brightness",
                format!("{} must be a number >= 0 and <= 254", b),
            ));
        }
        Ok(brightness)
    }

    async fn move_to_level(endpoint: &dyn Endpoint, level: f64, meta: &SetMeta<'_>) -> Result<()> {
        let payload = json!({"level": level as u8, "transtime": meta.transition_time()});
        endpoint
            .command(Cluster::GenLevelCtrl, "moveToLevelWithOnOff", payload)
            .await
    }
}

#[async_trait]
impl ToZigbee for LightOnOffBrightness {
    fn keys(&self) -> &'static [&'static str] {
        &["state", "brightness", "brightness_percent", "on_time", "off_wait_time"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        _key: &str,
        _value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let brightness = Self::requested_brightness(meta)?;
        let state = match meta.message.get("state") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let state = lowercase_str("state", value)?;
                if !["on", "off", "toggle"].contains(&state.as_str()) {
                    return Err(DefinitionError::invalid_value(
                        "state",
                        format!("'{}' must be 'ON', 'OFF' or 'TOGGLE'", state),
                    ));
                }
                Some(state)
            }
        };

        let state = match (state, brightness) {
            (Some(state), _) => state,
            (None, Some(b)) => (if b == 0.0 { "off" } else { "on" }).to_string(),
            (None, None) => {
                return Err(DefinitionError::invalid_value(
                    "state",
                    "at least one of brightness or state must have a value",
                ));
            }
        };
        let target = match state.as_str() {
            "toggle" if is_on(meta) => "off",
            "toggle" => "on",
            other => other,
        };
        let store = &meta.context.store;

        if target == "off" {
            let with_level = meta.has_transition() || brightness == Some(0.0);
            if is_on(meta)
                && let Some(current) = meta.state.get(&meta.property("brightness")).and_then(Value::as_f64)
            {
                // Off with a transition clobbers the current level
                store.put_value(endpoint, "brightness", current)?;
                store.put_value(endpoint, "turned_off_with_transition", with_level)?;
            }
            if with_level {
                Self::move_to_level(endpoint, 0.0, meta).await?;
                return Ok(state_of(&[("state", json!("OFF"))]));
            }
            return ON_OFF.convert_set(endpoint, "state", &json!(state), meta).await;
        }

        let Some(brightness) = brightness else {
            let restore = store.get_value_or(endpoint, "turned_off_with_transition", false)?;
            if meta.has_transition() || restore {
                let level = store.get_value_or(endpoint, "brightness", 254.0_f64)?;
                store.clear_value(endpoint, "turned_off_with_transition")?;
                Self::move_to_level(endpoint, level, meta).await?;
                return Ok(state_of(&[("state", json!("ON")), ("brightness", number(level))]));
            }
            return ON_OFF.convert_set(endpoint, "state", &json!(state), meta).await;
        };

        Self::move_to_level(endpoint, brightness, meta).await?;
        store.put_value(endpoint, "brightness", brightness)?;
        Ok(state_of(&[("state", json!("ON")), ("brightness", number(brightness))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        if key == "brightness" || key == "brightness_percent" {
            endpoint.read(Cluster::GenLevelCtrl, &["currentLevel"]).await?;
        } else {
            endpoint.read(Cluster::GenOnOff, &["onOff"]).await?;
        }
        Ok(())
    }
}

/// Resolve a color temperature given as mired number, numeric string or preset name.
fn color_temp_value(key: &str, value: &Value, min: Option<u16>, max: Option<u16>, allow_previous: bool) -> Result<u16> {
    let mired = match value {
        Value::String(name) => match name.as_str() {
            "coolest" => f64::from(min.unwrap_or(154)),
            "cool" => 250.0,
            "neutral" => 370.0,
            "warm" => 454.0,
            "warmest" => f64::from(max.unwrap_or(500)),
            "previous" if allow_previous => 65535.0,
            other => other
                .parse::<f64>()
                .map_err(|_| DefinitionError::invalid_value(key, format!("unknown preset '{}'", other)))?,
        },
        other => expect_number(key, other)?,
    };
    Ok(mired.round().clamp(0.0, 65535.0) as u16)
}

tz_converter!(LIGHT_COLORTEMP: LightColorTemp = "light_colortemp");

#[async_trait]
impl ToZigbee for LightColorTemp {
    fn keys(&self) -> &'static [&'static str] {
        &["color_temp", "color_temp_percent"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let (min, max) = find_color_temp_range(endpoint);
        let requested = if key == "color_temp_percent" {
            let percent = expect_number(key, value)?;
            let low = f64::from(min.unwrap_or(154));
            let high = f64::from(max.unwrap_or(500));
            json!(map_number_range(percent, 0.0, 100.0, low, high))
        } else {
            value.clone()
        };

        let color_temp = clamp_color_temp(color_temp_value(key, &requested, min, max, false)?, min, max);
        let payload = json!({"colortemp": color_temp, "transtime": meta.transition_time()});
        endpoint
            .command(Cluster::LightingColorCtrl, "moveToColorTemp", payload)
            .await?;
        Ok(state_of(&[("color_mode", json!("color_temp")), ("color_temp", json!(color_temp))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint
            .read(Cluster::LightingColorCtrl, &["colorMode", "colorTemperature"])
            .await?;
        Ok(())
    }
}

/// A requested color, after parsing the accepted input shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RequestedColor {
    Xy { x: f64, y: f64 },
    Hs { hue: Option<f64>, saturation: Option<f64> },
}

impl RequestedColor {
    fn parse(value: &Value) -> Result<Self> {
        let invalid = || DefinitionError::invalid_value("color", format!("invalid color {}", value));
        let from_rgb = |(r, g, b): (u8, u8, u8)| {
            let (x, y) = rgb_to_xy(r, g, b);
            RequestedColor::Xy {
                x: precision_round(x, 4),
                y: precision_round(y, 4),
            }
        };

        if let Some(hex) = value.as_str() {
            return parse_hex(hex).map(from_rgb).ok_or_else(invalid);
        }
        let object = value.as_object().ok_or_else(invalid)?;
        let field = |name: &str| object.get(name).and_then(Value::as_f64);

        if let (Some(x), Some(y)) = (field("x"), field("y")) {
            return Ok(RequestedColor::Xy { x, y });
        }
        if let (Some(r), Some(g), Some(b)) = (field("r"), field("g"), field("b")) {
            let channel = |c: f64| c.clamp(0.0, 255.0) as u8;
            return Ok(from_rgb((channel(r), channel(g), channel(b))));
        }
        if let Some(hex) = object.get("hex").and_then(Value::as_str) {
            return parse_hex(hex).map(from_rgb).ok_or_else(invalid);
        }
        let (hue, saturation) = (field("hue"), field("saturation"));
        if hue.is_some() || saturation.is_some() {
            return Ok(RequestedColor::Hs { hue, saturation });
        }
        Err(invalid())
    }
}

tz_converter!(LIGHT_COLOR: LightColor = "light_color");

#[async_trait]
impl ToZigbee for LightColor {
    fn keys(&self) -> &'static [&'static str] {
        &["color"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let transtime = meta.transition_time();
        let mut color = RequestedColor::parse(value)?;

        if let RequestedColor::Hs { hue, saturation } = color
            && !meta.definition.supports_hs
        {
            let (Some(hue), Some(saturation)) = (hue, saturation) else {
                return Err(DefinitionError::invalid_value(
                    key,
                    "this light does not support hue/saturation, use x/y instead",
                ));
            };
            let (r, g, b) = hs_to_rgb(hue, saturation);
            let (x, y) = rgb_to_xy(r, g, b);
            color = RequestedColor::Xy {
                x: precision_round(x, 4),
                y: precision_round(y, 4),
            };
        }

        match color {
            RequestedColor::Xy { x, y } => {
                let payload = json!({
                    "transtime": transtime,
                    "colorx": map_number_range(x, 0.0, 1.0, 0.0, 65535.0) as u16,
                    "colory": map_number_range(y, 0.0, 1.0, 0.0, 65535.0) as u16,
                });
                endpoint
                    .command(Cluster::LightingColorCtrl, "moveToColor", payload)
                    .await?;
                Ok(state_of(&[("color_mode", json!("xy")), ("color", json!({"x": x, "y": y}))]))
            }
            RequestedColor::Hs { hue, saturation } => {
                let hue_raw = hue.map(|h| map_number_range(h.rem_euclid(360.0), 0.0, 360.0, 0.0, 254.0) as u8);
                let saturation_raw = saturation.map(|s| map_number_range(s, 0.0, 100.0, 0.0, 254.0) as u8);
                let (command, payload) = match (hue_raw, saturation_raw) {
                    (Some(hue), Some(saturation)) => (
                        "moveToHueAndSaturation",
                        json!({"transtime": transtime, "hue": hue, "saturation": saturation}),
                    ),
                    (Some(hue), None) => (
                        "moveToHue",
                        json!({"transtime": transtime, "hue": hue, "direction": 0}),
                    ),
                    (None, Some(saturation)) => (
                        "moveToSaturation",
                        json!({"transtime": transtime, "saturation": saturation}),
                    ),
                    (None, None) => return Err(DefinitionError::invalid_value(key, "missing hue and saturation")),
                };
                endpoint.command(Cluster::LightingColorCtrl, command, payload).await?;

                let mut color = State::new();
                if let Some(hue) = hue {
                    color.insert("hue".to_string(), number(hue));
                }
                if let Some(saturation) = saturation {
                    color.insert("saturation".to_string(), number(saturation));
                }
                Ok(state_of(&[("color_mode", json!("hs")), ("color", Value::Object(color))]))
            }
        }
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, meta: &SetMeta<'_>) -> Result<()> {
        endpoint
            .read(Cluster::LightingColorCtrl, color_attributes(meta, false))
            .await?;
        Ok(())
    }
}

fn color_attributes(meta: &SetMeta<'_>, with_color_temp: bool) -> &'static [&'static str] {
    match (meta.definition.supports_hs, with_color_temp) {
        (true, true) => &["currentX", "currentY", "currentHue", "currentSaturation", "colorMode", "colorTemperature"],
        (true, false) => &["currentX", "currentY", "currentHue", "currentSaturation", "colorMode"],
        (false, true) => &["currentX", "currentY", "colorMode", "colorTemperature"],
        (false, false) => &["currentX", "currentY", "colorMode"],
    }
}

tz_converter!(
    /// Color and color temperature in one converter, reads both back together.
    LIGHT_COLOR_COLORTEMP: LightColorColorTemp = "light_color_colortemp"
);

#[async_trait]
impl ToZigbee for LightColorColorTemp {
    fn keys(&self) -> &'static [&'static str] {
        &["color", "color_temp", "color_temp_percent"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        if key == "color" {
            LIGHT_COLOR.convert_set(endpoint, key, value, meta).await
        } else {
            LIGHT_COLORTEMP.convert_set(endpoint, key, value, meta).await
        }
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, meta: &SetMeta<'_>) -> Result<()> {
        endpoint
            .read(Cluster::LightingColorCtrl, color_attributes(meta, true))
            .await?;
        Ok(())
    }
}

tz_converter!(IGNORE_TRANSITION: IgnoreTransition = "ignore_transition");

#[async_trait]
impl ToZigbee for IgnoreTransition {
    fn keys(&self) -> &'static [&'static str] {
        &["transition"]
    }

    async fn convert_set(&self, _: &dyn Endpoint, _: &str, _: &Value, _: &SetMeta<'_>) -> Result<Option<State>> {
        Ok(None)
    }
}

tz_converter!(IGNORE_RATE: IgnoreRate = "ignore_rate");

#[async_trait]
impl ToZigbee for IgnoreRate {
    fn keys(&self) -> &'static [&'static str] {
        &["rate"]
    }

    async fn convert_set(&self, _: &dyn Endpoint, _: &str, _: &Value, _: &SetMeta<'_>) -> Result<Option<State>> {
        Ok(None)
    }
}

fn is_stop(value: &Value) -> bool {
    value.as_str() == Some("stop") || value.as_f64() == Some(0.0)
}

fn numeric_or_string(key: &str, value: &Value) -> Result<f64> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| DefinitionError::invalid_value(key, format!("expected a number, got '{}'", s))),
        other => expect_number(key, other),
    }
}

tz_converter!(LIGHT_BRIGHTNESS_MOVE: LightBrightnessMove = "light_brightness_move");

#[async_trait]
impl ToZigbee for LightBrightnessMove {
    fn keys(&self) -> &'static [&'static str] {
        &["brightness_move", "brightness_move_onoff"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        if is_stop(value) {
            endpoint.command(Cluster::GenLevelCtrl, "stop", json!({})).await?;

            // The new level is unknown until the device settles
            tokio::time::sleep(Duration::from_millis(500)).await;
            let on_off = endpoint.read(Cluster::GenOnOff, &["onOff"]).await?;
            let level = endpoint.read(Cluster::GenLevelCtrl, &["currentLevel"]).await?;
            let mut state = State::new();
            if let Some(level) = level.get("currentLevel") {
                state.insert("brightness".to_string(), level.clone());
            }
            if let Some(on_off) = on_off.get("onOff").and_then(Value::as_u64) {
                state.insert("state".to_string(), json!(if on_off == 1 { "ON" } else { "OFF" }));
            }
            return Ok(Some(state));
        }

        let rate = numeric_or_string(key, value)?;
        let payload = json!({"movemode": if rate > 0.0 { 0 } else { 1 }, "rate": rate.abs() as u8});
        let command = if key.ends_with("onoff") { "moveWithOnOff" } else { "move" };
        endpoint.command(Cluster::GenLevelCtrl, command, payload).await?;
        Ok(None)
    }
}

tz_converter!(LIGHT_BRIGHTNESS_STEP: LightBrightnessStep = "light_brightness_step");

#[async_trait]
impl ToZigbee for LightBrightnessStep {
    fn keys(&self) -> &'static [&'static str] {
        &["brightness_step", "brightness_step_onoff"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let on_off = key.ends_with("_onoff");
        let step = numeric_or_string(key, value)?;
        let payload = json!({
            "stepmode": if step > 0.0 { 0 } else { 1 },
            "stepsize": step.abs() as u8,
            "transtime": meta.transition_time(),
        });
        let command = if on_off { "stepWithOnOff" } else { "step" };
        endpoint.command(Cluster::GenLevelCtrl, command, payload).await?;

        let Some(current) = meta.state.get(&meta.property("brightness")).and_then(Value::as_f64) else {
            return Ok(None);
        };
        let mut brightness = if on_off || is_on(meta) { current + step } else { current };
        let floor = if on_off || !is_on(meta) { 0.0 } else { 1.0 };
        brightness = brightness.clamp(floor, 254.0);
        let state = if brightness == 0.0 { "OFF" } else { "ON" };
        Ok(state_of(&[("brightness", number(brightness)), ("state", json!(state))]))
    }
}

tz_converter!(LIGHT_COLORTEMP_MOVE: LightColorTempMove = "light_colortemp_move");

#[async_trait]
impl ToZigbee for LightColorTempMove {
    fn keys(&self) -> &'static [&'static str] {
        &["colortemp_move", "color_temp_move"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let (min, max) = find_color_temp_range(endpoint);
        let message_rate = || meta.message.get("rate").and_then(Value::as_f64).unwrap_or(55.0);

        let (movemode, rate) = match value {
            Value::String(s) => match s.to_lowercase().as_str() {
                "stop" | "release" | "0" => (0, 1.0),
                "up" | "1" => (1, message_rate()),
                "down" => (3, message_rate()),
                other => {
                    return Err(DefinitionError::invalid_value(
                        key,
                        format!("'{}' must be 'up', 'down' or 'stop'", other),
                    ));
                }
            },
            other => {
                let rate = expect_number(key, other)?;
                if rate == 0.0 {
                    (0, 1.0)
                } else if rate > 0.0 {
                    (1, rate)
                } else {
                    (3, rate.abs())
                }
            }
        };

        let payload = json!({
            "movemode": movemode,
            "rate": rate.round() as u16,
            "minimum": min.unwrap_or(0),
            "maximum": max.unwrap_or(600),
        });
        endpoint
            .command(Cluster::LightingColorCtrl, "moveColorTemp", payload)
            .await?;
        Ok(None)
    }
}

tz_converter!(LIGHT_COLORTEMP_STEP: LightColorTempStep = "light_colortemp_step");

#[async_trait]
impl ToZigbee for LightColorTempStep {
    fn keys(&self) -> &'static [&'static str] {
        &["color_temp_step"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let step = numeric_or_string(key, value)?;
        let transition = meta.transition_time();
        let payload = json!({
            "stepmode": if step > 0.0 { 1 } else { 3 },
            "stepsize": step.abs() as u16,
            "transtime": transition,
            "minimum": 0,
            "maximum": 600,
        });
        endpoint
            .command(Cluster::LightingColorCtrl, "stepColorTemp", payload)
            .await?;

        // Limits and color mode are only known to the device, read the outcome back
        tokio::time::sleep(Duration::from_millis(100 + u64::from(transition) * 100)).await;
        endpoint
            .read(Cluster::LightingColorCtrl, &["colorTemperature"])
            .await?;
        Ok(None)
    }
}

fn hue_or_saturation(key: &str) -> (&'static str, &'static str, &'static str) {
    if key.starts_with("hue") {
        ("moveHue", "stepHue", "currentHue")
    } else {
        ("moveSaturation", "stepSaturation", "currentSaturation")
    }
}

tz_converter!(LIGHT_HUE_SATURATION_MOVE: LightHueSaturationMove = "light_hue_saturation_move");

#[async_trait]
impl ToZigbee for LightHueSaturationMove {
    fn keys(&self) -> &'static [&'static str] {
        &["hue_move", "saturation_move"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let (command, _, attribute) = hue_or_saturation(key);
        let stop = is_stop(value);
        let (movemode, rate) = if stop {
            (0, 1.0)
        } else {
            let rate = numeric_or_string(key, value)?;
            (if rate > 0.0 { 1 } else { 3 }, rate.abs())
        };

        endpoint
            .command(
                Cluster::LightingColorCtrl,
                command,
                json!({"rate": rate as u8, "movemode": movemode}),
            )
            .await?;

        if stop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            endpoint
                .read(Cluster::LightingColorCtrl, &[attribute, "colorMode"])
                .await?;
        }
        Ok(None)
    }
}

tz_converter!(LIGHT_HUE_SATURATION_STEP: LightHueSaturationStep = "light_hue_saturation_step");

#[async_trait]
impl ToZigbee for LightHueSaturationStep {
    fn keys(&self) -> &'static [&'static str] {
        &["hue_step", "saturation_step"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let (_, command, attribute) = hue_or_saturation(key);
        let step = numeric_or_string(key, value)?;
        let transition = meta.transition_time();
        let payload = json!({
            "stepmode": if step > 0.0 { 1 } else { 3 },
            "stepsize": step.abs() as u8,
            "transtime": transition,
        });
        endpoint.command(Cluster::LightingColorCtrl, command, payload).await?;

        tokio::time::sleep(Duration::from_millis(100 + u64::from(transition) * 100)).await;
        endpoint
            .read(Cluster::LightingColorCtrl, &[attribute, "colorMode"])
            .await?;
        Ok(None)
    }
}

tz_converter!(LIGHT_COLORTEMP_STARTUP: LightColorTempStartup = "light_colortemp_startup");

#[async_trait]
impl ToZigbee for LightColorTempStartup {
    fn keys(&self) -> &'static [&'static str] {
        &["color_temp_startup"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let (min, max) = find_color_temp_range(endpoint);
        let mut color_temp = color_temp_value(key, value, min, max, true)?;
        // 0xffff restores the previous value and is never clamped
        if color_temp != 65535 {
            color_temp = clamp_color_temp(color_temp, min, max);
        }

        endpoint
            .write(
                Cluster::LightingColorCtrl,
                attributes(&[("startUpColorTemperature", json!(color_temp))]),
            )
            .await?;
        Ok(state_of(&[("color_temp_startup", json!(color_temp))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint
            .read(Cluster::LightingColorCtrl, &["startUpColorTemperature"])
            .await?;
        Ok(())
    }
}

tz_converter!(LEVEL_CONFIG: LevelConfig = "level_config");

impl LevelConfig {
    fn transition_time(key: &str, value: &Value, max: f64) -> Result<u16> {
        if value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("disabled")) {
            return Ok(65535);
        }
        Ok(numeric_or_string(key, value)?.clamp(0.0, max) as u16)
    }
}

#[async_trait]
impl ToZigbee for LevelConfig {
    fn keys(&self) -> &'static [&'static str] {
        &["level_config"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let parsed;
        let value = match value {
            Value::String(s) => {
                parsed = serde_json::from_str::<Value>(s)
                    .map_err(|_| DefinitionError::invalid_value(key, "payload is not valid JSON"))?;
                &parsed
            }
            other => other,
        };
        let config = value
            .as_object()
            .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected an object, got {}", value)))?;
        let mut state = State::new();

        if let Some(v) = config.get("on_off_transition_time") {
            let time = Self::transition_time("on_off_transition_time", v, 65535.0)?;
            endpoint
                .write(Cluster::GenLevelCtrl, attributes(&[("onOffTransitionTime", json!(time))]))
                .await?;
            state.insert("on_off_transition_time".to_string(), json!(time));
        }

        for (property, attribute) in [
            ("on_transition_time", "onTransitionTime"),
            ("off_transition_time", "offTransitionTime"),
        ] {
            if let Some(v) = config.get(property) {
                // 0xffff means "use onOffTransitionTime", reachable through the preset only
                let time = Self::transition_time(property, v, 65534.0)?;
                endpoint
                    .write(Cluster::GenLevelCtrl, attributes(&[(attribute, json!(time))]))
                    .await?;
                let published = if time == 65535 { json!("disabled") } else { json!(time) };
                state.insert(property.to_string(), published);
            }
        }

        if let Some(v) = config.get("current_level_startup") {
            let level = match v.as_str().map(str::to_lowercase).as_deref() {
                Some("minimum") => 0,
                Some("previous") => 255,
                _ => numeric_or_string("current_level_startup", v)?.clamp(1.0, 254.0) as u8,
            };
            endpoint
                .write(Cluster::GenLevelCtrl, attributes(&[("startUpCurrentLevel", json!(level))]))
                .await?;
            let published = match level {
                0 => json!("minimum"),
                255 => json!("previous"),
                level => json!(level),
            };
            state.insert("current_level_startup".to_string(), published);
        }

        if state.is_empty() {
            return Err(DefinitionError::invalid_value(key, "no known level_config attribute given"));
        }
        Ok(state_of(&[("level_config", Value::Object(state))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint
            .read(
                Cluster::GenLevelCtrl,
                &["onOffTransitionTime", "onTransitionTime", "offTransitionTime", "startUpCurrentLevel"],
            )
            .await?;
        Ok(())
    }
}

tz_converter!(POWER_ON_BEHAVIOR: PowerOnBehavior = "power_on_behavior");

#[async_trait]
impl ToZigbee for PowerOnBehavior {
    fn keys(&self) -> &'static [&'static str] {
        &["power_on_behavior"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let behavior = lowercase_str(key, value)?;
        let start_up = lookup(key, &behavior, &[("off", 0), ("on", 1), ("toggle", 2), ("previous", 255)])?;
        endpoint
            .write(Cluster::GenOnOff, attributes(&[("startUpOnOff", json!(start_up))]))
            .await?;
        Ok(state_of(&[("power_on_behavior", json!(behavior))]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint.read(Cluster::GenOnOff, &["startUpOnOff"]).await?;
        Ok(())
    }
}

tz_converter!(LIGHT_COLOR_OPTIONS: LightColorOptions = "light_color_options");

#[async_trait]
impl ToZigbee for LightColorOptions {
    fn keys(&self) -> &'static [&'static str] {
        &["color_options"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let options = value
            .as_object()
            .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected an object, got {}", value)))?;
        let execute_if_off = options.get("execute_if_off").and_then(Value::as_bool).unwrap_or(false);
        endpoint
            .write(
                Cluster::LightingColorCtrl,
                attributes(&[("options", json!(u8::from(execute_if_off)))]),
            )
            .await?;
        Ok(state_of(&[("color_options", value.clone())]))
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint.read(Cluster::LightingColorCtrl, &["options"]).await?;
        Ok(())
    }
}

tz_converter!(LIGHT_COLOR_MODE: LightColorMode = "light_color_mode");

#[async_trait]
impl ToZigbee for LightColorMode {
    fn keys(&self) -> &'static [&'static str] {
        &["color_mode"]
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, _key: &str, _meta: &SetMeta<'_>) -> Result<()> {
        endpoint.read(Cluster::LightingColorCtrl, &["colorMode"]).await?;
        Ok(())
    }
}

tz_converter!(EFFECT: Effect = "effect");

#[async_trait]
impl ToZigbee for Effect {
    fn keys(&self) -> &'static [&'static str] {
        &["effect"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let effect = lowercase_str(key, value)?;
        let effect_id = lookup(
            key,
            &effect,
            &[
                ("blink", 0),
                ("breathe", 1),
                ("okay", 2),
                ("channel_change", 11),
                ("finish_effect", 254),
                ("stop_effect", 255),
            ],
        )?;
        endpoint
            .command(
                Cluster::GenIdentify,
                "triggerEffect",
                json!({"effectid": effect_id, "effectvariant": 0}),
            )
            .await?;
        Ok(None)
    }
}

fn cluster_field(key: &str, request: &serde_json::Map<String, Value>) -> Result<Cluster> {
    let name = request
        .get("cluster")
        .and_then(Value::as_str)
        .ok_or_else(|| DefinitionError::invalid_value(key, "missing 'cluster'"))?;
    Cluster::from_str(name).map_err(|_| DefinitionError::invalid_value(key, format!("unknown cluster '{}'", name)))
}

tz_converter!(
    /// Generic attribute read, `{"cluster": .., "attributes": [..]}`.
    READ: Read = "read"
);

#[async_trait]
impl ToZigbee for Read {
    fn keys(&self) -> &'static [&'static str] {
        &["read"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let request = value
            .as_object()
            .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected an object, got {}", value)))?;
        let cluster = cluster_field(key, request)?;
        let names: Vec<&str> = request
            .get("attributes")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if names.is_empty() {
            return Err(DefinitionError::invalid_value(key, "missing 'attributes'"));
        }

        let result = endpoint.read(cluster, &names).await?;
        info!("Read result of '{}': {}", cluster, Value::Object(result.clone()));
        Ok(request
            .get("state_property")
            .and_then(Value::as_str)
            .and_then(|property| state_of(&[(property, Value::Object(result))])))
    }
}

tz_converter!(
    /// Generic attribute write, `{"cluster": .., "payload": {..}}`.
    WRITE: Write = "write"
);

#[async_trait]
impl ToZigbee for Write {
    fn keys(&self) -> &'static [&'static str] {
        &["write"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let request = value
            .as_object()
            .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected an object, got {}", value)))?;
        let cluster = cluster_field(key, request)?;
        let payload = request
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| DefinitionError::invalid_value(key, "missing 'payload'"))?;

        info!("Wrote '{}' to '{}'", Value::Object(payload.clone()), cluster);
        endpoint.write(cluster, payload).await?;
        Ok(None)
    }
}

tz_converter!(
    /// Ledvance/Osram startup parameters and default transition.
    LEDVANCE_COMMANDS: LedvanceCommands = "ledvance_commands"
);

#[async_trait]
impl ToZigbee for LedvanceCommands {
    fn keys(&self) -> &'static [&'static str] {
        &["set_transition", "remember_state"]
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        _meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        match key {
            "set_transition" => {
                let seconds = expect_number(key, value)?;
                // Half second resolution, in tenths
                let transition = if seconds > 1.0 {
                    ((seconds * 2.0).round() / 2.0 * 10.0) as u16
                } else {
                    1
                };
                endpoint
                    .write(
                        Cluster::GenLevelCtrl,
                        attributes(&[
                            ("onTransitionTime", json!(transition)),
                            ("offTransitionTime", json!(transition)),
                        ]),
                    )
                    .await?;
            }
            _ => {
                let remember = value
                    .as_bool()
                    .ok_or_else(|| DefinitionError::invalid_value(key, format!("expected a boolean, got {}", value)))?;
                let command = if remember { "saveStartupParams" } else { "resetStartupParams" };
                endpoint
                    .command(Cluster::ManuSpecificOsram, command, json!({}))
                    .await?;
            }
        }
        Ok(None)
    }
}

/// Gledopto firmware runs transitions about 3.3 times faster than requested
/// and switches the light on whenever a color is set.
pub struct GledoptoConverter {
    id: &'static str,
    keys: &'static [&'static str],
    inner: &'static dyn ToZigbee,
    turns_on: bool,
}

const GLEDOPTO_TRANSITION_SCALE: f64 = 3.3;

impl Converter for GledoptoConverter {
    fn id(&self) -> &'static str {
        self.id
    }
}

#[async_trait]
impl ToZigbee for GledoptoConverter {
    fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    async fn convert_set(
        &self,
        endpoint: &dyn Endpoint,
        key: &str,
        value: &Value,
        meta: &SetMeta<'_>,
    ) -> Result<Option<State>> {
        let mut message = meta.message.clone();
        if let Some(seconds) = message.get("transition").and_then(Value::as_f64) {
            message.insert("transition".to_string(), json!(seconds * GLEDOPTO_TRANSITION_SCALE));
        }
        // Without a transition CCT leds stay on when switching to RGB
        if key == "color" && !message.get("transition").and_then(Value::as_f64).is_some_and(|t| t > 0.0) {
            message.insert("transition".to_string(), json!(0.4));
        }
        debug!("Gledopto {} transition {:?}", key, message.get("transition"));

        let scaled = SetMeta {
            message: &message,
            state: meta.state,
            context: meta.context,
            definition: meta.definition,
            endpoint_name: meta.endpoint_name,
        };
        let mut result = self.inner.convert_set(endpoint, key, value, &scaled).await?;
        if self.turns_on
            && let Some(state) = result.as_mut()
        {
            state.insert("state".to_string(), json!("ON"));
        }
        Ok(result)
    }

    async fn convert_get(&self, endpoint: &dyn Endpoint, key: &str, meta: &SetMeta<'_>) -> Result<()> {
        self.inner.convert_get(endpoint, key, meta).await
    }
}

pub static GLEDOPTO_LIGHT_ONOFF_BRIGHTNESS: GledoptoConverter = GledoptoConverter {
    id: "gledopto_light_onoff_brightness",
    keys: &["state", "brightness", "brightness_percent"],
    inner: &LIGHT_ONOFF_BRIGHTNESS,
    turns_on: false,
};

pub static GLEDOPTO_LIGHT_COLORTEMP: GledoptoConverter = GledoptoConverter {
    id: "gledopto_light_colortemp",
    keys: &["color_temp", "color_temp_percent"],
    inner: &LIGHT_COLORTEMP,
    turns_on: true,
};

pub static GLEDOPTO_LIGHT_COLOR: GledoptoConverter = GledoptoConverter {
    id: "gledopto_light_color",
    keys: &["color"],
    inner: &LIGHT_COLOR,
    turns_on: true,
};

pub static GLEDOPTO_LIGHT_COLOR_COLORTEMP: GledoptoConverter = GledoptoConverter {
    id: "gledopto_light_color_colortemp",
    keys: &["color", "color_temp", "color_temp_percent"],
    inner: &LIGHT_COLOR_COLORTEMP,
    turns_on: true,
};
