//! Light helpers shared by the light archetypes and converters.

use crate::cluster::Cluster;
use crate::error::Result;
use crate::radio::{Device, Endpoint, Entity};
use crate::reporting;
use log::debug;

/// Clusters a light archetype binds and reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightCapabilities {
    pub level: bool,
    pub color_temp: bool,
    pub color: bool,
}

/// Bind and configure reporting for every light endpoint of `device`, then
/// read the color capabilities.
///
/// Capability reads are best effort: several bulbs answer them with
/// `UNSUPPORTED_ATTRIBUTE` and still work fine.
pub async fn configure(
    device: &dyn Device,
    coordinator: &dyn Entity,
    capabilities: LightCapabilities,
) -> Result<()> {
    for endpoint in device.endpoints() {
        if endpoint.supports_input_cluster(Cluster::GenOnOff) {
            configure_reporting(endpoint.as_ref(), coordinator, capabilities).await?;
        }
    }

    // Every color endpoint is probed, whatever the archetype
    for endpoint in device.endpoints() {
        if !endpoint.supports_input_cluster(Cluster::LightingColorCtrl) {
            continue;
        }
        if let Err(e) = read_color_capabilities(endpoint.as_ref()).await {
            debug!("Reading colorCapabilities of endpoint {} failed: {}", endpoint.id(), e);
        }
        if capabilities.color_temp
            && let Err(e) = read_color_temp_min_max(endpoint.as_ref()).await
        {
            debug!("Reading color temperature range of endpoint {} failed: {}", endpoint.id(), e);
        }
    }
    Ok(())
}

async fn configure_reporting(
    endpoint: &dyn Endpoint,
    coordinator: &dyn Entity,
    capabilities: LightCapabilities,
) -> Result<()> {
    let mut clusters = vec![Cluster::GenOnOff];
    if capabilities.level && endpoint.supports_input_cluster(Cluster::GenLevelCtrl) {
        clusters.push(Cluster::GenLevelCtrl);
    }
    let color = (capabilities.color_temp || capabilities.color)
        && endpoint.supports_input_cluster(Cluster::LightingColorCtrl);
    if color {
        clusters.push(Cluster::LightingColorCtrl);
    }

    reporting::bind(endpoint, coordinator, &clusters).await?;
    reporting::on_off(endpoint, None).await?;
    if clusters.contains(&Cluster::GenLevelCtrl) {
        reporting::brightness(endpoint, None).await?;
    }
    if color && capabilities.color_temp {
        reporting::color_temperature(endpoint, None).await?;
    }
    Ok(())
}

pub async fn read_color_capabilities(endpoint: &dyn Endpoint) -> Result<()> {
    endpoint
        .read(Cluster::LightingColorCtrl, &["colorCapabilities"])
        .await?;
    Ok(())
}

pub async fn read_color_temp_min_max(endpoint: &dyn Endpoint) -> Result<()> {
    endpoint
        .read(
            Cluster::LightingColorCtrl,
            &["colorTempPhysicalMin", "colorTempPhysicalMax"],
        )
        .await?;
    Ok(())
}

/// Physical color temperature range as cached from a previous read.
pub fn find_color_temp_range(endpoint: &dyn Endpoint) -> (Option<u16>, Option<u16>) {
    let read = |attribute| {
        endpoint
            .cluster_attribute(Cluster::LightingColorCtrl, attribute)
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
    };
    let range = (read("colorTempPhysicalMin"), read("colorTempPhysicalMax"));
    if range.0.is_none() || range.1.is_none() {
        debug!(
            "Missing colorTempPhysicalMin and/or colorTempPhysicalMax for endpoint {}",
            endpoint.id()
        );
    }
    range
}

pub fn clamp_color_temp(color_temp: u16, min: Option<u16>, max: Option<u16>) -> u16 {
    if let Some(min) = min
        && color_temp < min
    {
        debug!("Requested color_temp {} is lower than minimum supported {}, using minimum", color_temp, min);
        return min;
    }
    if let Some(max) = max
        && color_temp > max
    {
        debug!("Requested color_temp {} is higher than maximum supported {}, using maximum", color_temp, max);
        return max;
    }
    color_temp
}

/// CIE 1931 xy of an sRGB color, Wide RGB D65 conversion.
pub fn rgb_to_xy(r: u8, g: u8, b: u8) -> (f64, f64) {
    let gamma = |c: u8| {
        let c = f64::from(c) / 255.0;
        if c > 0.04045 {
            ((c + 0.055) / 1.055).powf(2.4)
        } else {
            c / 12.92
        }
    };
    let (r, g, b) = (gamma(r), gamma(g), gamma(b));

    let x = r * 0.649926 + g * 0.103455 + b * 0.197109;
    let y = r * 0.234327 + g * 0.743075 + b * 0.022598;
    let z = g * 0.053077 + b * 1.035763;

    let sum = x + y + z;
    if sum == 0.0 {
        return (0.0, 0.0);
    }
    (x / sum, y / sum)
}

/// sRGB of a hue (degrees) and saturation (percent) at full value.
pub fn hs_to_rgb(hue: f64, saturation: f64) -> (u8, u8, u8) {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let c = s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = 1.0 - c;
    let (r, g, b) = match h as u8 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let scale = |v: f64| ((v + m) * 255.0).round() as u8;
    (scale(r), scale(g), scale(b))
}

/// Parse `#rrggbb` or `rrggbb`.
pub fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
