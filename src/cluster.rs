//! ZCL cluster catalog.
//!
//! Only the clusters referenced by the converters, reporting presets and
//! bundled device records are listed. Names follow the herdsman naming
//! (`genOnOff`, `lightingColorCtrl`, ...) and the discriminant is the ZCL
//! cluster id.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, FromRepr};

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[repr(u16)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Cluster {
    GenBasic = 0x0000,
    GenPowerCfg = 0x0001,
    GenDeviceTempCfg = 0x0002,
    GenIdentify = 0x0003,
    GenGroups = 0x0004,
    GenScenes = 0x0005,
    GenOnOff = 0x0006,
    GenLevelCtrl = 0x0008,
    GenBinaryInput = 0x000F,
    ClosuresDoorLock = 0x0101,
    ClosuresWindowCovering = 0x0102,
    HvacThermostat = 0x0201,
    HvacFanCtrl = 0x0202,
    HvacUserInterfaceCfg = 0x0204,
    LightingColorCtrl = 0x0300,
    MsIlluminanceMeasurement = 0x0400,
    MsTemperatureMeasurement = 0x0402,
    MsPressureMeasurement = 0x0403,
    MsRelativeHumidity = 0x0405,
    MsOccupancySensing = 0x0406,
    MsSoilMoisture = 0x0408,
    #[strum(serialize = "msCO2")]
    #[serde(rename = "msCO2")]
    MsCO2 = 0x040D,
    SsIasZone = 0x0500,
    SsIasWd = 0x0502,
    SeMetering = 0x0702,
    HaElectricalMeasurement = 0x0B04,
    Touchlink = 0x1000,
    ManuSpecificOsram = 0xFC0F,
}

impl Cluster {
    /// ZCL cluster id.
    pub fn id(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_herdsman_names() {
        assert_eq!(Cluster::GenOnOff.as_ref(), "genOnOff");
        assert_eq!(Cluster::LightingColorCtrl.to_string(), "lightingColorCtrl");
        assert_eq!(Cluster::MsCO2.as_ref(), "msCO2");
        assert_eq!(
            Cluster::from_str("haElectricalMeasurement").ok(),
            Some(Cluster::HaElectricalMeasurement)
        );
    }

    #[test]
    fn test_cluster_ids() {
        assert_eq!(Cluster::GenLevelCtrl.id(), 8);
        assert_eq!(Cluster::from_repr(0x0300), Some(Cluster::LightingColorCtrl));
        assert_eq!(Cluster::from_repr(0x1234), None);
    }

    #[test]
    fn test_serde_matches_strum() {
        let json = serde_json::to_string(&Cluster::SeMetering).unwrap();
        assert_eq!(json, "\"seMetering\"");
        let back: Cluster = serde_json::from_str("\"msCO2\"").unwrap();
        assert_eq!(back, Cluster::MsCO2);
    }
}
