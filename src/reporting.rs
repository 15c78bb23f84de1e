//! Attribute reporting presets.
//!
//! Each helper configures reporting for one well-known attribute with field
//! tuned defaults, overridable per call. The thresholds are what deployed
//! devices expect, change them only with care.

use crate::cluster::Cluster;
use crate::error::Result;
use crate::radio::{Endpoint, Entity};
use serde::{Deserialize, Serialize};

/// Reporting intervals in seconds.
pub mod rep_interval {
    pub const MAX: u16 = 62000;
    pub const HOUR: u16 = 3600;
    pub const MINUTES_30: u16 = 1800;
    pub const MINUTES_15: u16 = 900;
    pub const MINUTES_10: u16 = 600;
    pub const MINUTES_5: u16 = 300;
    pub const MINUTE: u16 = 60;
}

use rep_interval::{HOUR, MAX, MINUTE, MINUTES_5};

/// Minimum change that triggers a report.
///
/// `Pair` is the `[high, low]` form used by 48-bit metering sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportableChange {
    Value(u32),
    Pair([u32; 2]),
}

/// One entry of a configure-reporting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingPayload {
    pub attribute: String,
    pub minimum_report_interval: u16,
    pub maximum_report_interval: u16,
    pub reportable_change: Option<ReportableChange>,
}

/// Per-call overrides of a preset's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub min: Option<u16>,
    pub max: Option<u16>,
    /// `Some(None)` sends the request without a reportable change.
    pub change: Option<Option<ReportableChange>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: u16) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: u16) -> Self {
        self.max = Some(max);
        self
    }

    pub fn change(mut self, change: u32) -> Self {
        self.change = Some(Some(ReportableChange::Value(change)));
        self
    }

    pub fn change_pair(mut self, high: u32, low: u32) -> Self {
        self.change = Some(Some(ReportableChange::Pair([high, low])));
        self
    }

    pub fn no_change(mut self) -> Self {
        self.change = Some(None);
        self
    }
}

/// Build the single-entry payload list for a configure-reporting request.
pub fn payload(
    attribute: &str,
    min: u16,
    max: u16,
    change: Option<ReportableChange>,
    overrides: Option<Overrides>,
) -> Vec<ReportingPayload> {
    let mut payload = ReportingPayload {
        attribute: attribute.to_string(),
        minimum_report_interval: min,
        maximum_report_interval: max,
        reportable_change: change,
    };

    if let Some(overrides) = overrides {
        if let Some(min) = overrides.min {
            payload.minimum_report_interval = min;
        }
        if let Some(max) = overrides.max {
            payload.maximum_report_interval = max;
        }
        if let Some(change) = overrides.change {
            payload.reportable_change = change;
        }
    }

    vec![payload]
}

/// Default reporting configuration of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPreset {
    pub cluster: Cluster,
    pub attribute: &'static str,
    pub min: u16,
    pub max: u16,
    pub change: Option<ReportableChange>,
    /// Read the attribute right away so there is a baseline before the first report.
    pub read_after: bool,
}

impl ReportingPreset {
    pub async fn configure(&self, endpoint: &dyn Endpoint, overrides: Option<Overrides>) -> Result<()> {
        let items = payload(self.attribute, self.min, self.max, self.change, overrides);
        endpoint.configure_reporting(self.cluster, &items).await?;
        if self.read_after {
            endpoint.read(self.cluster, &[self.attribute]).await?;
        }
        Ok(())
    }
}

const fn value(change: u32) -> Option<ReportableChange> {
    Some(ReportableChange::Value(change))
}

const fn pair(high: u32, low: u32) -> Option<ReportableChange> {
    Some(ReportableChange::Pair([high, low]))
}

macro_rules! reporting_presets {
    ($($name:ident: $cluster:ident, $attribute:literal, $min:expr, $max:expr, $change:expr, $read:expr;)*) => {
        $(
            pub async fn $name(endpoint: &dyn Endpoint, overrides: Option<Overrides>) -> Result<()> {
                ReportingPreset {
                    cluster: Cluster::$cluster,
                    attribute: $attribute,
                    min: $min,
                    max: $max,
                    change: $change,
                    read_after: $read,
                }
                .configure(endpoint, overrides)
                .await
            }
        )*

        /// Every preset keyed by its helper name.
        pub const PRESETS: &[(&str, ReportingPreset)] = &[
            $(
                (
                    stringify!($name),
                    ReportingPreset {
                        cluster: Cluster::$cluster,
                        attribute: $attribute,
                        min: $min,
                        max: $max,
                        change: $change,
                        read_after: $read,
                    },
                ),
            )*
        ];
    };
}

reporting_presets! {
    current_position_lift_percentage: ClosuresWindowCovering, "currentPositionLiftPercentage", 1, MAX, value(1), false;
    current_position_tilt_percentage: ClosuresWindowCovering, "currentPositionTiltPercentage", 1, MAX, value(1), false;
    battery_percentage_remaining: GenPowerCfg, "batteryPercentageRemaining", HOUR, MAX, value(0), true;
    battery_voltage: GenPowerCfg, "batteryVoltage", HOUR, MAX, value(0), true;
    battery_alarm_state: GenPowerCfg, "batteryAlarmState", HOUR, MAX, value(0), false;
    on_off: GenOnOff, "onOff", 0, HOUR, value(0), false;
    lock_state: ClosuresDoorLock, "lockState", 0, HOUR, value(0), false;
    door_state: ClosuresDoorLock, "doorState", 0, HOUR, value(0), false;
    brightness: GenLevelCtrl, "currentLevel", 0, HOUR, value(1), false;
    color_temperature: LightingColorCtrl, "colorTemperature", 0, HOUR, value(1), false;
    occupancy: MsOccupancySensing, "occupancy", 0, HOUR, value(0), false;
    temperature: MsTemperatureMeasurement, "measuredValue", 10, HOUR, value(100), false;
    co2: MsCO2, "measuredValue", 10, HOUR, value(1), false;
    device_temperature: GenDeviceTempCfg, "currentTemperature", 300, HOUR, value(1), false;
    pressure: MsPressureMeasurement, "measuredValue", 10, HOUR, value(5), false;
    pressure_extended: MsPressureMeasurement, "scaledValue", 10, HOUR, value(5), false;
    illuminance: MsIlluminanceMeasurement, "measuredValue", 10, HOUR, value(5), false;
    instantaneous_demand: SeMetering, "instantaneousDemand", 5, HOUR, value(1), false;
    current_summ_delivered: SeMetering, "currentSummDelivered", 5, HOUR, pair(1, 1), false;
    current_summ_received: SeMetering, "currentSummReceived", 5, HOUR, pair(1, 1), false;
    thermostat_system_mode: HvacThermostat, "systemMode", 10, HOUR, None, false;
    humidity: MsRelativeHumidity, "measuredValue", 10, HOUR, value(100), false;
    thermostat_keypad_lock_mode: HvacUserInterfaceCfg, "keypadLockout", 10, HOUR, None, false;
    thermostat_temperature: HvacThermostat, "localTemp", 0, HOUR, value(10), false;
    thermostat_temperature_calibration: HvacThermostat, "localTemperatureCalibration", 0, HOUR, value(0), false;
    thermostat_occupied_heating_setpoint: HvacThermostat, "occupiedHeatingSetpoint", 0, HOUR, value(10), false;
    thermostat_unoccupied_heating_setpoint: HvacThermostat, "unoccupiedHeatingSetpoint", 0, HOUR, value(10), false;
    thermostat_occupied_cooling_setpoint: HvacThermostat, "occupiedCoolingSetpoint", 0, HOUR, value(10), false;
    thermostat_unoccupied_cooling_setpoint: HvacThermostat, "unoccupiedCoolingSetpoint", 0, HOUR, value(10), false;
    thermostat_pi_heating_demand: HvacThermostat, "pIHeatingDemand", 0, HOUR, value(10), false;
    thermostat_running_state: HvacThermostat, "runningState", 0, HOUR, value(0), false;
    thermostat_running_mode: HvacThermostat, "runningMode", 10, HOUR, None, false;
    // herdsman spells this attribute with a single 'c'
    thermostat_occupancy: HvacThermostat, "ocupancy", 0, HOUR, value(0), false;
    thermostat_temperature_setpoint_hold: HvacThermostat, "tempSetpointHold", 0, HOUR, value(0), false;
    thermostat_temperature_setpoint_hold_duration: HvacThermostat, "tempSetpointHoldDuration", 0, HOUR, value(10), false;
    thermostat_ac_louver_position: HvacThermostat, "acLouverPosition", 0, HOUR, None, false;
    present_value: GenBinaryInput, "presentValue", 10, MINUTE, value(1), false;
    active_power: HaElectricalMeasurement, "activePower", 5, HOUR, value(1), false;
    rms_current: HaElectricalMeasurement, "rmsCurrent", 5, HOUR, value(1), false;
    rms_voltage: HaElectricalMeasurement, "rmsVoltage", 5, HOUR, value(1), false;
    power_factor: HaElectricalMeasurement, "powerFactor", 0, MAX, value(1), false;
    fan_mode: HvacFanCtrl, "fanMode", 0, HOUR, value(0), false;
    soil_moisture: MsSoilMoisture, "measuredValue", 10, HOUR, value(100), false;
    ac_frequency: HaElectricalMeasurement, "acFrequency", 5, MINUTES_5, value(10), false;
}

/// Look up a preset by helper name.
pub fn preset(name: &str) -> Option<ReportingPreset> {
    PRESETS
        .iter()
        .find(|(preset_name, _)| *preset_name == name)
        .map(|(_, preset)| *preset)
}

/// Bind each cluster from `endpoint` to `target`, one after the other.
///
/// Some radio stacks serialize bind requests per endpoint; issuing them
/// concurrently collides transaction ids, so each bind completes before the
/// next one starts.
pub async fn bind(endpoint: &dyn Endpoint, target: &dyn Entity, clusters: &[Cluster]) -> Result<()> {
    for cluster in clusters {
        endpoint.bind(*cluster, target).await?;
    }
    Ok(())
}

/// Read the electrical measurement scaling attributes.
///
/// Split into chunks, some devices fail to respond when reading too many
/// attributes at once. Frequency scaling is only read when requested since not
/// every device supports it.
pub async fn read_electrical_measurement_multiplier_divisors(
    endpoint: &dyn Endpoint,
    read_frequency_attrs: bool,
) -> Result<()> {
    let cluster = Cluster::HaElectricalMeasurement;
    endpoint
        .read(
            cluster,
            &["acVoltageMultiplier", "acVoltageDivisor", "acCurrentMultiplier"],
        )
        .await?;
    endpoint
        .read(
            cluster,
            &["acCurrentDivisor", "acPowerMultiplier", "acPowerDivisor"],
        )
        .await?;
    if read_frequency_attrs {
        endpoint
            .read(cluster, &["acFrequencyDivisor", "acFrequencyMultiplier"])
            .await?;
    }
    Ok(())
}

pub async fn read_metering_multiplier_divisor(endpoint: &dyn Endpoint) -> Result<()> {
    endpoint
        .read(Cluster::SeMetering, &["multiplier", "divisor"])
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{EndpointInfo, RadioCall, RecordingEndpoint};
    use std::time::Duration;

    fn endpoint() -> RecordingEndpoint {
        RecordingEndpoint::new("0x00158d0001a2b3c4", EndpointInfo::new(1))
    }

    #[tokio::test]
    async fn test_battery_voltage_defaults() {
        let ep = endpoint();
        battery_voltage(&ep, None).await.unwrap();

        assert_eq!(
            ep.calls(),
            vec![
                RadioCall::ConfigureReporting {
                    cluster: Cluster::GenPowerCfg,
                    items: vec![ReportingPayload {
                        attribute: "batteryVoltage".into(),
                        minimum_report_interval: rep_interval::HOUR,
                        maximum_report_interval: rep_interval::MAX,
                        reportable_change: Some(ReportableChange::Value(0)),
                    }],
                },
                RadioCall::Read {
                    cluster: Cluster::GenPowerCfg,
                    attributes: vec!["batteryVoltage".into()],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_override_only_touches_given_field() {
        let ep = endpoint();
        battery_voltage(&ep, Some(Overrides::new().min(5))).await.unwrap();

        let RadioCall::ConfigureReporting { items, .. } = &ep.calls()[0] else {
            panic!("expected configure reporting first");
        };
        assert_eq!(items[0].minimum_report_interval, 5);
        assert_eq!(items[0].maximum_report_interval, rep_interval::MAX);
        assert_eq!(items[0].reportable_change, Some(ReportableChange::Value(0)));
    }

    #[test]
    fn test_change_can_be_cleared() {
        let cleared = payload(
            "batteryVoltage",
            0,
            rep_interval::MAX,
            Some(ReportableChange::Value(0)),
            Some(Overrides::new().no_change()),
        );
        assert_eq!(cleared[0].reportable_change, None);

        let kept = payload(
            "batteryVoltage",
            0,
            rep_interval::MAX,
            Some(ReportableChange::Value(0)),
            Some(Overrides::new().max(60)),
        );
        assert_eq!(kept[0].reportable_change, Some(ReportableChange::Value(0)));
        assert_eq!(kept[0].maximum_report_interval, 60);
    }

    #[tokio::test]
    async fn test_temperature_defaults_without_read() {
        let ep = endpoint();
        temperature(&ep, None).await.unwrap();

        let calls = ep.calls();
        assert_eq!(calls.len(), 1);
        let RadioCall::ConfigureReporting { cluster, items } = &calls[0] else {
            panic!("expected configure reporting");
        };
        assert_eq!(*cluster, Cluster::MsTemperatureMeasurement);
        assert_eq!(items[0].attribute, "measuredValue");
        assert_eq!(items[0].minimum_report_interval, 10);
        assert_eq!(items[0].maximum_report_interval, 3600);
        assert_eq!(items[0].reportable_change, Some(ReportableChange::Value(100)));
    }

    #[test]
    fn test_payload_serializes_like_herdsman() {
        let items = payload("currentSummDelivered", 5, HOUR, pair(1, 1), None);
        let json = serde_json::to_value(&items).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "attribute": "currentSummDelivered",
                "minimumReportInterval": 5,
                "maximumReportInterval": 3600,
                "reportableChange": [1, 1]
            }])
        );

        let items = payload("systemMode", 10, HOUR, None, None);
        assert_eq!(serde_json::to_value(&items[0]).unwrap()["reportableChange"], serde_json::Value::Null);
    }

    #[test]
    fn test_preset_lookup() {
        let on_off = preset("on_off").unwrap();
        assert_eq!(on_off.cluster, Cluster::GenOnOff);
        assert_eq!(on_off.max, HOUR);
        assert!(preset("does_not_exist").is_none());
        assert!(PRESETS.len() >= 40);
    }

    #[tokio::test]
    async fn test_bind_is_sequential() {
        let ep = endpoint().with_latency(Duration::from_millis(20));
        let coordinator = RecordingEndpoint::coordinator();

        bind(
            &ep,
            &coordinator,
            &[Cluster::GenOnOff, Cluster::GenLevelCtrl, Cluster::LightingColorCtrl],
        )
        .await
        .unwrap();

        let bound: Vec<Cluster> = ep.calls().iter().map(|c| c.cluster()).collect();
        assert_eq!(
            bound,
            vec![Cluster::GenOnOff, Cluster::GenLevelCtrl, Cluster::LightingColorCtrl]
        );
        assert_eq!(ep.overlapping_calls(), 0);
    }

    #[tokio::test]
    async fn test_bind_stops_at_first_failure() {
        let ep = endpoint();
        ep.fail_cluster(Cluster::GenLevelCtrl);
        let coordinator = RecordingEndpoint::coordinator();

        let result = bind(
            &ep,
            &coordinator,
            &[Cluster::GenOnOff, Cluster::GenLevelCtrl, Cluster::LightingColorCtrl],
        )
        .await;
        assert!(result.is_err());
        assert_eq!(ep.calls().len(), 2);
    }
}
