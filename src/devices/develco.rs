//! Develco (frient) metering devices.

use crate::cluster::Cluster;
use crate::context::Context;
use crate::converters::{from_zigbee as fz, to_zigbee as tz};
use crate::definition::{Definition, Event, configure_fn, on_event_fn};
use crate::error::{DefinitionError, Result};
use crate::exposes::presets;
use crate::radio::{AttributeValues, Device, Endpoint, Entity};
use crate::reporting::{self, Overrides, rep_interval};
use futures_util::FutureExt;
use log::debug;
use serde_json::json;
use std::sync::Arc;

const VENDOR: &str = "Develco";

/// Metering and electrical measurement live on endpoint 2.
const METERING_ENDPOINT: u8 = 2;

fn metering_endpoint(device: &dyn Device) -> Result<Arc<dyn Endpoint>> {
    device
        .endpoint(METERING_ENDPOINT)
        .ok_or(DefinitionError::EndpointNotFound(METERING_ENDPOINT))
}

async fn configure_power_plug(device: &dyn Device, coordinator: &dyn Entity) -> Result<()> {
    let endpoint = metering_endpoint(device)?;
    let endpoint = endpoint.as_ref();
    reporting::bind(
        endpoint,
        coordinator,
        &[Cluster::GenOnOff, Cluster::HaElectricalMeasurement, Cluster::SeMetering],
    )
    .await?;
    reporting::on_off(endpoint, None).await?;
    reporting::read_electrical_measurement_multiplier_divisors(endpoint, false).await?;
    reporting::active_power(endpoint, None).await?;
    reporting::rms_current(endpoint, None).await?;
    reporting::rms_voltage(endpoint, None).await?;
    reporting::read_metering_multiplier_divisor(endpoint).await?;
    reporting::current_summ_delivered(endpoint, None).await?;
    Ok(())
}

async fn configure_smart_cable(device: &dyn Device, coordinator: &dyn Entity) -> Result<()> {
    let endpoint = metering_endpoint(device)?;
    let endpoint = endpoint.as_ref();
    reporting::bind(
        endpoint,
        coordinator,
        &[
            Cluster::GenOnOff,
            Cluster::HaElectricalMeasurement,
            Cluster::SeMetering,
            Cluster::GenDeviceTempCfg,
        ],
    )
    .await?;
    reporting::on_off(endpoint, None).await?;
    reporting::device_temperature(endpoint, Some(Overrides::new().change(2))).await?;
    reporting::read_electrical_measurement_multiplier_divisors(endpoint, false).await?;
    // 10 W, 20 mA, 4 V at most every 5 minutes
    reporting::active_power(endpoint, Some(Overrides::new().change(10))).await?;
    reporting::rms_current(endpoint, Some(Overrides::new().change(20))).await?;
    reporting::rms_voltage(
        endpoint,
        Some(Overrides::new().min(rep_interval::MINUTES_5).change(400)),
    )
    .await?;
    reporting::read_metering_multiplier_divisor(endpoint).await?;
    // 0.02 kWh
    reporting::current_summ_delivered(endpoint, Some(Overrides::new().change_pair(0, 20))).await?;
    reporting::instantaneous_demand(
        endpoint,
        Some(Overrides::new().min(rep_interval::MINUTES_5).change(10)),
    )
    .await?;
    Ok(())
}

/// The meter reports a divisor of 512, the real one is fixed at 1000.
fn fixed_metering_factor(endpoint: &dyn Endpoint) {
    let mut values = AttributeValues::new();
    values.insert("divisor".to_string(), json!(1000));
    values.insert("multiplier".to_string(), json!(1));
    endpoint.save_cluster_attributes(Cluster::SeMetering, values);
}

async fn electrical_measurement(endpoint: &dyn Endpoint) -> Result<()> {
    reporting::read_electrical_measurement_multiplier_divisors(endpoint, false).await?;
    reporting::rms_voltage(endpoint, None).await?;
    reporting::rms_current(endpoint, None).await?;
    reporting::active_power(endpoint, None).await?;
    Ok(())
}

async fn configure_han_meter(device: &dyn Device, coordinator: &dyn Entity) -> Result<()> {
    let endpoint = metering_endpoint(device)?;
    let endpoint = endpoint.as_ref();
    reporting::bind(
        endpoint,
        coordinator,
        &[Cluster::HaElectricalMeasurement, Cluster::SeMetering],
    )
    .await?;

    // Not every meter firmware has the electrical measurement cluster
    if let Err(e) = electrical_measurement(endpoint).await {
        debug!("Electrical measurement reporting of {} failed: {}", device.info().ieee_addr, e);
    }

    reporting::read_metering_multiplier_divisor(endpoint).await?;
    fixed_metering_factor(endpoint);
    reporting::instantaneous_demand(endpoint, None).await?;
    reporting::current_summ_delivered(endpoint, None).await?;
    reporting::current_summ_received(endpoint, None).await?;
    Ok(())
}

async fn han_meter_event(event: &Event, device: &Arc<dyn Device>, _: &Context) -> Result<()> {
    if let Event::Message(message) = event
        && message.cluster == Cluster::SeMetering
        && message.data.contains_key("divisor")
        && let Some(endpoint) = device.endpoint(message.endpoint_id)
    {
        fixed_metering_factor(endpoint.as_ref());
    }
    Ok(())
}

pub fn definitions() -> Vec<Definition> {
    vec![
        Definition::new("SPLZB-131", VENDOR, "Power plug")
            .with_zigbee_model(&["SPLZB-131"])
            .with_from_zigbee(&[&fz::ON_OFF, &fz::ELECTRICAL_MEASUREMENT, &fz::METERING])
            .with_to_zigbee(&[&tz::ON_OFF])
            .with_exposes(vec![
                presets::switch(),
                presets::power(),
                presets::current(),
                presets::voltage(),
                presets::energy(),
            ])
            .with_configure(configure_fn(|device, coordinator, _| {
                configure_power_plug(device, coordinator).boxed()
            })),
        Definition::new("SMRZB-143", VENDOR, "Smart cable")
            .with_zigbee_model(&["SMRZB-143"])
            .with_from_zigbee(&[
                &fz::ON_OFF,
                &fz::ELECTRICAL_MEASUREMENT,
                &fz::METERING,
                &fz::DEVICE_TEMPERATURE,
            ])
            .with_to_zigbee(&[&tz::ON_OFF])
            .with_exposes(vec![
                presets::switch(),
                presets::power(),
                presets::current(),
                presets::voltage(),
                presets::energy(),
                presets::device_temperature(),
            ])
            .with_configure(configure_fn(|device, coordinator, _| {
                configure_smart_cable(device, coordinator).boxed()
            })),
        Definition::new("EMIZB-132", VENDOR, "Wattle AMS HAN power-meter sensor")
            .with_zigbee_model(&["EMIZB-132"])
            .with_from_zigbee(&[&fz::METERING, &fz::ELECTRICAL_MEASUREMENT])
            .with_exposes(vec![
                presets::power(),
                presets::energy(),
                presets::current(),
                presets::voltage(),
            ])
            .with_configure(configure_fn(|device, coordinator, _| {
                configure_han_meter(device, coordinator).boxed()
            }))
            .with_on_event(on_event_fn(|event, device, context| {
                han_meter_event(event, device, context).boxed()
            })),
    ]
}
