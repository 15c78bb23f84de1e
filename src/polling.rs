//! `on_event` handler for devices that cannot report attributes.

use crate::cluster::Cluster;
use crate::context::Context;
use crate::definition::{Event, OnEventFn, on_event_fn};
use crate::error::Result;
use crate::radio::Device;
use futures_util::FutureExt;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};

/// Store key of the polling task handle.
pub const INTERVAL_KEY: &str = "interval";

/// Attributes read on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRead {
    /// Endpoint to read from, the device's first endpoint when `None`.
    pub endpoint: Option<u8>,
    pub cluster: Cluster,
    pub attributes: &'static [&'static str],
}

impl PollRead {
    pub const fn new(cluster: Cluster, attributes: &'static [&'static str]) -> Self {
        Self {
            endpoint: None,
            cluster,
            attributes,
        }
    }

    pub const fn on_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

async fn poll_once(device: &dyn Device, reads: &[PollRead]) {
    for read in reads {
        let endpoint = match read.endpoint {
            Some(id) => device.endpoint(id),
            None => device.endpoints().into_iter().next(),
        };
        let Some(endpoint) = endpoint else {
            debug!("Polling {}: no endpoint for {}", device.info().ieee_addr, read.cluster);
            continue;
        };
        if let Err(e) = endpoint.read(read.cluster, read.attributes).await {
            debug!("Polling {} {} failed: {}", device.info().ieee_addr, read.cluster, e);
        }
    }
}

async fn handle(
    reads: &'static [PollRead],
    event: &Event,
    device: &Arc<dyn Device>,
    context: &Context,
) -> Result<()> {
    let store = &context.store;
    if *event == Event::Stop {
        if let Some(task) = store.get_value::<AbortHandle>(device.as_ref(), INTERVAL_KEY)? {
            task.abort();
            info!("Stopped polling {}", device.info().ieee_addr);
        }
        store.clear_value(device.as_ref(), INTERVAL_KEY)?;
        return Ok(());
    }

    let period = context.config.polling.interval();
    let started = store.put_value_with(device.as_ref(), INTERVAL_KEY, || {
        spawn_poller(device.clone(), reads, period).abort_handle()
    })?;
    if started {
        info!("Polling {} every {}s", device.info().ieee_addr, period.as_secs());
    }
    Ok(())
}

fn spawn_poller(device: Arc<dyn Device>, reads: &'static [PollRead], period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            poll_once(device.as_ref(), reads).await;
        }
    })
}

/// Handler that polls `reads` at the configured interval until `Stop`.
///
/// The task is started by the first non-`Stop` event and its handle kept in
/// the store under the device, so later events do not start another one.
pub fn poll_on_event(reads: &'static [PollRead]) -> OnEventFn {
    on_event_fn(move |event, device, context| handle(reads, event, device, context).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::radio::{DeviceInfo, EndpointInfo, RadioCall, RecordingDevice, RecordingEndpoint};

    const READS: &[PollRead] = &[PollRead::new(Cluster::GenOnOff, &["onOff"])];

    fn device() -> (Arc<RecordingEndpoint>, Arc<dyn Device>) {
        let info = EndpointInfo::new(1).with_input_clusters(&[Cluster::GenOnOff]);
        let endpoint = Arc::new(RecordingEndpoint::new("0x01", info.clone()));
        let device: Arc<dyn Device> = Arc::new(RecordingDevice::with_endpoints(
            DeviceInfo::new("0x01").with_endpoint(info),
            vec![endpoint.clone()],
        ));
        (endpoint, device)
    }

    fn context() -> Context {
        let mut config = Config::default();
        config.polling.interval_secs = 1;
        Context::new(config)
    }

    #[tokio::test]
    async fn test_start_stores_one_task() {
        let (_, device) = device();
        let context = context();
        let on_event = poll_on_event(READS);

        on_event(&Event::Start, &device, &context).await.unwrap();
        let first = context
            .store
            .get_value::<AbortHandle>(device.as_ref(), INTERVAL_KEY)
            .unwrap()
            .unwrap();
        on_event(&Event::Stop, &device, &context).await.unwrap();
        assert!(!context.store.has_value(device.as_ref(), INTERVAL_KEY).unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_finished());
    }

    #[tokio::test]
    async fn test_polls_until_stopped() {
        let (endpoint, device) = device();
        let context = context();
        let on_event = poll_on_event(READS);

        on_event(&Event::Start, &device, &context).await.unwrap();
        on_event(&Event::DeviceAnnounce, &device, &context).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        on_event(&Event::Stop, &device, &context).await.unwrap();

        let calls = endpoint.take_calls();
        assert_eq!(
            calls,
            vec![RadioCall::Read {
                cluster: Cluster::GenOnOff,
                attributes: vec!["onOff".to_string()],
            }]
        );
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_failures_are_swallowed() {
        let (endpoint, device) = device();
        endpoint.fail_cluster(Cluster::GenOnOff);

        poll_once(device.as_ref(), READS).await;
        poll_once(device.as_ref(), READS).await;
        // Missing endpoints are skipped
        poll_once(device.as_ref(), &[PollRead::new(Cluster::GenOnOff, &["onOff"]).on_endpoint(9)]).await;
        assert_eq!(endpoint.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (_, device) = device();
        let context = context();
        poll_on_event(READS)(&Event::Stop, &device, &context).await.unwrap();
        assert!(context.store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_share_one_task() {
        let (endpoint, device) = device();
        let context = context();
        let on_event = poll_on_event(READS);

        let starts: Vec<_> = (0..8)
            .map(|_| {
                let on_event = on_event.clone();
                let device = device.clone();
                let context = context.clone();
                tokio::spawn(async move { on_event(&Event::Start, &device, &context).await })
            })
            .collect();
        for start in starts {
            start.await.unwrap().unwrap();
        }
        on_event(&Event::Stop, &device, &context).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(endpoint.calls().is_empty());
    }
}
