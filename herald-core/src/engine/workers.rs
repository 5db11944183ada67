//! Worker tasks spawned by [`AlertEngine::start`](super::AlertEngine::start)

use super::alert_engine::{EngineShared, SharedReceiver};
use crate::channels::Channel;
use crate::core::{Alert, AlertError, AlertEvent, DeliveryError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pull the next item unless cancelled first. Workers share one receiver.
async fn next<T>(rx: &SharedReceiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = async { rx.lock().await.recv().await } => item,
    }
}

pub(crate) async fn event_worker(
    id: usize,
    shared: Arc<EngineShared>,
    rx: SharedReceiver<AlertEvent>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Event worker started");
    while let Some(event) = next(&rx, &cancel).await {
        shared.handle_event(&event);
    }
    debug!(worker = id, "Event worker stopped");
}

pub(crate) async fn alert_worker(
    id: usize,
    shared: Arc<EngineShared>,
    rx: SharedReceiver<Alert>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Alert worker started");
    while let Some(alert) = next(&rx, &cancel).await {
        deliver(&shared, alert).await;
    }
    debug!(worker = id, "Alert worker stopped");
}

/// Fan one alert out to its channels concurrently, each bounded by the send timeout
pub(crate) async fn deliver(shared: &EngineShared, alert: Alert) {
    let alert = Arc::new(alert);
    let send_timeout = shared.config.send_timeout;
    let mut sends = JoinSet::new();

    for name in &alert.channels {
        let Some(channel) = shared.channels.get(name) else {
            warn!(alert_id = %alert.id, channel = %name, "Alert references unknown channel");
            continue;
        };
        let alert = Arc::clone(&alert);
        let name = name.clone();
        sends.spawn(async move {
            let outcome = send_one(channel.as_ref(), &name, &alert, send_timeout).await;
            (name, outcome)
        });
    }

    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok((name, Ok(()))) => {
                shared.metrics.delivery_succeeded(&name);
                debug!(alert_id = %alert.id, channel = %name, "Alert delivered");
            }
            Ok((name, Err(AlertError::Delivery { source, .. }))) => {
                shared.metrics.delivery_failed(&name);
                error!(alert_id = %alert.id, channel = %name, kind = source.kind(), error = %source, "Alert delivery failed");
            }
            Ok((name, Err(e))) => {
                shared.metrics.delivery_failed(&name);
                error!(alert_id = %alert.id, channel = %name, error = %e, "Alert delivery failed");
            }
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Delivery task panicked");
            }
        }
    }

    shared.metrics.alert_processed();
}

/// One channel send bounded by `send_timeout`
pub(crate) async fn send_one(
    channel: &dyn Channel,
    name: &str,
    alert: &Alert,
    send_timeout: Duration,
) -> crate::core::Result<()> {
    let outcome = match timeout(send_timeout, channel.send(alert)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(send_timeout)),
    };
    outcome.map_err(|source| AlertError::Delivery {
        channel: name.to_string(),
        source,
    })
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub(crate) async fn cleanup_loop(shared: Arc<EngineShared>, cancel: CancellationToken) {
    let mut ticker = ticker(shared.config.cleanup_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                shared.cleanup_alerts(Utc::now());
            }
        }
    }
}

pub(crate) async fn metrics_loop(shared: Arc<EngineShared>, cancel: CancellationToken) {
    let mut ticker = ticker(shared.config.metrics_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                shared.refresh_gauges();
                let m = shared.metrics.snapshot();
                info!(
                    rules = m.total_rules,
                    active_rules = m.active_rules,
                    alerts = m.total_alerts,
                    processed = m.processed_alerts,
                    failed = m.failed_alerts,
                    dropped_events = m.dropped_events,
                    event_queue = m.event_queue_depth,
                    alert_queue = m.alert_queue_depth,
                    avg_processing_us = m.avg_processing_time().as_micros() as u64,
                    "Alert engine metrics"
                );
            }
        }
    }
}
