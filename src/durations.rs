// Service duration cache
// getEventList changes rarely, so the whole id -> minutes map is kept for a TTL and
// rebuilt in one piece when it goes stale.

use crate::error::GatewayError;
use crate::gateway::RpcGateway;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

struct DurationSnapshot {
    minutes: Arc<HashMap<String, f64>>,
    fetched_at: Instant,
}

pub struct ServiceDurationCache {
    gateway: Arc<RpcGateway>,
    ttl: Duration,
    snapshot: RwLock<Option<DurationSnapshot>>,
    refreshes: AtomicUsize,
}

impl ServiceDurationCache {
    pub fn new(gateway: Arc<RpcGateway>, ttl: Duration) -> Self {
        Self {
            gateway,
            ttl,
            snapshot: RwLock::new(None),
            refreshes: AtomicUsize::new(0),
        }
    }

    // Duration of `service_id` in minutes. None when the platform does not list the
    // service or lists it without a numeric duration.
    pub async fn duration_for(&self, service_id: u64) -> Result<Option<f64>, GatewayError> {
        let minutes = match self.fresh() {
            Some(minutes) => minutes,
            None => self.refresh().await?,
        };
        Ok(minutes.get(&service_id.to_string()).copied())
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }

    fn fresh(&self) -> Option<Arc<HashMap<String, f64>>> {
        self.snapshot
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.fetched_at.elapsed() < self.ttl)
            .map(|snapshot| Arc::clone(&snapshot.minutes))
    }

    // Two callers finding the cache stale at once may both fetch; the later write wins.
    async fn refresh(&self) -> Result<Arc<HashMap<String, f64>>, GatewayError> {
        let events = self.gateway.call("getEventList", vec![]).await?;
        let minutes = Arc::new(parse_durations(&events)?);

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!(services = minutes.len(), "Refreshed service durations");

        *self.snapshot.write() = Some(DurationSnapshot {
            minutes: Arc::clone(&minutes),
            fetched_at: Instant::now(),
        });
        Ok(minutes)
    }
}

// getEventList is keyed by service id. Entries without a finite duration are dropped.
pub(crate) fn parse_durations(events: &Value) -> Result<HashMap<String, f64>, GatewayError> {
    let entries: Vec<(&String, &Value)> = match events {
        Value::Object(map) => map.iter().collect(),
        Value::Null => Vec::new(),
        Value::Array(items) if items.is_empty() => Vec::new(),
        other => {
            return Err(GatewayError::MalformedUpstreamData(format!(
                "unexpected getEventList result: {}",
                other
            )))
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|(id, event)| {
            let minutes = match event.get("duration")? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            minutes.is_finite().then(|| (id.clone(), minutes))
        })
        .collect())
}
