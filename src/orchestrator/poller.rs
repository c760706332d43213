//! Per-order status polling.
//!
//! Each order awaiting an SMS gets one task that checks its status on a fixed
//! cadence until the order completes or the poll window closes. The coordinator
//! owns the id -> handle table; at most one handle exists per id.

use crate::api::OrderBackend;
use crate::model::StatusReport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Why a poll task stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEnd {
    Completed,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Observed {
        order_id: String,
        report: StatusReport,
    },
    Ended {
        order_id: String,
        reason: PollEnd,
    },
}

struct PollHandle {
    generation: u64,
    task: JoinHandle<()>,
}

type HandleTable = Arc<Mutex<HashMap<String, PollHandle>>>;

fn lock(table: &HandleTable) -> MutexGuard<'_, HashMap<String, PollHandle>> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drop the table entry for `order_id` if it still belongs to `generation`.
///
/// Every exit path goes through here. A superseded task carries an old
/// generation and therefore never removes its replacement.
fn release(table: &HandleTable, order_id: &str, generation: u64) -> bool {
    let mut handles = lock(table);
    match handles.get(order_id) {
        Some(h) if h.generation == generation => {
            handles.remove(order_id);
            true
        }
        _ => false,
    }
}

pub struct PollingCoordinator {
    backend: Arc<dyn OrderBackend>,
    policy: PollPolicy,
    handles: HandleTable,
    next_generation: u64,
    events: UnboundedSender<PollEvent>,
}

impl PollingCoordinator {
    pub fn new(
        backend: Arc<dyn OrderBackend>,
        policy: PollPolicy,
        events: UnboundedSender<PollEvent>,
    ) -> Self {
        Self {
            backend,
            policy,
            handles: Arc::new(Mutex::new(HashMap::new())),
            next_generation: 0,
            events,
        }
    }

    /// Start polling `order_id`, replacing any poll already running for it.
    pub fn start(&mut self, order_id: &str) {
        if self.stop(order_id) {
            debug!(order_id, "restarting status poll");
        }
        self.next_generation += 1;
        let generation = self.next_generation;

        let mut handles = lock(&self.handles);
        let task = tokio::spawn(poll_order(PollTask {
            backend: self.backend.clone(),
            handles: self.handles.clone(),
            events: self.events.clone(),
            order_id: order_id.to_string(),
            generation,
            policy: self.policy,
        }));
        handles.insert(order_id.to_string(), PollHandle { generation, task });
        info!(order_id, "status poll started");
    }

    /// Cancel the poll for `order_id`. Returns whether one was running.
    pub fn stop(&mut self, order_id: &str) -> bool {
        let removed = lock(&self.handles).remove(order_id);
        match removed {
            Some(handle) => {
                handle.task.abort();
                debug!(order_id, "status poll stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, handle) in lock(&self.handles).drain() {
            handle.task.abort();
        }
    }

    /// Generation of the live poll for `order_id`, if any. A restart always
    /// yields a new value.
    pub fn generation(&self, order_id: &str) -> Option<u64> {
        lock(&self.handles).get(order_id).map(|h| h.generation)
    }

    #[cfg(test)]
    pub fn is_active(&self, order_id: &str) -> bool {
        lock(&self.handles).contains_key(order_id)
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        lock(&self.handles).len()
    }

    /// Ids with a live poll, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.handles).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct PollTask {
    backend: Arc<dyn OrderBackend>,
    handles: HandleTable,
    events: UnboundedSender<PollEvent>,
    order_id: String,
    generation: u64,
    policy: PollPolicy,
}

async fn poll_order(task: PollTask) {
    let PollTask {
        backend,
        handles,
        events,
        order_id,
        generation,
        policy,
    } = task;

    let started = Instant::now();
    let deadline = started + policy.timeout;
    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);
    let mut ticker = tokio::time::interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            // Expiry wins ties with the last tick.
            biased;
            _ = &mut expiry => break PollEnd::Expired,
            _ = ticker.tick() => {
                // A check still in flight at the deadline is abandoned.
                let Ok(checked) =
                    tokio::time::timeout_at(deadline, backend.status(&order_id)).await
                else {
                    break PollEnd::Expired;
                };
                match checked {
                    Ok(report) => {
                        let completed = report.status.is_completed();
                        let _ = events.send(PollEvent::Observed {
                            order_id: order_id.clone(),
                            report,
                        });
                        if completed {
                            break PollEnd::Completed;
                        }
                    }
                    Err(e) => warn!(order_id = %order_id, error = %e, "status poll failed"),
                }
            }
        }
    };

    if release(&handles, &order_id, generation) {
        match reason {
            PollEnd::Completed => info!(order_id = %order_id, "order completed, status poll finished"),
            PollEnd::Expired => info!(
                order_id = %order_id,
                after = ?policy.timeout,
                "status poll stopped without completion"
            ),
        }
        let _ = events.send(PollEvent::Ended { order_id, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeBackend;
    use crate::error::ApiError;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn coordinator(
        backend: Arc<FakeBackend>,
    ) -> (PollingCoordinator, UnboundedReceiver<PollEvent>) {
        let (tx, rx) = unbounded_channel();
        (
            PollingCoordinator::new(backend, PollPolicy::default(), tx),
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<PollEvent>) -> Vec<PollEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn restart_leaves_a_single_handle() {
        let backend = Arc::new(FakeBackend::default());
        let (mut poller, _rx) = coordinator(backend.clone());

        poller.start("1");
        poller.start("1");
        poller.start("1");
        assert_eq!(poller.active_count(), 1);
        assert!(poller.is_active("1"));

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        // Only the surviving task ticks.
        assert_eq!(backend.status_calls("1"), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.status_calls("1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_removes_handle_and_stops_checks() {
        let backend = Arc::new(FakeBackend::default());
        backend.script_status(
            "7",
            vec![
                Ok(StatusReport::new("WAITING", None)),
                Ok(StatusReport::new("COMPLETED", Some("555111"))),
            ],
        );
        let (mut poller, mut rx) = coordinator(backend.clone());
        poller.start("7");

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert_eq!(backend.status_calls("7"), 2);
        assert!(!poller.is_active("7"));

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&PollEvent::Ended {
                order_id: "7".into(),
                reason: PollEnd::Completed
            })
        );
        assert!(events.contains(&PollEvent::Observed {
            order_id: "7".into(),
            report: StatusReport::new("COMPLETED", Some("555111")),
        }));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls("7"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_order_expires_after_timeout() {
        let backend = Arc::new(FakeBackend::default());
        let (mut poller, mut rx) = coordinator(backend.clone());
        poller.start("3");

        tokio::time::sleep(Duration::from_millis(299_999)).await;
        assert!(poller.is_active("3"));
        assert_eq!(backend.status_calls("3"), 59);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!poller.is_active("3"));
        assert_eq!(backend.status_calls("3"), 59);
        assert_eq!(
            drain(&mut rx).last(),
            Some(&PollEvent::Ended {
                order_id: "3".into(),
                reason: PollEnd::Expired
            })
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.status_calls("3"), 59);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_abandons_a_check_still_in_flight() {
        let backend = Arc::new(FakeBackend::default());
        // The 59th check starts at 295s and would answer at 307s.
        backend.stall_status(59, Duration::from_secs(12));
        let (mut poller, mut rx) = coordinator(backend.clone());
        poller.start("3");

        tokio::time::sleep(Duration::from_millis(300_001)).await;
        assert!(!poller.is_active("3"));
        assert_eq!(backend.status_calls("3"), 59);
        let events = drain(&mut rx);
        let observed = events
            .iter()
            .filter(|ev| matches!(ev, PollEvent::Observed { .. }))
            .count();
        assert_eq!(observed, 58);
        assert_eq!(
            events.last(),
            Some(&PollEvent::Ended {
                order_id: "3".into(),
                reason: PollEnd::Expired
            })
        );

        // Nothing from the abandoned check arrives later.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(backend.status_calls("3"), 59);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_changes_generation() {
        let backend = Arc::new(FakeBackend::default());
        let (mut poller, _rx) = coordinator(backend);
        assert_eq!(poller.generation("1"), None);
        poller.start("1");
        let first = poller.generation("1");
        poller.start("1");
        assert!(first.is_some());
        assert_ne!(poller.generation("1"), first);
        poller.stop("1");
        assert_eq!(poller.generation("1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_retried_on_the_next_tick() {
        let backend = Arc::new(FakeBackend::default());
        backend.script_status(
            "4",
            vec![
                Err(ApiError::Transport("reset".into())),
                Ok(StatusReport::new("COMPLETED", Some("1"))),
            ],
        );
        let (mut poller, _rx) = coordinator(backend.clone());
        poller.start("4");

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(poller.is_active("4"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!poller.is_active("4"));
        assert_eq!(backend.status_calls("4"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_checks() {
        let backend = Arc::new(FakeBackend::default());
        let (mut poller, mut rx) = coordinator(backend.clone());
        poller.start("1");
        poller.start("2");

        assert!(poller.stop("1"));
        assert!(!poller.stop("1"));
        assert!(!poller.is_active("1"));
        assert_eq!(poller.active_ids(), vec!["2".to_string()]);

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(backend.status_calls("1"), 0);
        assert_eq!(backend.status_calls("2"), 6);
        assert!(drain(&mut rx)
            .iter()
            .all(|ev| !matches!(ev, PollEvent::Observed { order_id, .. } if order_id == "1")));

        poller.stop_all();
        assert_eq!(poller.active_count(), 0);
    }

    #[test]
    fn stale_generation_cannot_release_replacement() {
        let table: HandleTable = Arc::new(Mutex::new(HashMap::new()));
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let task = rt.spawn(async {});
        lock(&table).insert("1".into(), PollHandle { generation: 2, task });
        assert!(!release(&table, "1", 1));
        assert!(release(&table, "1", 2));
        assert!(lock(&table).is_empty());
    }
}
