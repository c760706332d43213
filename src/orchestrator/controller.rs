//! Dashboard controller.
//!
//! Owns the order registry and the polling coordinator, turns UI commands into
//! backend requests and publishes view snapshots for presentation layers.
//! Requests run as spawned tasks and report back through an outcome channel, so
//! the loop never waits on the network and overlapping refreshes simply apply in
//! the order they resolve.

use super::poller::{PollEnd, PollEvent, PollPolicy, PollingCoordinator};
use crate::api::OrderBackend;
use crate::error::ApiError;
use crate::model::{
    Balance, Catalog, CreateOrder, DashboardConfig, DashboardEvent, DashboardView, Notice, Order,
    StatusReport,
};
use crate::registry::OrderRegistry;
use crate::render::{self, RowAction};
use anyhow::Result;
use futures::{stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Status checks a sync keeps in flight at once.
const SYNC_CONCURRENCY: usize = 4;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Create { service: String, country: String },
    Quote { service: String, country: String },
    Refresh,
    Order { action: RowAction, order_id: String },
    LoadHistory,
    Quit,
}

/// Completed backend request, delivered back to the controller loop.
#[derive(Debug)]
pub(crate) enum Outcome {
    Catalog(Catalog),
    Created(Result<Order, ApiError>),
    Listed(Result<Vec<Order>, ApiError>),
    Balance(Result<String, ApiError>),
    Checked {
        order_id: String,
        /// Poll generation live for the order when the check was sent.
        since: Option<u64>,
        result: Result<StatusReport, ApiError>,
    },
    Acted {
        action: RowAction,
        order_id: String,
        result: Result<(), ApiError>,
    },
    History(Result<Vec<Order>, ApiError>),
    Priced {
        service: String,
        country: String,
        result: Result<Vec<f64>, ApiError>,
    },
}

pub(crate) struct Controller {
    cfg: DashboardConfig,
    backend: Arc<dyn OrderBackend>,
    registry: OrderRegistry,
    poller: PollingCoordinator,
    balance: Balance,
    create_in_flight: bool,
    event_tx: UnboundedSender<DashboardEvent>,
    outcome_tx: UnboundedSender<Outcome>,
}

impl Controller {
    pub(crate) fn new(
        cfg: DashboardConfig,
        backend: Arc<dyn OrderBackend>,
        event_tx: UnboundedSender<DashboardEvent>,
    ) -> (Self, UnboundedReceiver<Outcome>, UnboundedReceiver<PollEvent>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let policy = PollPolicy {
            interval: cfg.poll_interval,
            timeout: cfg.poll_timeout,
        };
        let poller = PollingCoordinator::new(backend.clone(), policy, poll_tx);
        let ctl = Self {
            cfg,
            backend,
            registry: OrderRegistry::default(),
            poller,
            balance: Balance::Unknown,
            create_in_flight: false,
            event_tx,
            outcome_tx,
        };
        (ctl, outcome_rx, poll_rx)
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
    }

    /// Notice for a failed user action. An unreachable server is worded apart
    /// from an answer the server gave.
    fn failure(e: &ApiError) -> Notice {
        if e.is_transport() {
            Notice::failure(format!("Could not reach server ({e})"))
        } else {
            Notice::failure(format!("Error: {e}"))
        }
    }

    /// Initial load: catalog, balance and the order list.
    pub(crate) fn bootstrap(&self) {
        let backend = self.backend.clone();
        self.spawn(async move {
            let services = backend.services().await.unwrap_or_else(|e| {
                warn!(error = %e, "service catalog unavailable, using built-in list");
                Catalog::fallback_services()
            });
            let countries = backend.countries().await.unwrap_or_else(|e| {
                warn!(error = %e, "country catalog unavailable, using built-in list");
                Catalog::fallback_countries()
            });
            Outcome::Catalog(Catalog {
                services,
                countries,
            })
        });
        self.refresh_balance();
        self.refresh_orders();
        self.publish();
    }

    fn refresh_orders(&self) {
        let backend = self.backend.clone();
        self.spawn(async move { Outcome::Listed(backend.list().await) });
    }

    fn refresh_balance(&self) {
        let backend = self.backend.clone();
        self.spawn(async move { Outcome::Balance(backend.balance().await) });
    }

    /// Re-check balance and the status of every row currently on screen,
    /// regardless of whether the row has its own poll.
    pub(crate) fn sync_statuses(&self) {
        self.refresh_balance();
        let targets: Vec<(String, Option<u64>)> = self
            .registry
            .ids()
            .into_iter()
            .map(|id| {
                let since = self.poller.generation(&id);
                (id, since)
            })
            .collect();
        if targets.is_empty() {
            return;
        }
        debug!(rows = targets.len(), "syncing order statuses");
        let backend = self.backend.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let mut checks = stream::iter(targets)
                .map(|(order_id, since)| {
                    let backend = backend.clone();
                    async move {
                        let result = backend.status(&order_id).await;
                        Outcome::Checked {
                            order_id,
                            since,
                            result,
                        }
                    }
                })
                .buffer_unordered(SYNC_CONCURRENCY);
            while let Some(outcome) = checks.next().await {
                if tx.send(outcome).is_err() {
                    break;
                }
            }
        });
    }

    /// Handle a UI command. Returns `false` once the controller should stop.
    pub(crate) fn handle_command(&mut self, cmd: UiCommand) -> bool {
        match cmd {
            UiCommand::Create { service, country } => {
                if self.create_in_flight {
                    self.info("Order creation already in progress");
                    return true;
                }
                self.create_in_flight = true;
                self.publish();
                let backend = self.backend.clone();
                let req = CreateOrder {
                    service,
                    country,
                    max_price: self.cfg.max_price,
                };
                self.spawn(async move { Outcome::Created(backend.create(&req).await) });
            }
            UiCommand::Quote { service, country } => {
                let backend = self.backend.clone();
                self.spawn(async move {
                    let result = backend.prices(&service, &country).await;
                    Outcome::Priced {
                        service,
                        country,
                        result,
                    }
                });
            }
            UiCommand::Refresh => {
                self.sync_statuses();
                self.refresh_orders();
            }
            UiCommand::Order { action, order_id } => {
                let backend = self.backend.clone();
                self.spawn(async move {
                    let result = match action {
                        RowAction::RequestAgain => backend.request_again(&order_id).await,
                        RowAction::Cancel => backend.cancel(&order_id).await,
                        RowAction::Remove => backend.remove(&order_id).await,
                        RowAction::Finish => backend.finish(&order_id).await,
                    };
                    Outcome::Acted {
                        action,
                        order_id,
                        result,
                    }
                });
            }
            UiCommand::LoadHistory => {
                let backend = self.backend.clone();
                self.spawn(async move { Outcome::History(backend.history().await) });
            }
            UiCommand::Quit => return false,
        }
        true
    }

    pub(crate) fn apply_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Catalog(catalog) => {
                let _ = self.event_tx.send(DashboardEvent::Catalog(catalog));
            }
            Outcome::Created(result) => {
                self.create_in_flight = false;
                match result {
                    Ok(order) => {
                        info!(order_id = %order.id, number = %order.number, "order created");
                        self.notice(Notice::success(format!("Order {} created", order.id)));
                        if !order.status.is_completed() {
                            self.poller.start(&order.id);
                        }
                        self.refresh_orders();
                    }
                    Err(e) => {
                        warn!(error = %e, "create order failed");
                        self.notice(Self::failure(&e));
                    }
                }
                self.publish();
            }
            Outcome::Listed(result) => match result {
                Ok(orders) => {
                    self.registry.replace_all(orders);
                    self.publish();
                }
                Err(e) => {
                    warn!(error = %e, "loading orders failed");
                    self.info(format!("Error loading orders: {e}"));
                }
            },
            Outcome::Balance(result) => {
                self.balance = match result {
                    Ok(amount) => Balance::Amount(amount),
                    Err(e) => {
                        warn!(error = %e, "loading balance failed");
                        Balance::Unavailable
                    }
                };
                self.publish();
            }
            Outcome::Checked {
                order_id,
                since,
                result,
            } => match result {
                Ok(report) => {
                    let current = self.poller.generation(&order_id);
                    if current.is_some() && current != since {
                        // Poll (re)started after this check went out; its answer is stale.
                        debug!(order_id = %order_id, "dropping status from before poll restart");
                        return;
                    }
                    if report.status.is_completed() && self.poller.stop(&order_id) {
                        debug!(order_id = %order_id, "completed during sync, poll stopped");
                    }
                    if self.registry.apply_status(&order_id, &report) {
                        self.publish();
                    }
                }
                Err(e) => warn!(order_id = %order_id, error = %e, "status sync failed"),
            },
            Outcome::Acted {
                action,
                order_id,
                result,
            } => self.finish_action(action, &order_id, result),
            Outcome::History(result) => match result {
                Ok(orders) => {
                    let _ = self.event_tx.send(DashboardEvent::History(orders));
                }
                Err(e) => {
                    warn!(error = %e, "loading history failed");
                    self.notice(Self::failure(&e));
                }
            },
            Outcome::Priced {
                service,
                country,
                result,
            } => match result {
                Ok(prices) => {
                    let _ = self.event_tx.send(DashboardEvent::Prices {
                        service,
                        country,
                        prices,
                    });
                }
                Err(e) => {
                    warn!(service = %service, country = %country, error = %e, "price lookup failed")
                }
            },
        }
    }

    fn finish_action(&mut self, action: RowAction, order_id: &str, result: Result<(), ApiError>) {
        if let Err(e) = result {
            warn!(order_id, action = ?action, error = %e, "order action failed");
            self.notice(Self::failure(&e));
            return;
        }
        let text = match action {
            RowAction::RequestAgain => {
                self.poller.start(order_id);
                format!("SMS for order {order_id} requested again")
            }
            RowAction::Cancel => {
                self.poller.stop(order_id);
                format!("Order {order_id} cancelled")
            }
            RowAction::Remove => {
                self.poller.stop(order_id);
                self.registry.remove(order_id);
                format!("Order {order_id} removed")
            }
            RowAction::Finish => {
                self.poller.stop(order_id);
                format!("Order {order_id} finished")
            }
        };
        info!(order_id, action = ?action, "order action succeeded");
        self.notice(Notice::success(text));
        self.refresh_orders();
        self.publish();
    }

    pub(crate) fn handle_poll_event(&mut self, ev: PollEvent) {
        match ev {
            PollEvent::Observed { order_id, report } => {
                self.registry.apply_status(&order_id, &report);
                self.publish();
            }
            PollEvent::Ended { order_id, reason } => {
                if reason == PollEnd::Expired {
                    self.info(format!(
                        "Stopped polling order {order_id} after {}",
                        humantime::format_duration(self.cfg.poll_timeout)
                    ));
                }
                self.publish();
            }
        }
    }

    pub(crate) fn view(&self) -> DashboardView {
        DashboardView {
            rows: render::render(&self.registry),
            balance: self.balance.clone(),
            create_in_flight: self.create_in_flight,
            polling: self.poller.active_ids(),
        }
    }

    fn publish(&self) {
        let _ = self
            .event_tx
            .send(DashboardEvent::View(Box::new(self.view())));
    }

    fn notice(&self, notice: Notice) {
        let _ = self.event_tx.send(DashboardEvent::Notice(notice));
    }

    fn info(&self, msg: impl Into<String>) {
        let _ = self.event_tx.send(DashboardEvent::Info(msg.into()));
    }

    pub(crate) fn shutdown(&mut self) {
        self.poller.stop_all();
    }
}

/// Drive the controller until the UI quits or drops its command channel.
pub(crate) async fn run_controller(
    cfg: DashboardConfig,
    backend: Arc<dyn OrderBackend>,
    event_tx: UnboundedSender<DashboardEvent>,
    cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (ctl, outcome_rx, poll_rx) = Controller::new(cfg, backend, event_tx);
    drive(ctl, cmd_rx, outcome_rx, poll_rx).await;
    Ok(())
}

/// The select loop proper. Hands the controller back after shutdown.
async fn drive(
    mut ctl: Controller,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
    mut outcome_rx: UnboundedReceiver<Outcome>,
    mut poll_rx: UnboundedReceiver<PollEvent>,
) -> Controller {
    let every = ctl.cfg.auto_refresh.max(Duration::from_millis(1));
    ctl.bootstrap();

    let mut auto_refresh = tokio::time::interval_at(Instant::now() + every, every);
    auto_refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if !ctl.handle_command(cmd) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(outcome) = outcome_rx.recv() => ctl.apply_outcome(outcome),
            Some(ev) = poll_rx.recv() => ctl.handle_poll_event(ev),
            _ = auto_refresh.tick() => ctl.sync_statuses(),
        }
    }

    ctl.shutdown();
    ctl
}
