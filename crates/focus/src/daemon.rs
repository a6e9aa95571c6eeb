//! Event loop driving the synchronizer
//!
//! Poll ticks and browser events are handled one at a time on a single
//! loop, so a poll's reconciliation always finishes before the next event
//! is looked at. Ticks that come due while a poll is still running are
//! skipped rather than queued.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::host::{BrowserHost, NavigationEvent};
use crate::status::StatusSource;
use crate::sync::{RuleChange, Synchronizer};

pub struct SyncLoop<S, H> {
    source: S,
    sync: Synchronizer<H>,
    poll_interval: Duration,
}

impl<S: StatusSource, H: BrowserHost> SyncLoop<S, H> {
    pub fn new(source: S, sync: Synchronizer<H>, poll_interval: Duration) -> Self {
        Self {
            source,
            sync,
            poll_interval,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer<H> {
        &self.sync
    }

    pub fn into_synchronizer(self) -> Synchronizer<H> {
        self.sync
    }

    /// Run until shutdown is signalled or the browser's event stream ends.
    /// The first poll happens immediately.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<NavigationEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval = ?self.poll_interval, "Synchronizer started");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Synchronizer shutting down");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.poll_once().await;
                }

                event = events.recv() => match event {
                    Some(event) => self.navigation(event).await,
                    None => {
                        info!("Browser event stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// One poll plus reconciliation. Errors are logged; the next tick retries.
    pub async fn poll_once(&mut self) {
        let result = self.source.fetch().await;
        match self.sync.handle_poll(result).await {
            Ok(outcome) => {
                match outcome.rules {
                    RuleChange::Installed(count) => debug!(count, "Rules replaced"),
                    RuleChange::Cleared => debug!("Rules cleared"),
                    RuleChange::Unchanged => {}
                }
                if !outcome.redirected.is_empty() {
                    info!(tabs = outcome.redirected.len(), "Swept open tabs");
                }
            }
            Err(e) => error!(error = %e, "Reconciliation failed, retrying on next poll"),
        }
        debug!(state = ?self.sync.snapshot(), "Poll complete");
    }

    async fn navigation(&mut self, event: NavigationEvent) {
        if let Err(e) = self.sync.handle_navigation(&event).await {
            warn!(tab = %event.tab_id, error = %e, "Failed to redirect tab");
        }
    }
}
