//! The blocking-state synchronizer
//!
//! Takes one poll result at a time and converges the browser to it:
//! commit the new state, replace or clear the rule set when something
//! changed, and sweep open tabs when a session starts. Navigation events
//! are checked against whatever state was last committed.

use focusguard_core::Config;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::{BrowserHost, NavigationEvent, TabId};
use crate::intercept::Interceptor;
use crate::normalize::normalize_all;
use crate::rules::RuleInstaller;
use crate::state::{SessionState, Snapshot};
use crate::status::{StatusError, StatusReport};

/// What a step did to the host's rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleChange {
    #[default]
    Unchanged,
    /// Rule set replaced with this many rules
    Installed(usize),
    Cleared,
}

/// Effect of one synchronization step
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    pub rules: RuleChange,
    /// Tabs sent to the blocking page by a focus-start sweep
    pub redirected: Vec<TabId>,
}

pub struct Synchronizer<H> {
    state: SessionState,
    host: H,
    installer: RuleInstaller,
    interceptor: Interceptor,
    failure_threshold: u32,
    /// A rule engine call failed; host rules may not match `state`
    host_stale: bool,
    /// A session started but the sweep never ran
    sweep_pending: bool,
}

impl<H: BrowserHost> Synchronizer<H> {
    pub fn new(host: H, config: &Config) -> Self {
        Self {
            state: SessionState::new(),
            host,
            installer: RuleInstaller::new(config.blocking_page_path.clone()),
            interceptor: Interceptor::new(
                config.blocking_page_url.clone(),
                config.exempt_schemes.clone(),
            ),
            failure_threshold: config.failure_threshold,
            host_stale: false,
            sweep_pending: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Feed one poll result through the synchronizer
    pub async fn handle_poll(
        &mut self,
        result: std::result::Result<StatusReport, StatusError>,
    ) -> Result<Outcome> {
        match result {
            Ok(report) => {
                self.state.record_success();
                self.reconcile(report.focusing, &report.blocked_sites).await
            }
            Err(e) => self.handle_poll_failure(&e).await,
        }
    }

    /// Converge the browser to a newly observed `{focusing, sites}` pair
    pub async fn reconcile<S: AsRef<str>>(&mut self, focusing: bool, raw_sites: &[S]) -> Result<Outcome> {
        let domains = normalize_all(raw_sites);
        let transition = self.state.commit(focusing, domains);
        let changed = transition.any() || self.host_stale;
        let mut outcome = Outcome::default();

        if self.state.is_enforcing() {
            if transition.focus_changed {
                info!(domains = ?self.state.blocked_domains(), "Focus session started");
                self.sweep_pending = true;
            }
            let installed = if changed {
                Some(self.apply_install().await)
            } else {
                None
            };
            // Open tabs are swept even when the rule engine refused the rules
            if self.sweep_pending {
                outcome.redirected = self.interceptor.sweep(&self.state, &self.host).await?;
                self.sweep_pending = false;
            }
            if let Some(installed) = installed {
                outcome.rules = RuleChange::Installed(installed?);
            }
        } else {
            self.sweep_pending = false;
            if changed {
                if transition.focus_changed && !focusing {
                    info!("Focus session ended");
                }
                self.apply_clear().await?;
                outcome.rules = RuleChange::Cleared;
            }
        }

        Ok(outcome)
    }

    /// A poll failed. Only a sustained outage while focusing changes state.
    pub async fn handle_poll_failure(&mut self, error: &StatusError) -> Result<Outcome> {
        let failures = self.state.record_failure();
        debug!(failures, error = %error, "Status poll failed");

        if !self.state.focusing() || failures < self.failure_threshold {
            return Ok(Outcome::default());
        }

        warn!(
            failures,
            "Status source unreachable, releasing all blocks"
        );
        self.state.enter_safe_state();
        self.sweep_pending = false;
        self.apply_clear().await?;
        Ok(Outcome {
            rules: RuleChange::Cleared,
            redirected: Vec::new(),
        })
    }

    /// Check a navigation against the committed state
    pub async fn handle_navigation(&self, event: &NavigationEvent) -> Result<bool> {
        self.interceptor
            .on_navigation(&self.state, event, &self.host)
            .await
    }

    async fn apply_install(&mut self) -> Result<usize> {
        let result = self
            .installer
            .install(&self.host, self.state.blocked_domains())
            .await;
        self.host_stale = result.is_err();
        result
    }

    async fn apply_clear(&mut self) -> Result<usize> {
        let result = self.installer.clear(&self.host).await;
        self.host_stale = result.is_err();
        result
    }
}
