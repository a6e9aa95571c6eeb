//! Session state as last observed from the focus app
//!
//! One `SessionState` lives inside the [`Synchronizer`](crate::Synchronizer);
//! nothing else mutates it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::intercept::host_matches;

/// What changed when a new observation was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub focus_changed: bool,
    pub domains_changed: bool,
}

impl Transition {
    pub fn any(&self) -> bool {
        self.focus_changed || self.domains_changed
    }
}

/// Blocking state currently enforced
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    focusing: bool,
    blocked_domains: BTreeSet<String>,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focusing(&self) -> bool {
        self.focusing
    }

    pub fn blocked_domains(&self) -> &BTreeSet<String> {
        &self.blocked_domains
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Focusing with at least one domain to block
    pub fn is_enforcing(&self) -> bool {
        self.focusing && !self.blocked_domains.is_empty()
    }

    /// Whether navigation to `host` must be intercepted right now
    pub fn is_blocked(&self, host: &str) -> bool {
        self.focusing && host_matches(host, &self.blocked_domains)
    }

    /// Store a freshly polled state and report what differs from the old one.
    /// Domain comparison is set equality, order never counts.
    pub(crate) fn commit(&mut self, focusing: bool, domains: BTreeSet<String>) -> Transition {
        let transition = Transition {
            focus_changed: focusing != self.focusing,
            domains_changed: domains != self.blocked_domains,
        };
        self.focusing = focusing;
        self.blocked_domains = domains;
        transition
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
    }

    /// Count a failed poll, returning the new streak length
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Drop to `focusing=false` with nothing blocked
    pub(crate) fn enter_safe_state(&mut self) {
        self.focusing = false;
        self.blocked_domains.clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            focusing: self.focusing,
            blocked_domains: self.blocked_domains.iter().cloned().collect(),
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
        }
    }
}

/// Serializable view of the session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub focusing: bool,
    pub blocked_domains: Vec<String>,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_initial_state() {
        let state = SessionState::new();
        assert!(!state.focusing());
        assert!(state.blocked_domains().is_empty());
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.last_success().is_none());
    }

    #[test]
    fn test_commit_reports_transitions() {
        let mut state = SessionState::new();

        let t = state.commit(true, domains(&["a.com", "b.com"]));
        assert!(t.focus_changed);
        assert!(t.domains_changed);

        let t = state.commit(true, domains(&["b.com", "a.com"]));
        assert!(!t.any());

        let t = state.commit(true, domains(&["a.com"]));
        assert!(!t.focus_changed);
        assert!(t.domains_changed);
    }

    #[test]
    fn test_failure_counter() {
        let mut state = SessionState::new();
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.last_success().is_some());
    }

    #[test]
    fn test_is_blocked_requires_focus() {
        let mut state = SessionState::new();
        state.commit(false, domains(&["b.com"]));
        assert!(!state.is_blocked("a.b.com"));

        state.commit(true, domains(&["b.com"]));
        assert!(state.is_blocked("a.b.com"));
        assert!(!state.is_blocked("x.com"));
    }

    #[test]
    fn test_safe_state() {
        let mut state = SessionState::new();
        state.commit(true, domains(&["b.com"]));
        state.enter_safe_state();
        assert!(!state.focusing());
        assert!(!state.is_enforcing());
        assert!(state.blocked_domains().is_empty());
    }
}
