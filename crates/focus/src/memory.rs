//! In-process browser
//!
//! Holds tabs and dynamic rules in memory and records every redirect. Backs
//! the `simulate` command and the synchronizer tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, SyncError};
use crate::host::{NavigationEvent, Tab, TabHost, TabId};
use crate::rules::{BlockRule, RuleEngine};

#[derive(Debug, Default)]
struct Inner {
    tabs: Vec<Tab>,
    next_tab: i64,
    rules: BTreeMap<u32, BlockRule>,
    redirects: Vec<TabId>,
    rule_queries: usize,
    rule_updates: usize,
    fail_rule_calls: bool,
}

#[derive(Debug)]
pub struct MemoryBrowser {
    inner: Mutex<Inner>,
    supports_rules: bool,
}

impl Default for MemoryBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_tab: 1,
                ..Default::default()
            }),
            supports_rules: true,
        }
    }

    /// A browser without declarative rules, like Safari's extension host
    pub fn without_rule_engine() -> Self {
        Self {
            supports_rules: false,
            ..Self::new()
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a tab on `url` and return its id
    pub fn open_tab(&self, url: &str) -> TabId {
        let mut inner = self.inner();
        let id = TabId(inner.next_tab);
        inner.next_tab += 1;
        inner.tabs.push(Tab {
            id,
            url: Some(url.to_string()),
            pending_url: None,
        });
        id
    }

    /// Start navigating `tab_id` to `url` and return the matching event
    pub fn navigate(&self, tab_id: TabId, url: &str) -> NavigationEvent {
        let mut inner = self.inner();
        if let Some(tab) = inner.tabs.iter_mut().find(|t| t.id == tab_id) {
            tab.pending_url = Some(url.to_string());
        }
        NavigationEvent::updated(tab_id, url).with_pending(url)
    }

    /// Install a rule directly, bypassing the installer
    pub fn seed_rule(&self, rule: BlockRule) {
        self.inner().rules.insert(rule.id, rule);
    }

    /// Make every rule engine call fail until switched back
    pub fn set_rule_calls_failing(&self, failing: bool) {
        self.inner().fail_rule_calls = failing;
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.inner().tabs.iter().find(|t| t.id == tab_id).cloned()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.inner().tabs.clone()
    }

    pub fn rules(&self) -> Vec<BlockRule> {
        self.inner().rules.values().cloned().collect()
    }

    /// Tabs redirected so far, in order
    pub fn redirects(&self) -> Vec<TabId> {
        self.inner().redirects.clone()
    }

    /// Number of times the installed rule ids were queried
    pub fn rule_queries(&self) -> usize {
        self.inner().rule_queries
    }

    /// Number of update calls that added rules
    pub fn rule_updates(&self) -> usize {
        self.inner().rule_updates
    }
}

#[async_trait]
impl RuleEngine for MemoryBrowser {
    fn supports_rules(&self) -> bool {
        self.supports_rules
    }

    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>> {
        let mut inner = self.inner();
        if inner.fail_rule_calls {
            return Err(SyncError::Host("getDynamicRules unavailable".to_string()));
        }
        inner.rule_queries += 1;
        Ok(inner.rules.keys().copied().collect())
    }

    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<()> {
        let mut inner = self.inner();
        if inner.fail_rule_calls {
            return Err(SyncError::Host("updateDynamicRules unavailable".to_string()));
        }
        for id in remove_rule_ids {
            inner.rules.remove(&id);
        }
        if let Some(rule) = add_rules.iter().find(|r| inner.rules.contains_key(&r.id)) {
            return Err(SyncError::Host(format!("rule id {} already in use", rule.id)));
        }
        if !add_rules.is_empty() {
            inner.rule_updates += 1;
        }
        for rule in add_rules {
            inner.rules.insert(rule.id, rule);
        }
        Ok(())
    }
}

#[async_trait]
impl TabHost for MemoryBrowser {
    async fn list_tabs(&self) -> Result<Vec<Tab>> {
        Ok(self.tabs())
    }

    async fn update_tab_url(&self, tab_id: TabId, url: &str) -> Result<()> {
        let mut inner = self.inner();
        let tab = inner
            .tabs
            .iter_mut()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| SyncError::Host(format!("no tab with id {}", tab_id)))?;
        tab.url = Some(url.to_string());
        tab.pending_url = None;
        inner.redirects.push(tab_id);
        Ok(())
    }
}
