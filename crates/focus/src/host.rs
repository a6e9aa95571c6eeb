//! Tab inventory seam and navigation events

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::rules::RuleEngine;

/// Browser tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open tab as reported by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
    /// Destination of a navigation that has not committed yet
    #[serde(default)]
    pub pending_url: Option<String>,
}

impl Tab {
    /// The URL the tab is about to show, falling back to the committed one
    pub fn effective_url(&self) -> Option<&str> {
        self.pending_url.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationKind {
    /// URL of an existing tab changed (or started changing)
    Updated,
    /// A tab was opened
    Created,
}

/// A navigation or tab lifecycle event delivered by the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub tab_id: TabId,
    pub kind: NavigationKind,
    pub url: Option<String>,
    pub pending_url: Option<String>,
}

impl NavigationEvent {
    pub fn updated(tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            kind: NavigationKind::Updated,
            url: Some(url.into()),
            pending_url: None,
        }
    }

    pub fn created(tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            kind: NavigationKind::Created,
            url: Some(url.into()),
            pending_url: None,
        }
    }

    pub fn with_pending(mut self, pending_url: impl Into<String>) -> Self {
        self.pending_url = Some(pending_url.into());
        self
    }

    /// Pending destination when known, otherwise the reported URL
    pub fn target_url(&self) -> Option<&str> {
        self.pending_url.as_deref().or(self.url.as_deref())
    }
}

/// Enumerate tabs and send them somewhere else
#[async_trait]
pub trait TabHost: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<Tab>>;

    async fn update_tab_url(&self, tab_id: TabId, url: &str) -> Result<()>;
}

/// Everything the synchronizer needs from a browser
pub trait BrowserHost: RuleEngine + TabHost {}

impl<T: RuleEngine + TabHost> BrowserHost for T {}
