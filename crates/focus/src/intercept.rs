//! Live navigation interception and the focus-start tab sweep

use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Result;
use crate::host::{NavigationEvent, TabHost, TabId};
use crate::state::SessionState;

/// True when `host` is a blocked domain or one of its subdomains.
/// Comparison ignores ASCII case.
pub fn host_matches(host: &str, domains: &BTreeSet<String>) -> bool {
    domains.iter().any(|domain| matches_domain(host, domain))
}

fn matches_domain(host: &str, domain: &str) -> bool {
    if domain.is_empty() || host.len() < domain.len() {
        return false;
    }
    if host.len() == domain.len() {
        return host.eq_ignore_ascii_case(domain);
    }
    let split = host.len() - domain.len();
    host.is_char_boundary(split)
        && host.as_bytes()[split - 1] == b'.'
        && host[split..].eq_ignore_ascii_case(domain)
}

/// Redirects tabs that are on, or heading to, a blocked domain
#[derive(Debug, Clone)]
pub struct Interceptor {
    blocking_page_url: String,
    exempt_prefixes: Vec<String>,
}

impl Interceptor {
    pub fn new(blocking_page_url: impl Into<String>, exempt_prefixes: Vec<String>) -> Self {
        Self {
            blocking_page_url: blocking_page_url.into(),
            exempt_prefixes,
        }
    }

    pub fn blocking_page_url(&self) -> &str {
        &self.blocking_page_url
    }

    /// Hostname worth checking for `url`; `None` for internal pages,
    /// the blocking page itself, and anything that does not parse.
    pub fn candidate_host(&self, url: &str) -> Option<String> {
        if url.starts_with(&self.blocking_page_url)
            || self.exempt_prefixes.iter().any(|p| url.starts_with(p.as_str()))
        {
            return None;
        }
        let parsed = Url::parse(url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        parsed.host_str().map(str::to_string)
    }

    /// Should a tab showing `url` be sent to the blocking page
    pub fn should_block(&self, state: &SessionState, url: &str) -> bool {
        state.focusing()
            && self
                .candidate_host(url)
                .is_some_and(|host| state.is_blocked(&host))
    }

    /// React to a navigation event; returns whether the tab was redirected
    pub async fn on_navigation<T>(
        &self,
        state: &SessionState,
        event: &NavigationEvent,
        tabs: &T,
    ) -> Result<bool>
    where
        T: TabHost + ?Sized,
    {
        if !state.focusing() {
            return Ok(false);
        }
        let Some(url) = event.target_url() else {
            return Ok(false);
        };
        if !self.should_block(state, url) {
            return Ok(false);
        }

        info!(tab = %event.tab_id, url, kind = ?event.kind, "Intercepted navigation");
        tabs.update_tab_url(event.tab_id, &self.blocking_page_url).await?;
        Ok(true)
    }

    /// Redirect every open tab that matches. Individual redirect failures
    /// are logged and skipped.
    pub async fn sweep<T>(&self, state: &SessionState, tabs: &T) -> Result<Vec<TabId>>
    where
        T: TabHost + ?Sized,
    {
        debug!(domains = ?state.blocked_domains(), "Sweeping open tabs");
        let mut redirected = Vec::new();

        for tab in tabs.list_tabs().await? {
            let Some(url) = tab.effective_url() else {
                continue;
            };
            if !self.should_block(state, url) {
                continue;
            }
            match tabs.update_tab_url(tab.id, &self.blocking_page_url).await {
                Ok(()) => {
                    info!(tab = %tab.id, url, "Redirected open tab");
                    redirected.push(tab.id);
                }
                Err(e) => warn!(tab = %tab.id, error = %e, "Failed to redirect tab"),
            }
        }

        Ok(redirected)
    }
}
