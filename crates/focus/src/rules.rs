//! Redirect rules and the installer that replaces them
//!
//! Rules follow the declarativeNetRequest dynamic rule shape: one rule per
//! blocked domain, matching top-level navigations to exactly that domain and
//! redirecting to the extension's blocking page. Subdomains are left to the
//! [`Interceptor`](crate::Interceptor).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::Result;

/// Priority given to every installed rule
pub const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Redirect { redirect: Redirect },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub request_domains: Vec<String>,
    pub resource_types: Vec<ResourceType>,
}

/// A single dynamic redirect rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockRule {
    pub fn redirect(id: u32, domain: &str, extension_path: &str) -> Self {
        Self {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction::Redirect {
                redirect: Redirect {
                    extension_path: extension_path.to_string(),
                },
            },
            condition: RuleCondition {
                request_domains: vec![domain.to_string()],
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    /// The domain this rule matches, if it targets exactly one
    pub fn domain(&self) -> Option<&str> {
        match self.condition.request_domains.as_slice() {
            [domain] => Some(domain),
            _ => None,
        }
    }
}

/// Host-side store of dynamic rules
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Hosts without a declarative rule engine rely on interception alone
    fn supports_rules(&self) -> bool {
        true
    }

    /// Ids of every dynamic rule currently installed, queried fresh
    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>>;

    async fn update_dynamic_rules(&self, remove_rule_ids: Vec<u32>, add_rules: Vec<BlockRule>)
        -> Result<()>;
}

/// Replaces the host's rule set wholesale
#[derive(Debug, Clone)]
pub struct RuleInstaller {
    redirect_path: String,
}

impl RuleInstaller {
    pub fn new(redirect_path: impl Into<String>) -> Self {
        Self {
            redirect_path: redirect_path.into(),
        }
    }

    /// Rules for a domain set, ids numbered from 1
    pub fn rules_for(&self, domains: &BTreeSet<String>) -> Vec<BlockRule> {
        domains
            .iter()
            .zip(1u32..)
            .map(|(domain, id)| BlockRule::redirect(id, domain, &self.redirect_path))
            .collect()
    }

    /// Clear every dynamic rule, then add one per domain
    pub async fn install<E>(&self, engine: &E, domains: &BTreeSet<String>) -> Result<usize>
    where
        E: RuleEngine + ?Sized,
    {
        if !engine.supports_rules() {
            debug!("Host has no rule engine, relying on interception");
            return Ok(0);
        }

        self.clear(engine).await?;

        let rules = self.rules_for(domains);
        let count = rules.len();
        if count > 0 {
            engine.update_dynamic_rules(Vec::new(), rules).await?;
            info!(domains = ?domains, "Installed block rules");
        }
        Ok(count)
    }

    /// Remove every dynamic rule the host knows about, returning how many
    pub async fn clear<E>(&self, engine: &E) -> Result<usize>
    where
        E: RuleEngine + ?Sized,
    {
        if !engine.supports_rules() {
            return Ok(0);
        }

        let ids = engine.dynamic_rule_ids().await?;
        let count = ids.len();
        if count > 0 {
            engine.update_dynamic_rules(ids, Vec::new()).await?;
            info!(count, "Cleared block rules");
        }
        Ok(count)
    }
}
