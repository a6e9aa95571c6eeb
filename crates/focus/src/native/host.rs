//! Request/response client over a native messaging channel
//!
//! Outgoing: `{id, method, params}`. The extension answers with
//! `{id, result}` or `{id, error}` and pushes tab events as
//! `{event, tabId, url?, pendingUrl?}` whenever they happen.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::codec::{read_message, write_message};
use crate::error::{Result, SyncError};
use crate::host::{NavigationEvent, NavigationKind, Tab, TabHost, TabId};
use crate::rules::{BlockRule, RuleEngine};

type Reply = std::result::Result<Value, String>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming {
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event(EventMessage),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum EventKind {
    TabUpdated,
    TabCreated,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventMessage {
    event: EventKind,
    tab_id: TabId,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pending_url: Option<String>,
}

impl From<EventMessage> for NavigationEvent {
    fn from(msg: EventMessage) -> Self {
        NavigationEvent {
            tab_id: msg.tab_id,
            kind: match msg.event {
                EventKind::TabUpdated => NavigationKind::Updated,
                EventKind::TabCreated => NavigationKind::Created,
            },
            url: msg.url,
            pending_url: msg.pending_url,
        }
    }
}

#[derive(Deserialize)]
struct RuleRef {
    id: u32,
}

/// Browser host reached through the extension over native messaging
pub struct NativeHost {
    outgoing: mpsc::UnboundedSender<Value>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,
    rule_engine: bool,
}

impl NativeHost {
    /// Start the reader and writer tasks. The returned receiver yields tab
    /// events and closes when the browser disconnects.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        call_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<NavigationEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(write_loop(writer, outgoing_rx));
        tokio::spawn(read_loop(reader, events_tx, pending.clone()));

        let host = Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
            rule_engine: true,
        };
        (host, events_rx)
    }

    /// Declare whether the extension can manage declarative rules
    pub fn with_rule_engine(mut self, enabled: bool) -> Self {
        self.rule_engine = enabled;
        self
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = json!({"id": id, "method": method, "params": params});
        if self.outgoing.send(request).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(SyncError::Protocol("browser connection closed".to_string()));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(SyncError::Host(format!("{}: {}", method, message))),
            Ok(Err(_)) => Err(SyncError::Protocol("browser connection closed".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SyncError::Host(format!(
                    "{} timed out after {:?}",
                    method, self.call_timeout
                )))
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            error!(error = %e, "Failed to write to browser");
            break;
        }
    }
}

async fn read_loop<R>(mut reader: R, events: mpsc::UnboundedSender<NavigationEvent>, pending: Pending)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => dispatch(message, &events, &pending).await,
            Ok(None) => {
                info!("Browser closed the native messaging channel");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read from browser");
                break;
            }
        }
    }
    // Dropping the senders fails every outstanding call
    pending.lock().await.clear();
}

async fn dispatch(message: Value, events: &mpsc::UnboundedSender<NavigationEvent>, pending: &Pending) {
    match serde_json::from_value::<Incoming>(message) {
        Ok(Incoming::Reply { id, result, error }) => {
            let Some(tx) = pending.lock().await.remove(&id) else {
                debug!(id, "Reply for unknown or expired request");
                return;
            };
            let reply = match error {
                Some(message) => Err(message),
                None => Ok(result),
            };
            let _ = tx.send(reply);
        }
        Ok(Incoming::Event(event)) => {
            let _ = events.send(event.into());
        }
        Err(e) => warn!(error = %e, "Ignoring unrecognized message from browser"),
    }
}

#[async_trait]
impl RuleEngine for NativeHost {
    fn supports_rules(&self) -> bool {
        self.rule_engine
    }

    async fn dynamic_rule_ids(&self) -> Result<Vec<u32>> {
        let value = self.call("getDynamicRules", json!({})).await?;
        let rules: Vec<RuleRef> = serde_json::from_value(value)?;
        Ok(rules.into_iter().map(|r| r.id).collect())
    }

    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<()> {
        let params = json!({"removeRuleIds": remove_rule_ids, "addRules": add_rules});
        self.call("updateDynamicRules", params).await?;
        Ok(())
    }
}

#[async_trait]
impl TabHost for NativeHost {
    async fn list_tabs(&self) -> Result<Vec<Tab>> {
        let value = self.call("queryTabs", json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn update_tab_url(&self, tab_id: TabId, url: &str) -> Result<()> {
        self.call("updateTab", json!({"tabId": tab_id, "url": url})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBrowser;
    use tokio::io::{duplex, DuplexStream};

    /// Answers host requests from a `MemoryBrowser`, the way the extension
    /// answers them from the browser APIs
    async fn fake_extension(
        mut from_host: DuplexStream,
        mut to_host: DuplexStream,
        browser: Arc<MemoryBrowser>,
    ) {
        while let Ok(Some(request)) = read_message(&mut from_host).await {
            let id = request["id"].clone();
            let params = request["params"].clone();
            let reply = match request["method"].as_str() {
                Some("getDynamicRules") => json!({"id": id, "result": browser.rules()}),
                Some("updateDynamicRules") => {
                    let remove: Vec<u32> =
                        serde_json::from_value(params["removeRuleIds"].clone()).unwrap();
                    let add: Vec<BlockRule> =
                        serde_json::from_value(params["addRules"].clone()).unwrap();
                    match browser.update_dynamic_rules(remove, add).await {
                        Ok(()) => json!({"id": id, "result": null}),
                        Err(e) => json!({"id": id, "error": e.to_string()}),
                    }
                }
                Some("queryTabs") => json!({"id": id, "result": browser.tabs()}),
                Some("updateTab") => {
                    let tab: TabId = serde_json::from_value(params["tabId"].clone()).unwrap();
                    let url = params["url"].as_str().unwrap_or_default().to_string();
                    match browser.update_tab_url(tab, &url).await {
                        Ok(()) => json!({"id": id, "result": null}),
                        Err(e) => json!({"id": id, "error": e.to_string()}),
                    }
                }
                _ => json!({"id": id, "error": "unknown method"}),
            };
            write_message(&mut to_host, &reply).await.unwrap();
        }
    }

    fn connect(browser: Arc<MemoryBrowser>) -> (NativeHost, mpsc::UnboundedReceiver<NavigationEvent>) {
        let (host_out, ext_in) = duplex(64 * 1024);
        let (ext_out, host_in) = duplex(64 * 1024);
        tokio::spawn(fake_extension(ext_in, ext_out, browser));
        NativeHost::spawn(host_in, host_out, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_rules_round_trip_through_extension() {
        let browser = Arc::new(MemoryBrowser::new());
        let (host, _events) = connect(browser.clone());

        host.update_dynamic_rules(vec![], vec![BlockRule::redirect(1, "x.com", "/blocked.html")])
            .await
            .unwrap();
        assert_eq!(host.dynamic_rule_ids().await.unwrap(), vec![1]);

        host.update_dynamic_rules(vec![1], vec![]).await.unwrap();
        assert!(browser.rules().is_empty());
    }

    #[tokio::test]
    async fn test_tabs_through_extension() {
        let browser = Arc::new(MemoryBrowser::new());
        let tab = browser.open_tab("https://x.com/");
        let (host, _events) = connect(browser.clone());

        let tabs = host.list_tabs().await.unwrap();
        assert_eq!(tabs.len(), 1);
        host.update_tab_url(tab, "chrome-extension://id/blocked.html").await.unwrap();
        assert_eq!(browser.redirects(), vec![tab]);
    }

    #[tokio::test]
    async fn test_rule_engine_can_be_switched_off() {
        let browser = Arc::new(MemoryBrowser::new());
        let (host, _events) = connect(browser.clone());
        assert!(host.supports_rules());

        let host = host.with_rule_engine(false);
        assert!(!host.supports_rules());
        let installed = crate::rules::RuleInstaller::new("/blocked.html")
            .install(&host, &["x.com".to_string()].into_iter().collect())
            .await
            .unwrap();
        assert_eq!(installed, 0);
        assert!(browser.rules().is_empty());
    }

    #[tokio::test]
    async fn test_error_reply_becomes_host_error() {
        let browser = Arc::new(MemoryBrowser::new());
        let (host, _events) = connect(browser);

        let err = host.update_tab_url(TabId(42), "about:blank").await.unwrap_err();
        assert!(matches!(err, SyncError::Host(_)));
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let (host_out, _ext_in) = duplex(1024);
        let (mut ext_out, host_in) = duplex(1024);
        let (_host, mut events) = NativeHost::spawn(host_in, host_out, Duration::from_secs(1));

        write_message(
            &mut ext_out,
            &json!({"event": "tabCreated", "tabId": 9, "pendingUrl": "https://x.com/"}),
        )
        .await
        .unwrap();
        drop(ext_out);

        let event = events.recv().await.unwrap();
        assert_eq!(event.tab_id, TabId(9));
        assert_eq!(event.kind, NavigationKind::Created);
        assert_eq!(event.target_url(), Some("https://x.com/"));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out() {
        let (host_out, _ext_in) = duplex(1024);
        let (_ext_out, host_in) = duplex(1024);
        let (host, _events) = NativeHost::spawn(host_in, host_out, Duration::from_millis(50));

        let err = host.list_tabs().await.unwrap_err();
        assert!(matches!(err, SyncError::Host(_)));
    }

    #[tokio::test]
    async fn test_disconnect_fails_outstanding_calls() {
        let (host_out, _ext_in) = duplex(1024);
        let (ext_out, host_in) = duplex(1024);
        let (host, _events) = NativeHost::spawn(host_in, host_out, Duration::from_secs(5));

        let call = tokio::spawn(async move { host.dynamic_rule_ids().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(ext_out);

        let result = call.await.unwrap();
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }
}
