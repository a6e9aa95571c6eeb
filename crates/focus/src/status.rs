//! Status source: where the focus app reports what to block

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a poll produced no usable report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("malformed status body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for StatusError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StatusError::Timeout
        } else {
            StatusError::Transport(e.to_string())
        }
    }
}

/// Body of a successful status response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub focusing: bool,
    /// Raw site entries, possibly URLs; `null` or absent means none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub blocked_sites: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl StatusReport {
    pub fn parse(body: &[u8]) -> Result<Self, StatusError> {
        serde_json::from_slice(body).map_err(|e| StatusError::Body(e.to_string()))
    }
}

/// Anything that can answer "are we focusing, and on what"
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self) -> Result<StatusReport, StatusError>;
}

/// Polls the focus app's local HTTP endpoint
pub struct HttpStatusSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusSource {
    /// `timeout` bounds each request; keep it at or below the poll period
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, StatusError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<StatusReport, StatusError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let report = StatusReport::parse(&body)?;
        debug!(focusing = report.focusing, sites = report.blocked_sites.len(), "Polled status");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on an ephemeral port
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/status", addr)
    }

    fn source(url: &str) -> HttpStatusSource {
        HttpStatusSource::new(url, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_parse_report() {
        let report =
            StatusReport::parse(br#"{"focusing": true, "blocked_sites": ["x.com"]}"#).unwrap();
        assert!(report.focusing);
        assert_eq!(report.blocked_sites, vec!["x.com".to_string()]);

        let report = StatusReport::parse(br#"{"focusing": false, "blocked_sites": null}"#).unwrap();
        assert!(report.blocked_sites.is_empty());

        let report = StatusReport::parse(br#"{"focusing": false}"#).unwrap();
        assert!(report.blocked_sites.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(matches!(StatusReport::parse(b"not json"), Err(StatusError::Body(_))));
        assert!(matches!(
            StatusReport::parse(br#"{"blocked_sites": []}"#),
            Err(StatusError::Body(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve_once(
            "200 OK",
            r#"{"focusing": true, "blocked_sites": ["https://x.com/", "y.com"]}"#,
        )
        .await;

        let report = source(&url).fetch().await.unwrap();
        assert!(report.focusing);
        assert_eq!(report.blocked_sites.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        assert_eq!(source(&url).fetch().await, Err(StatusError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_fetch_bad_body() {
        let url = serve_once("200 OK", "<html>").await;
        assert!(matches!(source(&url).fetch().await, Err(StatusError::Body(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/status", addr);
        assert!(matches!(
            source(&url).fetch().await,
            Err(StatusError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let url = format!("http://{}/status", addr);
        let source = HttpStatusSource::new(url, Duration::from_millis(200)).unwrap();
        assert_eq!(source.fetch().await, Err(StatusError::Timeout));
    }
}
