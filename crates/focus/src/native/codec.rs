//! Native messaging framing
//!
//! Each message is a 32-bit length in native byte order followed by that
//! many bytes of UTF-8 JSON.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};

/// Largest message the browser will accept from a host
pub const MAX_OUTGOING: usize = 1024 * 1024;

/// Largest message a browser may send to a host
pub const MAX_INCOMING: usize = 64 * 1024 * 1024;

/// Encode a message with its length prefix
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_OUTGOING {
        return Err(SyncError::Protocol(format!(
            "outgoing message of {} bytes exceeds {} byte limit",
            body.len(),
            MAX_OUTGOING
        )));
    }
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_ne_bytes());
    framed.extend(body);
    Ok(framed)
}

/// Read one message; `Ok(None)` when the stream ends between messages
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(SyncError::Protocol(format!(
                    "stream ended after {} of 4 length bytes",
                    filled
                )))
            }
            n => filled += n,
        }
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_INCOMING {
        return Err(SyncError::Protocol(format!(
            "incoming message of {} bytes exceeds {} byte limit",
            len, MAX_INCOMING
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Write one message and flush it
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let framed = encode(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_prefixes_length() {
        let framed = encode(&json!({"a": 1})).unwrap();
        let len = u32::from_ne_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        assert_eq!(len, framed.len() - 4);
        assert_eq!(&framed[4..], br#"{"a":1}"#);
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let big = "x".repeat(MAX_OUTGOING);
        assert!(matches!(encode(&big), Err(SyncError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_messages_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_message(&mut a, &json!({"event": "tabUpdated", "tabId": 3})).await.unwrap();
        write_message(&mut a, &json!({"id": 1, "result": []})).await.unwrap();
        drop(a);

        let first = read_message(&mut b).await.unwrap().unwrap();
        assert_eq!(first["tabId"], 3);
        let second = read_message(&mut b).await.unwrap().unwrap();
        assert_eq!(second["id"], 1);
        assert!(read_message(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_oversized_header() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = (MAX_INCOMING as u32) + 1;
        a.write_all(&len.to_ne_bytes()).await.unwrap();

        assert!(matches!(read_message(&mut b).await, Err(SyncError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_truncated_header_is_an_error() {
        for cut in 1..4 {
            let (mut a, mut b) = tokio::io::duplex(64);
            a.write_all(&7u32.to_ne_bytes()[..cut]).await.unwrap();
            drop(a);

            assert!(matches!(read_message(&mut b).await, Err(SyncError::Protocol(_))));
        }
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&10u32.to_ne_bytes()).await.unwrap();
        a.write_all(b"{}").await.unwrap();
        drop(a);

        assert!(matches!(read_message(&mut b).await, Err(SyncError::Io(_))));
    }
}
