//! WebSocket room transport.
//!
//! Connects to `{endpoint}/{room}` on the first reachable relay endpoint.
//! The relay is expected to fan binary frames out to every other socket in
//! the same room path; it never interprets them.

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use super::{Link, RoomTransport, TransportError, LINK_CAPACITY};
use crate::room::RoomId;

/// Relay-backed transport with ordered endpoint fallback.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoints: Vec<String>,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(endpoints: Vec<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            connect_timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Full URL of `room` on `endpoint`.
    pub fn room_url(endpoint: &str, room: &RoomId) -> String {
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            urlencoding::encode(room.name())
        )
    }

    async fn dial(&self, url: &str) -> Result<Link, TransportError> {
        let connect = tokio_tungstenite::connect_async(url);
        let (ws_stream, _) = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(TransportError::Unreachable(format!("{url}: {e}"))),
            Err(_) => return Err(TransportError::Timeout),
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (link, in_tx, mut out_rx) = Link::pair(LINK_CAPACITY);

        // Writer task: forward outgoing channel to WebSocket
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Reader task: forward binary frames until either side goes away
        let url_owned = url.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = ws_reader.next() => match frame {
                        Some(Ok(Message::Binary(data))) => {
                            if in_tx.send(data.to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("websocket read error on {}: {}", url_owned, e);
                            break;
                        }
                    },
                    _ = in_tx.closed() => break,
                }
            }
            debug!("websocket reader for {} finished", url_owned);
        });

        Ok(link)
    }
}

impl RoomTransport for WebSocketTransport {
    fn connect<'a>(&'a self, room: &'a RoomId) -> BoxFuture<'a, Result<Link, TransportError>> {
        async move {
            if self.endpoints.is_empty() {
                return Err(TransportError::NoEndpoints);
            }
            let mut last_error = TransportError::NoEndpoints;
            for endpoint in &self.endpoints {
                let url = Self::room_url(endpoint, room);
                match self.dial(&url).await {
                    Ok(link) => {
                        info!("connected to relay {}", url);
                        return Ok(link);
                    }
                    Err(e) => {
                        debug!("relay {} failed: {}", url, e);
                        last_error = e;
                    }
                }
            }
            Err(last_error)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_url_encodes_name() {
        let room = RoomId::new("team board/1");
        assert_eq!(
            WebSocketTransport::room_url("ws://relay.local/", &room),
            "ws://relay.local/team%20board%2F1"
        );
    }

    #[test]
    fn test_blank_endpoints_dropped() {
        let t = WebSocketTransport::new(
            vec!["".into(), "ws://a/".into()],
            Duration::from_secs(1),
        );
        assert_eq!(t.endpoints(), ["ws://a".to_string()]);
    }

    #[tokio::test]
    async fn test_no_endpoints() {
        let t = WebSocketTransport::new(vec![], Duration::from_secs(1));
        let result = t.connect(&RoomId::default()).await;
        assert!(matches!(result, Err(TransportError::NoEndpoints)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Port 9 (discard) on loopback is reliably closed in test sandboxes.
        let t = WebSocketTransport::new(
            vec!["ws://127.0.0.1:9".into()],
            Duration::from_secs(2),
        );
        let result = t.connect(&RoomId::default()).await;
        assert!(matches!(
            result,
            Err(TransportError::Unreachable(_)) | Err(TransportError::Timeout)
        ));
    }
}
