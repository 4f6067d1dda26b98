//! Duplex transport to the streaming speech service
//!
//! A connection is two channels: encoded microphone frames go out on
//! `outbound`, everything the service says comes back as [`TransportEvent`]s.
//! The session manager never sees sockets, so it can be driven by synthetic
//! events in tests.

use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use super::protocol::{ClientMessage, LiveSetup, ServerMessage};
use crate::voice::WireBlob;
use crate::{Error, Result};

/// Default websocket endpoint of the Live API
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio live model
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Capacity of the outbound frame and inbound event channels
const CHANNEL_CAPACITY: usize = 64;

/// Something the remote side did
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Setup acknowledged; the channel is usable
    Open,
    /// A server message
    Message(Box<ServerMessage>),
    /// Send or receive failure
    Error(String),
    /// The remote closed the channel
    Closed,
}

/// One open duplex channel
#[derive(Debug)]
pub struct LiveConnection {
    /// Encoded microphone frames, in capture order
    pub outbound: mpsc::Sender<WireBlob>,
    /// Inbound events, in arrival order
    pub events: mpsc::Receiver<TransportEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl LiveConnection {
    /// Assemble a connection from its channels
    ///
    /// `close` is fired once when the connection is closed or dropped.
    #[must_use]
    pub const fn new(
        outbound: mpsc::Sender<WireBlob>,
        events: mpsc::Receiver<TransportEvent>,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            outbound,
            events,
            close: Some(close),
        }
    }

    /// Ask the transport to shut down; idempotent
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        self.events.close();
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens duplex channels to the streaming service
#[async_trait]
pub trait LiveTransport {
    /// Connect and send the session setup
    ///
    /// Resolves once the channel exists; [`TransportEvent::Open`] follows when
    /// the service acknowledges the setup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectFailed`] if the channel cannot be established
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection>;
}

/// Live API over a websocket
#[derive(Clone)]
pub struct WebSocketTransport {
    endpoint: String,
    api_key: SecretString,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Create a transport for `endpoint`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl LiveTransport for WebSocketTransport {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection> {
        let url = self.url()?;

        tracing::debug!(endpoint = %self.endpoint, model = %setup.model, "connecting to live service");

        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::ConnectFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = serde_json::to_string(&ClientMessage::setup(setup))?;
        sink.send(Message::Text(hello))
            .await
            .map_err(|e| Error::ConnectFailed(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<WireBlob>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(write_frames(sink, outbound_rx, close_rx, event_tx.clone()));

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => parse_event(text.as_bytes()),
                    Ok(Message::Binary(bytes)) => parse_event(&bytes),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "live service closed connection");
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                let Some(event) = event else { continue };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed).await;
        });

        Ok(LiveConnection::new(outbound_tx, event_rx, close_tx))
    }
}

/// Forward encoded frames to `sink` until closed
///
/// Once `close` fires, frames still queued on `outbound` are discarded.
async fn write_frames<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<WireBlob>,
    mut close: oneshot::Receiver<()>,
    events: mpsc::Sender<TransportEvent>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut close => break,
            blob = outbound.recv() => {
                let Some(blob) = blob else { break };
                let text = match serde_json::to_string(&ClientMessage::audio(blob)) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }
    outbound.close();
    let discarded = std::iter::from_fn(|| outbound.try_recv().ok()).count();
    if discarded > 0 {
        tracing::debug!(discarded, "dropped queued frames on close");
    }
    let _ = sink.send(Message::Close(None)).await;
    tracing::debug!("live writer stopped");
}

/// Map one JSON frame to an event; unparseable frames are logged and skipped
fn parse_event(bytes: &[u8]) -> Option<TransportEvent> {
    match serde_json::from_slice::<ServerMessage>(bytes) {
        Ok(msg) if msg.is_setup_complete() => Some(TransportEvent::Open),
        Ok(msg) => Some(TransportEvent::Message(Box::new(msg))),
        Err(e) => {
            tracing::warn!(error = %e, len = bytes.len(), "unparseable live message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_complete_maps_to_open() {
        assert_eq!(
            parse_event(br#"{"setupComplete":{}}"#),
            Some(TransportEvent::Open)
        );
    }

    #[test]
    fn content_maps_to_message() {
        let event = parse_event(br#"{"serverContent":{"interrupted":true}}"#);
        assert!(matches!(event, Some(TransportEvent::Message(m)) if m.is_interrupted()));
    }

    #[test]
    fn garbage_is_skipped() {
        assert_eq!(parse_event(b"not json"), None);
    }

    #[test]
    fn url_carries_api_key() {
        let transport = WebSocketTransport::new(
            DEFAULT_LIVE_ENDPOINT,
            SecretString::from("abc".to_string()),
        );
        let url = transport.url().unwrap();
        assert_eq!(url.query(), Some("key=abc"));
        assert_eq!(url.scheme(), "wss");
    }

    #[tokio::test]
    async fn frames_queued_before_close_are_not_sent() {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, _events_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();
        for _ in 0..20 {
            outbound_tx
                .try_send(WireBlob::encode(&[0.1; 16], 16000))
                .unwrap();
        }
        close_tx.send(()).unwrap();

        let (sink, peer) = futures::channel::mpsc::unbounded::<Message>();
        write_frames(sink, outbound_rx, close_rx, events_tx).await;

        let sent: Vec<Message> = peer.collect().await;
        assert_eq!(sent, vec![Message::Close(None)]);
        assert!(outbound_tx.try_send(WireBlob::encode(&[0.0], 16000)).is_err());
    }

    #[tokio::test]
    async fn frames_are_sent_in_order_until_closed() {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, _events_rx) = mpsc::channel(1);
        let (_close_tx, close_rx) = oneshot::channel::<()>();
        outbound_tx
            .try_send(WireBlob::encode(&[0.1; 4], 16000))
            .unwrap();
        outbound_tx
            .try_send(WireBlob::encode(&[-0.1; 4], 16000))
            .unwrap();
        drop(outbound_tx);

        let (sink, peer) = futures::channel::mpsc::unbounded::<Message>();
        write_frames(sink, outbound_rx, close_rx, events_tx).await;

        let sent: Vec<Message> = peer.collect().await;
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], Message::Text(t) if t.contains("realtimeInput")));
        assert_eq!(sent[2], Message::Close(None));
    }

    #[test]
    fn closing_connection_fires_signal_once() {
        let (outbound, _outbound_rx) = mpsc::channel(1);
        let (_events_tx, events) = mpsc::channel(1);
        let (close, mut closed) = oneshot::channel();
        let mut conn = LiveConnection::new(outbound, events, close);
        conn.close();
        conn.close();
        assert!(closed.try_recv().is_ok());
    }
}
