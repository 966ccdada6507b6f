//! One WebSocket per chat session, kept alive by a background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clarity_types::{ChatResponse, WsClientMessage, WsServerEvent};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, Result};
use crate::reconnect::{Backoff, ReconnectPolicy};

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What the background task reports.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Response(ChatResponse),
    Typing(bool),
    /// `error` frame from the server; the connection stays up.
    ServerError(String),
    Disconnected(String),
    ConnectFailed(String),
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect budget spent; the task has stopped.
    GaveUp { attempts: u32 },
}

pub struct ChatSocket {
    session_id: String,
    outgoing: mpsc::UnboundedSender<WsClientMessage>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChatSocket {
    /// Starts connecting to `{base_url}/api/v1/ws/{session_id}` in the
    /// background. Progress arrives through [`ChatSocket::next_event`].
    pub fn connect(base_url: &str, session_id: &str, policy: ReconnectPolicy) -> Result<Self> {
        let url = ws_url(base_url, session_id)?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(url, policy, out_rx, ev_tx, connected.clone()));

        Ok(Self {
            session_id: session_id.to_string(),
            outgoing: out_tx,
            events: ev_rx,
            connected,
            task,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queues a message; fails with [`ClientError::NotConnected`] while the
    /// socket is down so the caller can use HTTP instead.
    pub fn send(&self, content: &str, context: HashMap<String, serde_json::Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.outgoing
            .send(WsClientMessage {
                content: content.to_string(),
                context,
            })
            .map_err(|_| ClientError::NotConnected)
    }

    /// Next event, or `None` once the background task has stopped.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_event(&mut self) -> Option<SocketEvent> {
        self.events.try_recv().ok()
    }

    /// Closes the connection and stops reconnecting.
    pub async fn close(self) {
        let ChatSocket { outgoing, task, .. } = self;
        drop(outgoing);
        let abort = task.abort_handle();
        if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
            abort.abort();
        }
    }
}

/// Maps an `http(s)` API base URL to the session's `ws(s)` endpoint.
pub fn ws_url(base_url: &str, session_id: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ClientError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{rest}/api/v1/ws/{session_id}"))
}

enum SessionEnd {
    /// The owning [`ChatSocket`] is gone.
    ClientGone,
    Dropped(String),
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<WsClientMessage>,
    events: mpsc::UnboundedSender<SocketEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new(policy);
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                backoff.reset();
                // written while the previous connection was dropping
                let mut stale = 0usize;
                while outgoing.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    tracing::warn!(%url, stale, "discarded messages queued before reconnect");
                }
                connected.store(true, Ordering::Release);
                tracing::info!(%url, "chat socket connected");
                let _ = events.send(SocketEvent::Connected);

                let end = session(stream, &mut outgoing, &events).await;
                connected.store(false, Ordering::Release);
                match end {
                    SessionEnd::ClientGone => return,
                    SessionEnd::Dropped(reason) => {
                        tracing::info!(%url, %reason, "chat socket disconnected");
                        let _ = events.send(SocketEvent::Disconnected(reason));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "chat socket connect failed");
                let _ = events.send(SocketEvent::ConnectFailed(e.to_string()));
            }
        }

        if events.is_closed() {
            return;
        }
        match backoff.next_delay() {
            Some(delay) => {
                let attempt = backoff.attempts();
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "chat socket reconnecting");
                let _ = events.send(SocketEvent::Reconnecting { attempt, delay });
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::warn!(attempts = backoff.attempts(), "chat socket giving up");
                let _ = events.send(SocketEvent::GaveUp {
                    attempts: backoff.attempts(),
                });
                return;
            }
        }
    }
}

async fn session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outgoing: &mut mpsc::UnboundedReceiver<WsClientMessage>,
    events: &mpsc::UnboundedSender<SocketEvent>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            msg = outgoing.recv() => match msg {
                Some(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode chat message");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::text(text)).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::ClientGone;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsServerEvent>(text.as_str()) {
                    Ok(WsServerEvent::ChatResponse { data }) => {
                        let _ = events.send(SocketEvent::Response(data));
                    }
                    Ok(WsServerEvent::Typing { is_typing }) => {
                        let _ = events.send(SocketEvent::Typing(is_typing));
                    }
                    Ok(WsServerEvent::Error { message }) => {
                        let _ = events.send(SocketEvent::ServerError(message));
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring unrecognised server frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Dropped("closed by server".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    use super::*;

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// Accepts `connections` sockets in turn. Each one answers every text
    /// frame with typing / chat_response / typing; when `drop_first` is set
    /// the first connection is closed right after the handshake.
    async fn mock_server(connections: usize, drop_first: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for n in 0..connections {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                if drop_first && n == 0 {
                    let _ = ws.close(None).await;
                    continue;
                }
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let msg: WsClientMessage = serde_json::from_str(text.as_str()).unwrap();
                    let frames = [
                        WsServerEvent::Typing { is_typing: true },
                        WsServerEvent::ChatResponse {
                            data: ChatResponse {
                                content: format!("echo: {}", msg.content),
                                session_id: "s-1".into(),
                                timestamp: "2024-01-01T00:00:00Z".into(),
                                confidence_score: 0.5,
                                psychological_insight: None,
                                emotional_state: None,
                                topic_classification: None,
                                suggestions: vec![],
                            },
                        },
                        WsServerEvent::Typing { is_typing: false },
                    ];
                    for frame in frames {
                        let text = serde_json::to_string(&frame).unwrap();
                        ws.send(Message::text(text)).await.unwrap();
                    }
                }
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn builds_ws_urls() {
        assert_eq!(ws_url("http://localhost:8000/", "abc").unwrap(), "ws://localhost:8000/api/v1/ws/abc");
        assert_eq!(ws_url("https://api.example.com", "abc").unwrap(), "wss://api.example.com/api/v1/ws/abc");
        assert!(matches!(ws_url("localhost:8000", "abc"), Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_reconnects() {
        let base = closed_port().await;
        let mut socket = ChatSocket::connect(&base, "s-1", ReconnectPolicy::default()).unwrap();

        let mut failures = 0;
        let mut delays = Vec::new();
        while let Some(ev) = socket.next_event().await {
            match ev {
                SocketEvent::ConnectFailed(_) => failures += 1,
                SocketEvent::Reconnecting { delay, .. } => delays.push(delay.as_secs()),
                SocketEvent::GaveUp { attempts } => {
                    assert_eq!(attempts, 5);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(failures, 6);
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert!(!socket.is_connected());
        assert!(matches!(socket.send("hi", HashMap::new()), Err(ClientError::NotConnected)));
        // task has finished, channel drained
        assert_eq!(socket.next_event().await, None);
    }

    #[tokio::test]
    async fn exchanges_frames_with_server() {
        let base = mock_server(1, false).await;
        let mut socket = ChatSocket::connect(&base, "s-1", ReconnectPolicy::default()).unwrap();
        assert_eq!(socket.next_event().await, Some(SocketEvent::Connected));

        socket.send("hello", HashMap::new()).unwrap();
        assert_eq!(socket.next_event().await, Some(SocketEvent::Typing(true)));
        match socket.next_event().await {
            Some(SocketEvent::Response(resp)) => assert_eq!(resp.content, "echo: hello"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(socket.next_event().await, Some(SocketEvent::Typing(false)));
        socket.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_server_close() {
        let base = mock_server(2, true).await;
        let mut socket = ChatSocket::connect(&base, "s-1", ReconnectPolicy::default()).unwrap();

        assert_eq!(socket.next_event().await, Some(SocketEvent::Connected));
        assert!(matches!(socket.next_event().await, Some(SocketEvent::Disconnected(_))));
        assert_eq!(
            socket.next_event().await,
            Some(SocketEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            })
        );
        assert_eq!(socket.next_event().await, Some(SocketEvent::Connected));
        assert!(socket.is_connected());
        socket.close().await;
    }
}
