//! Sends chat messages over the session socket, or over HTTP when the socket
//! is down.

use std::collections::HashMap;
use std::time::Duration;

use clarity_types::{ChatRequest, ChatResponse};

use crate::error::{ClientError, Result};
use crate::http::ApiClient;
use crate::reconnect::ReconnectPolicy;
use crate::ws::{ChatSocket, SocketEvent};

const REPLY_TIMEOUT: Duration = Duration::from_secs(90);

pub struct ChatClient {
    api: ApiClient,
    session_id: String,
    socket: Option<ChatSocket>,
    reply_timeout: Duration,
    /// Socket replies still owed to messages that timed out.
    late_replies: usize,
}

impl ChatClient {
    pub fn new(api: ApiClient, session_id: impl Into<String>) -> Self {
        Self {
            api,
            session_id: session_id.into(),
            socket: None,
            reply_timeout: REPLY_TIMEOUT,
            late_replies: 0,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Starts the session socket. Until it reports `Connected`, messages go
    /// over HTTP.
    pub fn open_socket(&mut self, policy: ReconnectPolicy) -> Result<()> {
        let socket = ChatSocket::connect(self.api.base_url(), &self.session_id, policy)?;
        self.socket = Some(socket);
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.socket.as_ref().is_some_and(ChatSocket::is_connected)
    }

    /// Drains socket events until it connects, gives up, or `within` elapses.
    pub async fn wait_until_connected(&mut self, within: Duration) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        let wait = async {
            while let Some(ev) = socket.next_event().await {
                match ev {
                    SocketEvent::Connected => return true,
                    SocketEvent::GaveUp { .. } => return false,
                    _ => {}
                }
            }
            false
        };
        tokio::time::timeout(within, wait).await.unwrap_or(false)
    }

    /// Sends `content` and waits for the reply. Socket events seen while
    /// idle or waiting (typing indicators, reconnects) are passed to
    /// `on_event`.
    ///
    /// A message written to the socket is never resent over HTTP: if the
    /// connection drops before the reply, this fails with
    /// [`ClientError::ReplyLost`].
    pub async fn send<F>(&mut self, content: &str, mut on_event: F) -> Result<ChatResponse>
    where
        F: FnMut(&SocketEvent),
    {
        if let Some(socket) = self.socket.as_mut() {
            drain_idle_events(socket, &mut self.late_replies, &mut on_event);
            if socket.is_connected() && socket.send(content, HashMap::new()).is_ok() {
                let reply = wait_for_reply(socket, self.reply_timeout, &mut self.late_replies, &mut on_event).await;
                if matches!(reply, Err(ClientError::Timeout)) {
                    self.late_replies += 1;
                }
                return reply;
            }
        }
        self.api
            .send_message(&ChatRequest::new(self.session_id.clone(), content))
            .await
    }

    pub async fn close(self) {
        if let Some(socket) = self.socket {
            socket.close().await;
        }
    }
}

/// Consumes events that queued up between sends. Replies found here belong
/// to earlier messages; a dropped connection means they will never arrive.
fn drain_idle_events<F>(socket: &mut ChatSocket, late_replies: &mut usize, on_event: &mut F)
where
    F: FnMut(&SocketEvent),
{
    while let Some(ev) = socket.try_event() {
        match &ev {
            SocketEvent::Response(_) | SocketEvent::ServerError(_) => {
                if *late_replies > 0 {
                    *late_replies -= 1;
                    tracing::debug!(late_replies = *late_replies, "discarded late reply");
                } else {
                    tracing::debug!("discarded unsolicited reply");
                }
            }
            SocketEvent::Disconnected(_) | SocketEvent::GaveUp { .. } => {
                *late_replies = 0;
                on_event(&ev);
            }
            _ => on_event(&ev),
        }
    }
}

async fn wait_for_reply<F>(
    socket: &mut ChatSocket,
    timeout: Duration,
    late_replies: &mut usize,
    on_event: &mut F,
) -> Result<ChatResponse>
where
    F: FnMut(&SocketEvent),
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let ev = tokio::time::timeout_at(deadline, socket.next_event())
            .await
            .map_err(|_| ClientError::Timeout)?;
        match ev {
            Some(SocketEvent::Response(_) | SocketEvent::ServerError(_)) if *late_replies > 0 => {
                *late_replies -= 1;
                tracing::debug!(late_replies = *late_replies, "discarded late reply");
            }
            Some(SocketEvent::Response(resp)) => return Ok(resp),
            Some(SocketEvent::ServerError(message)) => return Err(ClientError::Server(message)),
            Some(ev @ (SocketEvent::Disconnected(_) | SocketEvent::GaveUp { .. })) => {
                *late_replies = 0;
                on_event(&ev);
                return Err(ClientError::ReplyLost);
            }
            Some(ev) => on_event(&ev),
            None => return Err(ClientError::ReplyLost),
        }
    }
}

#[cfg(test)]
mod test {
    use clarity_types::{WsClientMessage, WsServerEvent};
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::Message;

    use super::*;

    const HTTP_REPLY: &str = r#"{"content":"over http","session_id":"s-1","timestamp":"2024-01-01T00:00:00Z","confidence_score":0.3,"suggestions":[]}"#;

    fn reply(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            session_id: "s-1".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            confidence_score: 0.6,
            psychological_insight: None,
            emotional_state: Some("anxiety".into()),
            topic_classification: None,
            suggestions: vec![],
        }
    }

    /// Single-connection server: answers each message with `typing` then
    /// either a reply or an error frame.
    async fn ws_server(fail: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let msg: WsClientMessage = serde_json::from_str(text.as_str()).unwrap();
                let typing = serde_json::to_string(&WsServerEvent::Typing { is_typing: true }).unwrap();
                ws.send(Message::text(typing)).await.unwrap();
                let frame = if fail {
                    WsServerEvent::Error {
                        message: "Failed to process message".into(),
                    }
                } else {
                    WsServerEvent::ChatResponse {
                        data: reply(&format!("ws: {}", msg.content)),
                    }
                };
                ws.send(Message::text(serde_json::to_string(&frame).unwrap())).await.unwrap();
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn without_socket_uses_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat")
            .with_status(200)
            .with_body(HTTP_REPLY)
            .create_async()
            .await;

        let mut client = ChatClient::new(ApiClient::new(server.url()), "s-1");
        assert!(!client.is_live());
        let resp = client.send("hello", |_| {}).await.unwrap();
        assert_eq!(resp.content, "over http");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn live_socket_is_preferred() {
        let base = ws_server(false).await;
        let mut client = ChatClient::new(ApiClient::new(base), "s-1");
        client.open_socket(ReconnectPolicy::default()).unwrap();
        assert!(client.wait_until_connected(Duration::from_secs(5)).await);

        let mut typing = false;
        let resp = client
            .send("hello", |ev| {
                if *ev == SocketEvent::Typing(true) {
                    typing = true;
                }
            })
            .await
            .unwrap();
        assert!(typing);
        assert_eq!(resp.content, "ws: hello");
        assert_eq!(resp.emotional_state.as_deref(), Some("anxiety"));
        client.close().await;
    }

    #[tokio::test]
    async fn server_error_frame_is_returned() {
        let base = ws_server(true).await;
        let mut client = ChatClient::new(ApiClient::new(base), "s-1");
        client.open_socket(ReconnectPolicy::default()).unwrap();
        assert!(client.wait_until_connected(Duration::from_secs(5)).await);

        match client.send("hello", |_| {}).await {
            Err(ClientError::Server(message)) => assert_eq!(message, "Failed to process message"),
            other => panic!("unexpected: {other:?}"),
        }
        client.close().await;
    }

    #[tokio::test]
    async fn unreachable_socket_falls_back_to_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat")
            .with_status(200)
            .with_body(HTTP_REPLY)
            .create_async()
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut client = ChatClient::new(ApiClient::new(server.url()), "s-1");
        let policy = ReconnectPolicy {
            max_attempts: 1,
            base: Duration::from_millis(10),
            cap: Duration::from_millis(10),
        };
        client.socket = Some(ChatSocket::connect(&dead, "s-1", policy).unwrap());
        assert!(!client.wait_until_connected(Duration::from_secs(5)).await);
        assert!(!client.is_live());

        let resp = client.send("hello", |_| {}).await.unwrap();
        assert_eq!(resp.content, "over http");
        mock.assert_async().await;
    }

    /// Accepts connections until the test ends and answers each message
    /// with `ws: {content}`. `drop_first` closes the first connection right
    /// after the handshake; `first_delay` holds back the first reply.
    async fn echo_server(drop_first: bool, first_delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut accepted = 0;
            let mut replies = 0;
            while let Ok((tcp, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                accepted += 1;
                if drop_first && accepted == 1 {
                    let _ = ws.close(None).await;
                    continue;
                }
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let msg: WsClientMessage = serde_json::from_str(text.as_str()).unwrap();
                    if replies == 0 {
                        tokio::time::sleep(first_delay).await;
                    }
                    replies += 1;
                    let frame = WsServerEvent::ChatResponse {
                        data: reply(&format!("ws: {}", msg.content)),
                    };
                    ws.send(Message::text(serde_json::to_string(&frame).unwrap())).await.unwrap();
                }
            }
        });
        format!("http://{addr}")
    }

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            base: Duration::from_millis(10),
            cap: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn reconnect_while_idle_sends_message_once() {
        let mut server = mockito::Server::new_async().await;
        let http = server
            .mock("POST", "/api/v1/chat")
            .with_status(200)
            .with_body(HTTP_REPLY)
            .expect(0)
            .create_async()
            .await;

        let ws_base = echo_server(true, Duration::ZERO).await;
        let mut client = ChatClient::new(ApiClient::new(server.url()), "s-1");
        client.socket = Some(ChatSocket::connect(&ws_base, "s-1", quick_policy()).unwrap());
        assert!(client.wait_until_connected(Duration::from_secs(5)).await);

        // disconnect and reconnect happen while nobody reads events
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(client.is_live());

        let mut reconnected = false;
        let resp = client
            .send("hello", |ev| {
                if matches!(ev, SocketEvent::Reconnecting { .. }) {
                    reconnected = true;
                }
            })
            .await
            .unwrap();
        assert!(reconnected);
        assert_eq!(resp.content, "ws: hello");
        http.assert_async().await;
        client.close().await;
    }

    #[tokio::test]
    async fn late_reply_is_not_taken_for_the_next_one() {
        let base = echo_server(false, Duration::from_millis(300)).await;
        let mut client = ChatClient::new(ApiClient::new(base), "s-1").with_reply_timeout(Duration::from_millis(200));
        client.open_socket(ReconnectPolicy::default()).unwrap();
        assert!(client.wait_until_connected(Duration::from_secs(5)).await);

        assert!(matches!(client.send("first", |_| {}).await, Err(ClientError::Timeout)));

        client.reply_timeout = Duration::from_secs(5);
        let resp = client.send("second", |_| {}).await.unwrap();
        assert_eq!(resp.content, "ws: second");
        assert_eq!(client.late_replies, 0);
        client.close().await;
    }

    #[tokio::test]
    async fn dropped_after_write_is_not_resent_over_http() {
        let mut server = mockito::Server::new_async().await;
        let http = server
            .mock("POST", "/api/v1/chat")
            .with_status(200)
            .with_body(HTTP_REPLY)
            .expect(0)
            .create_async()
            .await;

        // reads one message, then hangs up without answering
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let mut client = ChatClient::new(ApiClient::new(server.url()), "s-1");
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..quick_policy()
        };
        client.socket = Some(ChatSocket::connect(&ws_base, "s-1", policy).unwrap());
        assert!(client.wait_until_connected(Duration::from_secs(5)).await);

        assert!(matches!(client.send("hello", |_| {}).await, Err(ClientError::ReplyLost)));
        http.assert_async().await;
    }
}
