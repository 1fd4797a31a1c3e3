//! WebSocket client feeding push messages into the store.

use super::credential::user_id_from_token;
use super::reconnect::{step, Action, ConnectionEvent, ConnectionState};
use crate::config::PushConfig;
use crate::error::{NotifyError, Result};
use crate::store::NotificationStore;
use crate::types::{AcceptDecision, PushMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Parse one inbound frame.
pub fn decode_message(text: &str) -> Result<PushMessage> {
    let message: PushMessage =
        serde_json::from_str(text).map_err(|e| NotifyError::InvalidMessage(e.to_string()))?;
    if message.kind.as_str().is_empty() {
        return Err(NotifyError::InvalidMessage("empty type".into()));
    }
    Ok(message)
}

/// Push channel client for one user session.
pub struct PushClient {
    config: PushConfig,
    store: Arc<NotificationStore>,
    state: watch::Sender<ConnectionState>,
}

impl PushClient {
    pub fn new(config: PushConfig, store: Arc<NotificationStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            store,
            state,
        }
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Decode a frame and merge it into the store. Malformed frames are
    /// logged and dropped.
    pub fn handle_text(&self, text: &str) -> Option<AcceptDecision> {
        match decode_message(text) {
            Ok(message) => {
                tracing::debug!(kind = %message.kind, priority = %message.priority(), "push message received");
                Some(self.store.accept(message))
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed push message");
                None
            }
        }
    }

    /// Start the client on the current Tokio runtime.
    pub fn spawn(self, token: &str) -> Result<PushHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifyError::Transport(format!("no async runtime: {e}")))?;
        // Fail fast on a bad token instead of inside the task
        let user_id = user_id_from_token(token)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.state();
        let task = runtime.spawn(async move { self.run_for(&user_id, shutdown_rx).await });

        Ok(PushHandle {
            shutdown: shutdown_tx,
            state,
            task,
        })
    }

    /// Connect for the token's user and pump messages until a normal close,
    /// shutdown, or the retry budget runs out. Returns the final state.
    pub async fn run(&self, token: &str, shutdown: watch::Receiver<bool>) -> Result<ConnectionState> {
        let user_id = user_id_from_token(token)?;
        Ok(self.run_for(&user_id, shutdown).await)
    }

    async fn run_for(&self, user_id: &str, mut shutdown: watch::Receiver<bool>) -> ConnectionState {
        let url = self.config.url_for(user_id);
        let policy = self.config.reconnect;

        let mut state = ConnectionState::Disconnected;
        let mut transition = step(state, ConnectionEvent::Start, &policy);

        loop {
            state = self.enter(transition.next);

            match transition.action {
                Action::Connect => {}
                Action::ConnectAfter(delay) => {
                    if let ConnectionState::Connecting { attempt } = state {
                        tracing::info!(attempt, max_attempts = policy.max_attempts, ?delay, "reconnecting");
                    }
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = stopped(&mut shutdown) => {
                            transition = step(state, ConnectionEvent::Stop, &policy);
                            continue;
                        }
                    }
                }
                Action::GiveUp => {
                    tracing::error!(%url, max_attempts = policy.max_attempts, "giving up on push channel");
                    return state;
                }
                Action::None => return state,
            }

            let connected = tokio::select! {
                result = connect_async(url.as_str()) => result,
                _ = stopped(&mut shutdown) => {
                    transition = step(state, ConnectionEvent::Stop, &policy);
                    continue;
                }
            };

            let socket = match connected {
                Ok((socket, _response)) => socket,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "push channel connect failed");
                    transition = step(state, ConnectionEvent::Closed { code: None }, &policy);
                    continue;
                }
            };

            state = self.enter(step(state, ConnectionEvent::Opened, &policy).next);
            tracing::info!(%url, "push channel connected");

            let event = self.pump(socket, &mut shutdown).await;
            tracing::info!(?event, "push channel disconnected");
            transition = step(state, event, &policy);
        }
    }

    fn enter(&self, state: ConnectionState) -> ConnectionState {
        self.state.send_replace(state);
        state
    }

    /// Read frames in arrival order until the socket closes or shutdown.
    async fn pump(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) -> ConnectionEvent {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                _ = stopped(shutdown) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutdown".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "close frame not sent");
                    }
                    return ConnectionEvent::Stop;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&text);
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            self.handle_text(text);
                        }
                        Err(_) => tracing::warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return ConnectionEvent::Closed {
                            code: frame.map(|f| u16::from(f.code)),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "push channel read failed");
                        return ConnectionEvent::Closed { code: None };
                    }
                    None => return ConnectionEvent::Closed { code: None },
                },
            }
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Running client task.
pub struct PushHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<ConnectionState>,
}

impl PushHandle {
    /// Latest connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Close the channel normally and wait for the task to finish.
    pub async fn shutdown(self) -> Result<ConnectionState> {
        self.shutdown.send_replace(true);
        self.task
            .await
            .map_err(|e| NotifyError::Transport(format!("push task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let msg = decode_message(r#"{"type":"diary_available","target":"blink-study-overlay-monitor"}"#)
            .unwrap();
        assert_eq!(msg.kind.as_str(), "diary_available");
        assert_eq!(msg.target.as_deref(), Some("blink-study-overlay-monitor"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_message("not json"),
            Err(NotifyError::InvalidMessage(_))
        ));
        assert!(matches!(
            decode_message(r#"{"priority":"high"}"#),
            Err(NotifyError::InvalidMessage(_))
        ));
        assert!(matches!(
            decode_message(r#"{"type":""}"#),
            Err(NotifyError::InvalidMessage(_))
        ));
    }
}
