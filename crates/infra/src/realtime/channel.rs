//! Realtime channel
//!
//! One [`RealtimeChannel`] owns one logical socket (chat room, notification
//! feed or maintenance room). A background task drives the connection:
//!
//! ```text
//! Closed -> Connecting -> Open -> Closing -> Closed   (disconnect)
//!                          |
//!                          +-> Closed -> Reconnecting -> Connecting ...
//! ```
//!
//! While open the task sends a heartbeat ping every interval (a zero
//! interval disables it), dispatches inbound frames to subscribers and
//! forwards outbound messages. After an unexpected drop it reconnects with
//! exponential backoff until the attempt budget is spent, then emits
//! [`RealtimeEvent::ReconnectFailed`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rentline_core::{RealtimeError, SocketConnector, SocketFrame, SocketStream, TokenStore};
use rentline_domain::constants::WS_TOKEN_QUERY_PARAM;
use rentline_domain::{
    ChannelEndpoint, ChatMessage, ConnectionState, EntityUpdate, Envelope, InboundMessage,
    MessageKind, NotificationPayload, OutboundMessage, PresenceUpdate, RealtimeConfig,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::backoff::ReconnectPolicy;
use super::dispatch::{SubscriberRegistry, Subscription};
use super::websocket::TungsteniteConnector;

const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 32;

/// Lifecycle notifications broadcast to [`RealtimeChannel::events`] receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    StateChanged(ConnectionState),
    /// Reconnect attempt `attempt` starts after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Terminal: the reconnect budget is spent.
    ReconnectFailed { attempts: u32 },
}

enum Command {
    Send { text: String, reply: oneshot::Sender<bool> },
}

enum SessionEnd {
    Disconnected,
    Dropped,
}

struct RunningTask {
    cancel: CancellationToken,
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

struct ChannelShared {
    endpoint: ChannelEndpoint,
    config: RealtimeConfig,
    policy: ReconnectPolicy,
    connector: Arc<dyn SocketConnector>,
    tokens: Arc<dyn TokenStore>,
    registry: Arc<SubscriberRegistry>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<RealtimeEvent>,
}

/// Reconnecting websocket channel with typed subscribers.
pub struct RealtimeChannel {
    shared: Arc<ChannelShared>,
    task: Mutex<Option<RunningTask>>,
}

impl RealtimeChannel {
    pub fn new(
        endpoint: ChannelEndpoint,
        config: RealtimeConfig,
        connector: Arc<dyn SocketConnector>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(ChannelShared {
                endpoint,
                policy: ReconnectPolicy::from_config(&config),
                config,
                connector,
                tokens,
                registry: Arc::new(SubscriberRegistry::new()),
                state,
                events,
            }),
            task: Mutex::new(None),
        }
    }

    /// Channel over a real websocket.
    pub fn websocket(
        endpoint: ChannelEndpoint,
        config: RealtimeConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self::new(endpoint, config, Arc::new(TungsteniteConnector::default()), tokens)
    }

    pub fn endpoint(&self) -> &ChannelEndpoint {
        &self.shared.endpoint
    }

    /// Start the connection task. No-op while one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            debug!(endpoint = ?self.shared.endpoint, "Realtime channel already running");
            return;
        }

        let cancel = CancellationToken::new();
        let (commands, inbox) = mpsc::channel(COMMAND_CAPACITY);
        let handle = tokio::spawn(run(Arc::clone(&self.shared), cancel.clone(), inbox));
        *task = Some(RunningTask { cancel, commands, handle });
    }

    /// Close the socket and stop reconnecting. Resolves once the task ended.
    pub async fn disconnect(&self) {
        let running = self.task.lock().take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(err) = running.handle.await {
            warn!(error = %err, "Realtime task ended abnormally");
            self.shared.set_state(ConnectionState::Closed);
        }
    }

    /// Best-effort send. Returns `false` unless the channel is open and the
    /// frame was written.
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        if self.state() != ConnectionState::Open {
            debug!(kind = %message.kind, "Realtime channel not open, message dropped");
            return false;
        }

        let text = match message.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "Failed to encode realtime message");
                return false;
            }
        };

        let commands = self.task.lock().as_ref().map(|running| running.commands.clone());
        let Some(commands) = commands else {
            return false;
        };

        let (reply, written) = oneshot::channel();
        if commands.send(Command::Send { text, reply }).await.is_err() {
            return false;
        }
        written.await.unwrap_or(false)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.shared.events.subscribe()
    }

    pub fn subscribe<F>(&self, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(kind, Arc::new(handler))
    }

    pub fn on_chat<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.subscribe(MessageKind::Chat, move |message| {
            if let InboundMessage::Chat(chat) = message {
                handler(chat);
            }
        })
    }

    pub fn on_notification<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NotificationPayload) + Send + Sync + 'static,
    {
        self.subscribe(MessageKind::Notification, move |message| {
            if let InboundMessage::Notification(notification) = message {
                handler(notification);
            }
        })
    }

    pub fn on_presence<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PresenceUpdate) + Send + Sync + 'static,
    {
        self.subscribe(MessageKind::Presence, move |message| {
            if let InboundMessage::Presence(presence) = message {
                handler(presence);
            }
        })
    }

    pub fn on_entity_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EntityUpdate) + Send + Sync + 'static,
    {
        self.subscribe(MessageKind::EntityUpdate, move |message| {
            if let InboundMessage::EntityUpdate(update) = message {
                handler(update);
            }
        })
    }

    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(MessageKind::Message, move |message| {
            if let InboundMessage::Message(envelope) = message {
                handler(envelope);
            }
        })
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

async fn run(
    shared: Arc<ChannelShared>,
    cancel: CancellationToken,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut attempts = 0u32;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let url = match shared.socket_url().await {
            Ok(url) => url,
            Err(err) => {
                error!(endpoint = ?shared.endpoint, error = %err, "Cannot open realtime channel");
                shared.set_state(ConnectionState::Closed);
                return;
            }
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            result = shared.connector.connect(&url) => result,
        };

        match connected {
            Ok(mut stream) => {
                attempts = 0;
                shared.set_state(ConnectionState::Open);
                info!(endpoint = ?shared.endpoint, "Realtime channel open");

                match shared.session(stream.as_mut(), &cancel, &mut commands).await {
                    SessionEnd::Disconnected => {
                        shared.set_state(ConnectionState::Closing);
                        if let Err(err) = stream.close().await {
                            debug!(error = %err, "Error closing realtime socket");
                        }
                        shared.set_state(ConnectionState::Closed);
                        info!(endpoint = ?shared.endpoint, "Realtime channel closed");
                        return;
                    }
                    SessionEnd::Dropped => {
                        shared.set_state(ConnectionState::Closed);
                        warn!(endpoint = ?shared.endpoint, "Realtime connection lost");
                    }
                }
            }
            Err(err) => {
                shared.set_state(ConnectionState::Closed);
                warn!(endpoint = ?shared.endpoint, error = %err, "Realtime connect failed");
            }
        }

        // Anything queued while the socket was going down is not delivered.
        while let Ok(Command::Send { reply, .. }) = commands.try_recv() {
            let _ = reply.send(false);
        }

        if !shared.config.should_reconnect {
            return;
        }
        if shared.policy.exhausted(attempts) {
            error!(endpoint = ?shared.endpoint, attempts, "Realtime reconnect budget exhausted");
            shared.emit(RealtimeEvent::ReconnectFailed { attempts });
            return;
        }

        attempts += 1;
        let delay = shared.policy.delay(attempts);
        info!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting realtime channel"
        );
        shared.emit(RealtimeEvent::Reconnecting { attempt: attempts, delay });

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

impl ChannelShared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            trace!(state = %next, "Realtime state changed");
            self.emit(RealtimeEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: RealtimeEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Socket URL with the current access token, read fresh per attempt.
    async fn socket_url(&self) -> Result<String, RealtimeError> {
        let base = self.config.ws_base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", self.endpoint.path()))
            .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;

        match self.tokens.access_token().await {
            Ok(Some(token)) => {
                url.query_pairs_mut().append_pair(WS_TOKEN_QUERY_PARAM, &token);
            }
            Ok(None) => debug!("No access token, connecting anonymously"),
            Err(err) => warn!(error = %err, "Failed to read access token for realtime"),
        }
        Ok(url.into())
    }

    async fn session(
        &self,
        stream: &mut dyn SocketStream,
        cancel: &CancellationToken,
        commands: &mut mpsc::Receiver<Command>,
    ) -> SessionEnd {
        let mut heartbeat = heartbeat_ticker(self.config.heartbeat_interval());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Disconnected,
                frame = stream.next_frame() => match frame {
                    Some(Ok(SocketFrame::Text(text))) => self.handle_text(&text),
                    Some(Ok(SocketFrame::Binary(bytes))) => {
                        trace!(len = bytes.len(), "Ignoring binary realtime frame");
                    }
                    Some(Ok(SocketFrame::Close(reason))) => {
                        let reason = reason.as_deref().unwrap_or("");
                        debug!(reason, "Server closed realtime socket");
                        return SessionEnd::Dropped;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "Realtime receive failed");
                        return SessionEnd::Dropped;
                    }
                    None => return SessionEnd::Dropped,
                },
                Some(command) = commands.recv() => {
                    let Command::Send { text, reply } = command;
                    let written = match stream.send_text(text).await {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(error = %err, "Realtime send failed");
                            false
                        }
                    };
                    let _ = reply.send(written);
                }
                () = next_heartbeat(&mut heartbeat) => {
                    match OutboundMessage::ping().to_text() {
                        Ok(ping) => {
                            if let Err(err) = stream.send_text(ping).await {
                                warn!(error = %err, "Heartbeat send failed");
                            }
                        }
                        Err(err) => warn!(error = %err, "Failed to encode heartbeat"),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Pong) => trace!("Heartbeat acknowledged"),
            Ok(message) => {
                if self.registry.dispatch(&message) == 0 {
                    trace!(kind = ?message.kind(), "No subscribers for realtime message");
                }
            }
            Err(err) => warn!(error = %err, "Dropping realtime frame"),
        }
    }
}

/// Ping ticker for one session; a zero period turns the heartbeat off.
fn heartbeat_ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_heartbeat(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use rentline_core::testing::{MockSocketConnector, MockSocketPeer};
    use rentline_domain::TokenPair;
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::storage::MemoryTokenStore;

    fn config() -> RealtimeConfig {
        RealtimeConfig { ws_base_url: "ws://rt.test".to_string(), ..RealtimeConfig::default() }
    }

    fn chat_room() -> ChannelEndpoint {
        ChannelEndpoint::Chat { room: "42".to_string() }
    }

    fn channel_with(
        config: RealtimeConfig,
        tokens: MemoryTokenStore,
    ) -> (
        RealtimeChannel,
        Arc<MockSocketConnector>,
        UnboundedReceiver<MockSocketPeer>,
        Arc<MemoryTokenStore>,
    ) {
        let (connector, accepted) = MockSocketConnector::new();
        let connector = Arc::new(connector);
        let tokens = Arc::new(tokens);
        let channel = RealtimeChannel::new(chat_room(), config, connector.clone(), tokens.clone());
        (channel, connector, accepted, tokens)
    }

    async fn wait_for_state(channel: &RealtimeChannel, state: ConnectionState) {
        let mut watch = channel.watch_state();
        watch.wait_for(|current| *current == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_passes_token_and_opens() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::with_tokens(TokenPair::new("abc123", None)));
        assert_eq!(channel.state(), ConnectionState::Closed);

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        assert_eq!(peer.url(), "ws://rt.test/ws/chat/42/?token=abc123");
        assert!(channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_frames_reach_typed_subscribers() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.on_chat(move |chat| {
            let _ = tx.send(chat.clone());
        });

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        assert_eq!(peer.url(), "ws://rt.test/ws/chat/42/");

        peer.send_text(
            r#"{"type":"chat_message","data":{"message":"Rent is due"},"sender":"owner-1"}"#,
        );
        let chat = rx.recv().await.unwrap();
        assert_eq!(chat.message, "Rent is due");
        assert_eq!(chat.sender.as_deref(), Some("owner-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_unknown_and_malformed_frames_are_dropped() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = channel.on_message(move |envelope| {
            let _ = tx.send(envelope.data.clone());
        });

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        peer.send_text(r#"{"type":"pong"}"#);
        peer.send_text(r#"{"type":"weather","data":{}}"#);
        peer.send_text("{not json");
        peer.send_text(r#"{"type":"message","data":{"seq":1}}"#);

        let data = rx.recv().await.unwrap();
        assert_eq!(data["seq"], 1);
        assert!(rx.try_recv().is_err());
        assert!(channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_every_interval() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        channel.connect();
        let peer = accepted.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(29_000)).await;
        assert!(peer.sent().is_empty());

        tokio::time::sleep(Duration::from_millis(32_000)).await;
        let sent = peer.sent();
        assert_eq!(sent.len(), 2);
        for frame in sent {
            let value: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "ping");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_interval_disables_pings() {
        let config = RealtimeConfig { heartbeat_interval_ms: 0, ..config() };
        let (channel, connector, mut accepted, _tokens) =
            channel_with(config, MemoryTokenStore::new());
        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(peer.sent().is_empty());
        assert!(channel.send(&OutboundMessage::chat("still here")).await);
        assert_eq!(peer.sent().len(), 1);

        drop(peer);
        let _peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;
        assert_eq!(connector.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open_channel() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        assert!(!channel.send(&OutboundMessage::chat("hello")).await);

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        assert!(channel.send(&OutboundMessage::chat("hello")).await);
        let sent = peer.sent();
        assert_eq!(sent.len(), 1);
        let value: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["data"]["message"], "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_then_terminal_failure() {
        let (channel, connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        let mut events = channel.events();

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        connector.set_refuse(true);
        drop(peer);

        let mut delays = Vec::new();
        loop {
            match events.recv().await.unwrap() {
                RealtimeEvent::Reconnecting { attempt, delay } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay.as_secs());
                }
                RealtimeEvent::ReconnectFailed { attempts } => {
                    assert_eq!(attempts, 5);
                    break;
                }
                RealtimeEvent::StateChanged(_) => {}
            }
        }

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(connector.attempts().len(), 6);
        assert_eq!(channel.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_reads_fresh_token() {
        let (channel, _connector, mut accepted, tokens) =
            channel_with(config(), MemoryTokenStore::with_tokens(TokenPair::new("first", None)));

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        assert!(peer.url().ends_with("token=first"));

        tokens.store(&TokenPair::new("second", None)).await.unwrap();
        drop(peer);

        let peer = accepted.recv().await.unwrap();
        assert!(peer.url().ends_with("token=second"));
        wait_for_state(&channel, ConnectionState::Open).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_and_stops_reconnecting() {
        let (channel, connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        let mut events = channel.events();

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        channel.disconnect().await;
        assert!(peer.closed_by_client());
        assert_eq!(channel.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 1);

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RealtimeEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Open,
                ConnectionState::Closing,
                ConnectionState::Closed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnect_when_disabled() {
        let config = RealtimeConfig { should_reconnect: false, ..config() };
        let (channel, connector, mut accepted, _tokens) =
            channel_with(config, MemoryTokenStore::new());

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        wait_for_state(&channel, ConnectionState::Open).await;

        drop(peer);
        wait_for_state(&channel, ConnectionState::Closed).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert!(!channel.send(&OutboundMessage::ping()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscription_is_not_called() {
        let (channel, _connector, mut accepted, _tokens) =
            channel_with(config(), MemoryTokenStore::new());
        let (dropped_tx, mut dropped_rx) = mpsc::unbounded_channel();
        let (kept_tx, mut kept_rx) = mpsc::unbounded_channel();

        let dropped = channel.on_presence(move |presence| {
            let _ = dropped_tx.send(presence.clone());
        });
        let _kept = channel.on_presence(move |presence| {
            let _ = kept_tx.send(presence.clone());
        });
        drop(dropped);

        channel.connect();
        let peer = accepted.recv().await.unwrap();
        peer.send_text(r#"{"type":"presence","data":{"user":"tenant-3","status":"online"}}"#);

        assert_eq!(kept_rx.recv().await.unwrap().user, "tenant-3");
        assert!(dropped_rx.try_recv().is_err());
    }
}
