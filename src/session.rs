//! Reconnecting WebSocket session manager.
//!
//! ## Design
//! - One `SessionManager` owns at most one live socket at a time.
//! - Incoming JSON text frames fan out to registered listeners in
//!   registration order.
//! - An unexpected close (including a failed open) schedules one
//!   reconnection attempt after `3000 ms * attempt`, up to 5 attempts.
//!   A successful open resets the attempt counter.
//! - `disconnect()` marks the close as intentional and bumps the
//!   connection generation, so no stale retry timer ever fires after it.
//!
//! There is no process-wide instance: construct a manager and pass the
//! handle (it is a cheap `Clone` around an `Arc`) from the composition
//! root.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

/// Maximum number of automatic reconnection attempts after an unexpected
/// close. Once exhausted the manager goes idle until the next explicit
/// `connect`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base reconnect delay; attempt `n` waits `n * RETRY_BASE_MS`.
pub const RETRY_BASE_MS: u64 = 3_000;

/// Delay before reconnection attempt `attempt` (1-based). `None` for
/// attempt 0 or anything past the ceiling.
pub fn retry_delay(attempt: u32) -> Option<Duration> {
    if attempt == 0 || attempt > MAX_RECONNECT_ATTEMPTS {
        return None;
    }
    Some(Duration::from_millis(RETRY_BASE_MS * u64::from(attempt)))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A message callback. Receives every inbound JSON frame until its
/// [`Subscription`] is unsubscribed.
pub type Listener = Box<dyn Fn(&serde_json::Value) + Send + Sync + 'static>;

struct ListenerEntry {
    id: u64,
    callback: Listener,
}

// ---------------------------------------------------------------------------
// Session state and retry decisions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionState {
    /// Last address handed to `connect`. Retained across disconnects.
    url: Option<String>,
    /// Outbound frame queue for the live socket. `None` while closed.
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    open: bool,
    retry_attempts: u32,
    intentional_close: bool,
    /// Bumped by every explicit connect/disconnect. Stale socket tasks and
    /// retry timers compare against it and stand down on mismatch.
    generation: u64,
}

enum RetryDecision {
    Retry {
        attempt: u32,
        delay: Duration,
        url: String,
    },
    Exhausted,
    Suppressed,
}

impl SessionState {
    /// The transport reported open: clear the retry counter.
    fn note_open(&mut self) {
        self.open = true;
        self.retry_attempts = 0;
    }

    /// The socket closed (or an open attempt failed). Decide whether a
    /// reconnection attempt should be scheduled.
    fn note_closed(&mut self) -> RetryDecision {
        self.open = false;
        self.outbound = None;
        if self.intentional_close {
            return RetryDecision::Suppressed;
        }
        if self.retry_attempts >= MAX_RECONNECT_ATTEMPTS {
            return RetryDecision::Exhausted;
        }
        self.retry_attempts += 1;
        match (&self.url, retry_delay(self.retry_attempts)) {
            (Some(url), Some(delay)) => RetryDecision::Retry {
                attempt: self.retry_attempts,
                delay,
                url: url.clone(),
            },
            _ => RetryDecision::Suppressed,
        }
    }
}

struct Inner {
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<Arc<ListenerEntry>>>,
    next_listener_id: AtomicU64,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns one WebSocket connection and its reconnection policy.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create an empty session: no address, no socket, no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect to `address`, closing any existing connection first.
    ///
    /// Resolves `true` once the transport reports open (which also resets
    /// the retry counter). A failed attempt is logged rather than returned
    /// as an error, resolves `false`, and feeds the same bounded retry
    /// path as an unexpected close.
    pub async fn connect(&self, address: impl Into<String>) -> bool {
        let url = address.into();
        let generation = {
            let mut st = self.state();
            st.intentional_close = false;
            st.open = false;
            // Dropping the old sender ends the old write loop, which closes
            // the old socket gracefully.
            st.outbound = None;
            st.url = Some(url.clone());
            st.generation = st.generation.wrapping_add(1);
            st.generation
        };
        self.open_socket(url, generation).await
    }

    /// Serialize `payload` to JSON text and transmit it if the connection
    /// is currently open. Returns whether the send was attempted; messages
    /// sent while closed are dropped, never queued.
    pub fn send<T: Serialize>(&self, payload: &T) -> bool {
        let st = self.state();
        if !st.open {
            warn!("send called while websocket is not open, dropping message");
            return false;
        }
        let Some(tx) = st.outbound.as_ref() else {
            return false;
        };
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "failed to serialize outbound message");
                return false;
            }
        };
        tx.send(WsMessage::Text(text)).is_ok()
    }

    /// Register `callback` for every subsequent inbound message. Messages
    /// already delivered are not replayed.
    ///
    /// The returned [`Subscription`] removes exactly this callback when
    /// unsubscribed. Entries for guards that are dropped without
    /// unsubscribing stay registered — releasing them is the caller's
    /// obligation.
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push(Arc::new(ListenerEntry {
                id,
                callback: Box::new(callback),
            }));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Close the active connection, if any. Listeners and the stored
    /// address are retained; no automatic retry follows an explicit
    /// disconnect.
    pub fn disconnect(&self) {
        let mut st = self.state();
        st.intentional_close = true;
        st.generation = st.generation.wrapping_add(1);
        st.open = false;
        if st.outbound.take().is_some() {
            info!("websocket disconnected by request");
        }
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.state().open
    }

    /// The address last handed to `connect`, if any.
    pub fn address(&self) -> Option<String> {
        self.state().url.clone()
    }

    /// Reconnection attempts made since the last successful open.
    pub fn retry_attempts(&self) -> u32 {
        self.state().retry_attempts
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Socket lifecycle
    // -----------------------------------------------------------------------

    async fn open_socket(&self, url: String, generation: u64) -> bool {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
                {
                    let mut st = self.state();
                    // A newer connect or disconnect superseded this attempt
                    // while the handshake was in flight; dropping the stream
                    // here closes the socket.
                    if st.generation != generation {
                        return false;
                    }
                    st.outbound = Some(tx);
                    st.note_open();
                }
                info!(url = %url, "websocket connected");
                let (sink, source) = stream.split();
                tokio::spawn(write_loop(rx, sink));
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.read_loop(source, generation).await;
                });
                true
            }
            Err(err) => {
                error!(url = %url, error = %err, "websocket connect failed");
                self.after_close(generation);
                false
            }
        }
    }

    async fn read_loop(self, mut source: SplitStream<WsStream>, generation: u64) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text)
                {
                    Ok(value) => self.dispatch(&value),
                    Err(err) => {
                        warn!(error = %err, "discarding inbound frame that is not valid JSON");
                    }
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {} // binary / ping / pong frames are ignored
                Err(err) => {
                    warn!(error = %err, "websocket read error");
                    break;
                }
            }
        }
        self.after_close(generation);
    }

    /// Deliver one inbound message to every listener, in registration
    /// order. The registry snapshot is taken up front so a callback may
    /// register or unsubscribe listeners without deadlocking; such changes
    /// take effect from the next message.
    fn dispatch(&self, value: &serde_json::Value) {
        let snapshot: Vec<Arc<ListenerEntry>> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for entry in &snapshot {
            (entry.callback)(value);
        }
    }

    /// Shared close path for read-loop exits and failed opens. Stale
    /// generations (superseded by a newer connect/disconnect) are ignored.
    fn after_close(&self, generation: u64) {
        let decision = {
            let mut st = self.state();
            if st.generation != generation {
                return;
            }
            st.note_closed()
        };
        match decision {
            RetryDecision::Retry {
                attempt,
                delay,
                url,
            } => {
                warn!(
                    attempt,
                    max = MAX_RECONNECT_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    "websocket closed unexpectedly, scheduling reconnect"
                );
                let manager = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    {
                        let st = manager.state();
                        if st.generation != generation || st.intentional_close {
                            return;
                        }
                    }
                    manager.open_socket(url, generation).await;
                });
            }
            RetryDecision::Exhausted => {
                info!(
                    max = MAX_RECONNECT_ATTEMPTS,
                    "reconnect ceiling reached, session idle until next explicit connect"
                );
            }
            RetryDecision::Suppressed => {}
        }
    }
}

async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    mut sink: SplitSink<WsStream, WsMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            break;
        }
    }
    // Sender dropped or sink failed: close the socket gracefully.
    let _ = sink.close().await;
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle returned by [`SessionManager::add_listener`]. Calling
/// [`unsubscribe`](Subscription::unsubscribe) removes exactly the listener
/// it was created for, leaving every other listener — registered before or
/// after — untouched.
///
/// Dropping the handle without calling `unsubscribe` leaves the listener
/// registered for the life of the manager.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.retain(|entry| entry.id != self.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::AtomicUsize;

    // -- retry_delay ---------------------------------------------------------

    #[rstest]
    #[case(1, 3_000)]
    #[case(2, 6_000)]
    #[case(3, 9_000)]
    #[case(4, 12_000)]
    #[case(5, 15_000)]
    fn test_retry_delay_linear_sequence(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(
            retry_delay(attempt),
            Some(Duration::from_millis(expected_ms))
        );
    }

    #[test]
    fn test_retry_delay_none_past_ceiling() {
        assert!(retry_delay(6).is_none());
        assert!(retry_delay(100).is_none());
    }

    #[test]
    fn test_retry_delay_none_for_attempt_zero() {
        assert!(retry_delay(0).is_none());
    }

    // -- SessionState transitions --------------------------------------------

    fn closed_state(url: &str) -> SessionState {
        SessionState {
            url: Some(url.to_string()),
            ..SessionState::default()
        }
    }

    #[test]
    fn test_note_closed_schedules_first_attempt_at_3000ms() {
        let mut st = closed_state("ws://host/ws/1");
        match st.note_closed() {
            RetryDecision::Retry {
                attempt,
                delay,
                url,
            } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(3_000));
                assert_eq!(url, "ws://host/ws/1");
            }
            _ => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_note_closed_increments_through_the_full_sequence() {
        let mut st = closed_state("ws://host/ws/1");
        let mut delays = Vec::new();
        loop {
            match st.note_closed() {
                RetryDecision::Retry { delay, .. } => delays.push(delay.as_millis() as u64),
                RetryDecision::Exhausted => break,
                RetryDecision::Suppressed => panic!("unexpected suppression"),
            }
        }
        assert_eq!(delays, vec![3_000, 6_000, 9_000, 12_000, 15_000]);
    }

    #[test]
    fn test_note_closed_exhausted_after_ceiling() {
        let mut st = closed_state("ws://host/ws/1");
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(matches!(st.note_closed(), RetryDecision::Retry { .. }));
        }
        assert!(matches!(st.note_closed(), RetryDecision::Exhausted));
        // Stays exhausted on further closes.
        assert!(matches!(st.note_closed(), RetryDecision::Exhausted));
    }

    #[test]
    fn test_note_open_resets_counter_so_next_close_is_attempt_one() {
        let mut st = closed_state("ws://host/ws/1");
        // Five consecutive failed opens.
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(matches!(st.note_closed(), RetryDecision::Retry { .. }));
        }
        // One success.
        st.note_open();
        assert_eq!(st.retry_attempts, 0);
        // A sixth unexpected close schedules attempt #1 again, not #6.
        match st.note_closed() {
            RetryDecision::Retry { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(3_000));
            }
            _ => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_note_closed_suppressed_after_intentional_close() {
        let mut st = closed_state("ws://host/ws/1");
        st.intentional_close = true;
        assert!(matches!(st.note_closed(), RetryDecision::Suppressed));
        assert_eq!(st.retry_attempts, 0);
    }

    #[test]
    fn test_note_closed_without_url_is_suppressed() {
        let mut st = SessionState::default();
        assert!(matches!(st.note_closed(), RetryDecision::Suppressed));
    }

    // -- send before connect -------------------------------------------------

    #[test]
    fn test_send_before_any_connect_returns_false() {
        let session = SessionManager::new();
        let sent = session.send(&serde_json::json!({
            "type": "message",
            "content": "hi",
        }));
        assert!(!sent);
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = SessionManager::new();
        assert!(!session.is_connected());
        assert!(session.address().is_none());
        assert_eq!(session.retry_attempts(), 0);
        assert_eq!(session.listener_count(), 0);
    }

    // -- listener registry ---------------------------------------------------

    #[test]
    fn test_add_listener_increments_count() {
        let session = SessionManager::new();
        let _a = session.add_listener(|_| {});
        let _b = session.add_listener(|_| {});
        assert_eq!(session.listener_count(), 2);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let session = SessionManager::new();
        let a = session.add_listener(|_| {});
        let _b = session.add_listener(|_| {});
        let _c = session.add_listener(|_| {});
        a.unsubscribe();
        assert_eq!(session.listener_count(), 2);
    }

    #[test]
    fn test_dropping_subscription_does_not_remove_listener() {
        let session = SessionManager::new();
        {
            let _sub = session.add_listener(|_| {});
        }
        assert_eq!(session.listener_count(), 1);
    }

    #[test]
    fn test_dispatch_delivers_in_registration_order() {
        let session = SessionManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            session.add_listener(move |_| {
                if let Ok(mut seen) = order.lock() {
                    seen.push(label);
                }
            });
        }
        session.dispatch(&serde_json::json!({"type": "system", "content": "joined"}));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_after_unsubscribe_skips_removed_listener() {
        let session = SessionManager::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = {
            let hits = Arc::clone(&hits);
            session.add_listener(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let survivor_hits = Arc::new(AtomicUsize::new(0));
        {
            let survivor_hits = Arc::clone(&survivor_hits);
            session.add_listener(move |_| {
                survivor_hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        session.dispatch(&serde_json::json!({"n": 1}));
        counted.unsubscribe();
        session.dispatch(&serde_json::json!({"n": 2}));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(survivor_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_retains_listeners_and_address() {
        let session = SessionManager::new();
        let _sub = session.add_listener(|_| {});
        {
            let mut st = session.state();
            st.url = Some("ws://host/ws/1".to_string());
        }
        session.disconnect();
        assert_eq!(session.listener_count(), 1);
        assert_eq!(session.address().as_deref(), Some("ws://host/ws/1"));
    }

    #[test]
    fn test_disconnect_sets_intentional_close() {
        let session = SessionManager::new();
        session.disconnect();
        assert!(session.state().intentional_close);
    }

    #[test]
    fn test_connect_failure_counts_as_unexpected_close() {
        // Port 9 on localhost is a discard port nothing listens on; the
        // open fails immediately and must feed the retry counter.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let session = SessionManager::new();
            let ok = session.connect("ws://127.0.0.1:9/ws/room").await;
            assert!(!ok);
            assert!(!session.is_connected());
            assert_eq!(session.retry_attempts(), 1);
        });
    }
}
