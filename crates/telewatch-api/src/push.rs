//! Push channel: a bidirectional WebSocket with auto-reconnect.
//!
//! Inbound text frames are forwarded, in arrival order, through an
//! unbounded [`tokio::sync::mpsc`] channel. Frames are never dropped or
//! coalesced here; parsing is left to the consumer. Outbound
//! subscription frames go through [`PushChannel::send_frame`], which refuses
//! them unless the socket is currently [`ChannelState::Open`].
//!
//! # Example
//!
//! ```rust,ignore
//! use telewatch_api::push::{PushChannel, ReconnectConfig};
//! use telewatch_api::wire::OutboundFrame;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let url = Url::parse("ws://localhost:5004/socket")?;
//! let (channel, mut frames) = PushChannel::connect(url, ReconnectConfig::default(), CancellationToken::new(), None);
//!
//! channel.send_frame(&OutboundFrame::subscribe(vec!["sys/tg/1/ampli".into()]))?;
//! while let Some(text) = frames.recv().await {
//!     println!("{text}");
//! }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::wire::OutboundFrame;

/// Receiving half of the inbound frame stream.
pub type InboundFrames = mpsc::UnboundedReceiver<String>;

// ── ChannelState ─────────────────────────────────────────────────────

/// Lifecycle of the push channel: `Connecting → Open → {Closed, Error}`.
///
/// After `Closed` or `Error` the background task cycles back to
/// `Connecting` unless it was shut down or ran out of retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closed,
    Error,
}

impl ChannelState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// State plus the number of connections opened so far.
///
/// Watch receivers only see the latest value, so a fast
/// `Error → Connecting → Open` cycle can look like `Open → Open`;
/// a changed `connection` still marks it as a new socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub connection: u64,
}

impl ChannelStatus {
    pub fn new(state: ChannelState, connection: u64) -> Self {
        Self { state, connection }
    }

    pub fn is_open(self) -> bool {
        self.state.is_open()
    }
}

// ── FrameSink ────────────────────────────────────────────────────────

/// Anything that can carry outbound subscription frames.
pub trait FrameSink: Send + Sync {
    /// Offer one frame for sending. Fails with [`Error::ChannelUnavailable`]
    /// when the channel is not open.
    fn send_frame(&self, frame: &OutboundFrame) -> Result<(), Error>;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// Drop the handle or call [`shutdown`](Self::shutdown) to tear down the
/// background task.
pub struct PushChannel {
    outbound_tx: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ChannelStatus>,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Spawn the connection loop and return the handle plus the inbound
    /// frame receiver.
    ///
    /// The first connection attempt happens asynchronously; watch
    /// [`state_changes`](Self::state_changes) for `Open`. If `cookie` is
    /// provided it is sent as a `Cookie` header on every upgrade request.
    pub fn connect(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        cookie: Option<String>,
    ) -> (Self, InboundFrames) {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelStatus::default());

        // Dropping the handle must not cancel the caller's token.
        let cancel = cancel.child_token();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            push_loop(
                url,
                frames_tx,
                outbound_rx,
                state_tx,
                reconnect,
                task_cancel,
                cookie,
            )
            .await;
        });

        (
            Self {
                outbound_tx,
                state,
                cancel,
            },
            frames_rx,
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.state.borrow().state
    }

    /// A receiver for state changes. Intermediate states may be skipped;
    /// every new connection bumps [`ChannelStatus::connection`].
    pub fn state_changes(&self) -> watch::Receiver<ChannelStatus> {
        self.state.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl FrameSink for PushChannel {
    fn send_frame(&self, frame: &OutboundFrame) -> Result<(), Error> {
        if !self.state().is_open() {
            return Err(Error::ChannelUnavailable);
        }
        let text = frame.to_text()?;
        self.outbound_tx
            .send(text)
            .map_err(|_| Error::ChannelUnavailable)
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → pump frames → on drop, backoff → reconnect.
async fn push_loop(
    url: Url,
    frames_tx: mpsc::UnboundedSender<String>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    state_tx: watch::Sender<ChannelStatus>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    cookie: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        set_state(&state_tx, ChannelState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_pump(&url, &frames_tx, &mut outbound_rx, &state_tx, &cancel, cookie.as_deref()) => result,
        };

        if cancel.is_cancelled() || frames_tx.is_closed() {
            break;
        }

        match result {
            // Normal close or end of stream: reconnect from a clean slate.
            Ok(()) => {
                tracing::info!("push channel closed, reconnecting");
                set_state(&state_tx, ChannelState::Closed);
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "push channel error");
                set_state(&state_tx, ChannelState::Error);

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "push channel reconnection limit reached, giving up"
                        );
                        return;
                    }
                }
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    set_state(&state_tx, ChannelState::Closed);
    tracing::debug!("push channel loop exiting");
}

fn set_state(state_tx: &watch::Sender<ChannelStatus>, state: ChannelState) {
    state_tx.send_if_modified(|status| {
        let changed = status.state != state;
        status.state = state;
        changed
    });
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket connection and pump frames both ways until it
/// drops.
async fn connect_and_pump(
    url: &Url,
    frames_tx: &mpsc::UnboundedSender<String>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    state_tx: &watch::Sender<ChannelStatus>,
    cancel: &CancellationToken,
    cookie: Option<&str>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(cookie_val) = cookie {
        request = request.with_header("Cookie", cookie_val);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    // Frames offered while the socket was down belong to a stale view of
    // the listener set; the consumer resubscribes on `Open`.
    let mut stale = 0usize;
    while outbound_rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        tracing::debug!(stale, "discarded outbound frames queued before connect");
    }

    state_tx.send_modify(|status| {
        status.state = ChannelState::Open;
        status.connection = status.connection.saturating_add(1);
    });
    tracing::info!(connection = state_tx.borrow().connection, "push channel open");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else {
                    // Every handle is gone.
                    return Ok(());
                };
                tracing::trace!(frame = %text, "push channel send");
                write
                    .send(tungstenite::Message::Text(text.into()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if frames_tx.send(text.as_str().to_owned()).is_err() {
                            return Ok(());
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("push channel ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return close_outcome(frame.as_ref());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("push channel stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

/// A normal (or bare) close ends the connection cleanly; any other code
/// counts as a failure for backoff purposes.
fn close_outcome(frame: Option<&CloseFrame>) -> Result<(), Error> {
    let Some(cf) = frame else {
        tracing::info!("push channel close frame received (no payload)");
        return Ok(());
    };
    tracing::info!(code = %cf.code, reason = %cf.reason, "push channel close frame received");
    if cf.code == CloseCode::Normal {
        Ok(())
    } else {
        Err(Error::WebSocketClosed {
            code: u16::from(cf.code),
            reason: cf.reason.to_string(),
        })
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let config = ReconnectConfig::default();
        let d = calculate_backoff(u32::MAX, &config);
        assert!(d <= Duration::from_secs_f64(30.0 * 1.25));
    }

    #[test]
    fn only_open_is_open() {
        assert!(ChannelState::Open.is_open());
        assert!(!ChannelState::Connecting.is_open());
        assert!(!ChannelState::Closed.is_open());
        assert!(!ChannelState::Error.is_open());
    }

    #[test]
    fn abnormal_close_is_an_error() {
        assert!(close_outcome(None).is_ok());
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert!(close_outcome(Some(&normal)).is_ok());

        let restart = CloseFrame {
            code: CloseCode::Restart,
            reason: "server restarting".into(),
        };
        let err = close_outcome(Some(&restart)).expect_err("restart is not a clean close");
        assert!(matches!(
            err,
            Error::WebSocketClosed { code: 1012, ref reason } if reason == "server restarting"
        ));
        assert_eq!(err.to_string(), "WebSocket closed (code 1012): server restarting");
    }

    #[test]
    fn new_connection_is_distinguishable_from_staying_open() {
        let (tx, mut rx) = watch::channel(ChannelStatus::default());
        tx.send_modify(|s| {
            s.state = ChannelState::Open;
            s.connection += 1;
        });
        let first = *rx.borrow_and_update();

        // Error and Connecting are overwritten before anyone looks.
        set_state(&tx, ChannelState::Error);
        set_state(&tx, ChannelState::Connecting);
        tx.send_modify(|s| {
            s.state = ChannelState::Open;
            s.connection += 1;
        });
        assert!(rx.has_changed().expect("sender alive"));
        let second = *rx.borrow_and_update();
        assert_eq!(first.state, second.state);
        assert_ne!(first, second);
        assert_eq!(second, ChannelStatus::new(ChannelState::Open, 2));
    }

    #[tokio::test]
    async fn send_refused_until_open() {
        // Nothing listens on port 9; the channel never reaches `Open`.
        let url = Url::parse("ws://127.0.0.1:9/socket").expect("valid url");
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            max_retries: Some(0),
        };
        let (channel, _frames) = PushChannel::connect(url, reconnect, CancellationToken::new(), None);

        let err = channel
            .send_frame(&OutboundFrame::subscribe(vec!["a/b".into()]))
            .expect_err("channel is not open");
        assert!(matches!(err, Error::ChannelUnavailable));
        channel.shutdown();
    }
}
