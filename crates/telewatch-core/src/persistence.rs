// ── View persistence ──
//
// Encodes the dashboard's `ViewState` into a compact URL-safe token and
// back, debounces writes, and guards against re-reading its own writes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as TOKEN_ENGINE;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dashboard::ViewState;
use crate::error::CoreError;

// ── Token codec ──────────────────────────────────────────────────────

/// Serialize `{layout, content, cardType, cardTitle}` to a token:
/// unpadded URL-safe base64 of the JSON.
pub fn encode(view: &ViewState) -> Result<String, CoreError> {
    let json = serde_json::to_vec(view)
        .map_err(|e| CoreError::Internal(format!("cannot serialize view: {e}")))?;
    Ok(TOKEN_ENGINE.encode(json))
}

/// Inverse of [`encode`]. Missing fields take their empty defaults.
///
/// Also accepts a bare JSON object (optionally behind a leading `#`), the
/// form older location hashes carry.
pub fn decode(token: &str) -> Result<ViewState, CoreError> {
    let token = token.trim();
    let token = token.strip_prefix('#').unwrap_or(token);
    if token.is_empty() {
        return Err(CoreError::MalformedToken {
            reason: "empty token".into(),
        });
    }

    let json = if token.starts_with('{') {
        token.as_bytes().to_vec()
    } else {
        TOKEN_ENGINE
            .decode(token.trim_end_matches('='))
            .map_err(|e| CoreError::MalformedToken {
                reason: format!("not base64: {e}"),
            })?
    };

    serde_json::from_slice(&json).map_err(|e| CoreError::MalformedToken {
        reason: format!("invalid view JSON: {e}"),
    })
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Where the token lives outside the engine (a file, a location hash).
pub trait TokenSink: Send + Sync {
    /// The current external token; `None` when there is none.
    fn read(&self) -> Result<Option<String>, CoreError>;

    fn write(&self, token: &str) -> Result<(), CoreError>;
}

/// In-memory sink, counting writes.
#[derive(Debug, Default)]
pub struct MemoryTokenSink {
    token: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryTokenSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Replace the token as if something outside the engine changed it.
    pub fn set_external(&self, token: impl Into<String>) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn current(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl TokenSink for MemoryTokenSink {
    fn read(&self) -> Result<Option<String>, CoreError> {
        Ok(self.current())
    }

    fn write(&self, token: &str) -> Result<(), CoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_owned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Debouncing ───────────────────────────────────────────────────────

/// Trailing-edge debounce: every `touch` pushes the deadline out to
/// `now + window`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` once, when the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Debounced token writer with a feedback-loop guard.
#[derive(Debug, Clone)]
pub struct ViewPersistence {
    debouncer: Debouncer,
    /// The token last written or accepted from outside.
    last_token: Option<String>,
}

impl ViewPersistence {
    pub fn new(window: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(window),
            last_token: None,
        }
    }

    /// A dashboard change happened; (re)start the write timer.
    pub fn note_change(&mut self, now: Instant) {
        self.debouncer.touch(now);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }

    /// Whether `token` is what this component last wrote (or adopted), so
    /// reading it back must not trigger anything.
    pub fn is_own(&self, token: &str) -> bool {
        self.last_token.as_deref() == Some(token.trim())
    }

    /// Adopt an external token without writing it back.
    pub fn accept_external(&mut self, token: &str) {
        self.debouncer.cancel();
        self.last_token = Some(token.trim().to_owned());
    }

    /// Encode and return the token if the window has elapsed.
    pub fn poll(&mut self, now: Instant, view: &ViewState) -> Option<String> {
        if self.debouncer.fire(now) {
            self.flush(view)
        } else {
            None
        }
    }

    /// Encode now, regardless of the timer. `None` if the encoding equals
    /// the last token or fails.
    pub fn flush(&mut self, view: &ViewState) -> Option<String> {
        self.debouncer.cancel();
        let token = match encode(view) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "cannot encode view");
                return None;
            }
        };
        if self.last_token.as_deref() == Some(token.as_str()) {
            debug!("view token unchanged, skipping write");
            return None;
        }
        self.last_token = Some(token.clone());
        Some(token)
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}
