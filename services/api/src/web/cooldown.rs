//! services/api/src/web/cooldown.rs
//!
//! Cookie-scoped rate-limit cooldown for the generation endpoint.
//!
//! The upstream provider enforces per-key throughput limits. When it answers
//! with a rate-limit signal, we record an attempt counter and the last
//! attempt timestamp in two session cookies; once more than
//! `MAX_ATTEMPTS_PER_WINDOW` attempts have landed inside the cooldown
//! window, further requests are rejected locally without contacting the
//! upstream at all. The state lives in client-supplied cookies, so clearing
//! cookies clears the cooldown — this is a soft throttle, carried over
//! deliberately from the observed behavior.

use chrono::Utc;

/// Rejections start after this many rate-limited attempts inside the window.
pub const MAX_ATTEMPTS_PER_WINDOW: u32 = 3;
/// Length of the cooldown window.
pub const COOLDOWN_WINDOW_MS: i64 = 60_000;
/// Lifetime of the bookkeeping cookies.
pub const COOKIE_MAX_AGE_SECS: i64 = 3600;

const ATTEMPTS_COOKIE: &str = "gen_attempts";
const LAST_ATTEMPT_COOKIE: &str = "gen_last_attempt";

/// The cooldown bookkeeping carried in the request's cookies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub attempts: u32,
    pub last_attempt_ms: i64,
}

impl CooldownState {
    /// Parses the two bookkeeping cookies out of a Cookie header. Missing or
    /// malformed cookies count as a clean slate.
    pub fn from_cookie_header(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::default();
        };
        let mut state = Self::default();
        for cookie in header.split(';') {
            let Some((name, value)) = cookie.trim().split_once('=') else {
                continue;
            };
            match name {
                ATTEMPTS_COOKIE => state.attempts = value.parse().unwrap_or(0),
                LAST_ATTEMPT_COOKIE => state.last_attempt_ms = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        state
    }

    /// Whether a request arriving at `now_ms` must be rejected locally.
    pub fn is_cooling_down(&self, now_ms: i64) -> bool {
        self.attempts > MAX_ATTEMPTS_PER_WINDOW
            && now_ms - self.last_attempt_ms < COOLDOWN_WINDOW_MS
    }

    /// Records one rate-limited attempt. Attempts outside the window reset
    /// the counter instead of accumulating forever.
    pub fn record_attempt(&self, now_ms: i64) -> Self {
        let attempts = if now_ms - self.last_attempt_ms >= COOLDOWN_WINDOW_MS {
            1
        } else {
            self.attempts + 1
        };
        Self {
            attempts,
            last_attempt_ms: now_ms,
        }
    }

    /// How many seconds remain before the window reopens.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.last_attempt_ms + COOLDOWN_WINDOW_MS - now_ms).max(0);
        (remaining_ms as u64).div_ceil(1000)
    }

    /// The two Set-Cookie values persisting this state, each expiring after
    /// one hour.
    pub fn set_cookie_values(&self) -> [String; 2] {
        [
            format!(
                "{}={}; Path=/; Max-Age={}; SameSite=Lax",
                ATTEMPTS_COOKIE, self.attempts, COOKIE_MAX_AGE_SECS
            ),
            format!(
                "{}={}; Path=/; Max-Age={}; SameSite=Lax",
                LAST_ATTEMPT_COOKIE, self.last_attempt_ms, COOKIE_MAX_AGE_SECS
            ),
        ]
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
