//! Per-identity request throttling.
//!
//! A fixed-window counter: the first request from an identity opens a
//! window of `decay_interval`, later requests only increment the count, and
//! once the count reaches `threshold` every further request in that window
//! is throttled. The window closes on its own via the TTL registry; a
//! window found past its end is also reset on access, so a lagging sweeper
//! never holds an identity throttled longer than the interval.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::hasher::IdentityHash;
use crate::ttl::{MAX_TTL, Ticket, TtlRegistry, deadline_after};

/// Default requests allowed per window.
pub const DEFAULT_THRESHOLD: u32 = 200;

/// Default window length.
pub const DEFAULT_DECAY_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default message returned to throttled clients.
pub const DEFAULT_DENY_MESSAGE: &str = "Too many attempts, please try again later.";

/// Rate guard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateGuardConfig {
    /// Requests allowed per window.
    pub threshold: u32,
    /// Window length, measured from the first request.
    pub decay_interval: Duration,
}

impl Default for RateGuardConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            decay_interval: DEFAULT_DECAY_INTERVAL,
        }
    }
}

impl RateGuardConfig {
    pub fn new(threshold: u32, decay_interval: Duration) -> Self {
        Self {
            threshold,
            decay_interval,
        }
    }
}

/// Result of [`RateGuard::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed.
    Allowed {
        /// Requests counted in the current window, this one included.
        count: u32,
        /// Requests left before throttling.
        remaining: u32,
    },
    /// The request must be rejected.
    Throttled {
        /// Time until the window closes.
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    /// Whole seconds until retry, rounded up. Zero when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateDecision::Allowed { .. } => 0,
            RateDecision::Throttled { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    window_end: Instant,
    ticket: Ticket,
}

struct GuardInner {
    config: RateGuardConfig,
    counters: Mutex<HashMap<IdentityHash, Counter>>,
    registry: TtlRegistry,
}

/// Fixed-window request counter keyed by identity hash.
///
/// Cheap to clone; clones share the counter table.
#[derive(Clone)]
pub struct RateGuard {
    inner: Arc<GuardInner>,
}

impl RateGuard {
    /// Create a guard. Must be called inside a Tokio runtime.
    ///
    /// A zero threshold, a zero interval or an interval above [`MAX_TTL`]
    /// is a configuration error.
    pub fn new(config: RateGuardConfig) -> Result<Self> {
        if config.threshold == 0 {
            return Err(SessionError::Configuration(
                "rate limit threshold must be at least 1".to_string(),
            ));
        }
        if config.decay_interval.is_zero() {
            return Err(SessionError::Configuration(
                "rate limit decay interval must be positive".to_string(),
            ));
        }
        if config.decay_interval > MAX_TTL {
            return Err(SessionError::Configuration(format!(
                "rate limit decay interval must be at most {}s",
                MAX_TTL.as_secs()
            )));
        }

        Ok(Self {
            inner: Arc::new(GuardInner {
                config,
                counters: Mutex::new(HashMap::new()),
                registry: TtlRegistry::new(),
            }),
        })
    }

    pub fn config(&self) -> RateGuardConfig {
        self.inner.config
    }

    /// Count a request from `address` and decide whether it may proceed.
    ///
    /// Throttled requests are not counted.
    pub fn check(&self, address: &str) -> RateDecision {
        let identity = IdentityHash::of(address);
        let threshold = self.inner.config.threshold;
        let now = Instant::now();
        let mut counters = self.inner.counters.lock();

        if let Some(counter) = counters.get_mut(&identity)
            && counter.window_end > now
        {
            if counter.count >= threshold {
                let retry_after = counter.window_end - now;
                trace!(identity = %identity, count = counter.count, "Request throttled");
                return RateDecision::Throttled { retry_after };
            }
            counter.count += 1;
            return RateDecision::Allowed {
                count: counter.count,
                remaining: threshold - counter.count,
            };
        }

        // Unseen, or a window whose decay has not been swept yet.
        if let Some(stale) = counters.remove(&identity) {
            self.inner.registry.cancel_ticket(stale.ticket);
        }
        let counter = Counter {
            count: 1,
            window_end: deadline_after(now, self.inner.config.decay_interval),
            ticket: GuardInner::arm(&self.inner, &identity),
        };
        counters.insert(identity, counter);

        RateDecision::Allowed {
            count: 1,
            remaining: threshold - 1,
        }
    }

    /// Requests counted for `address` in its current window.
    pub fn count(&self, address: &str) -> u32 {
        let identity = IdentityHash::of(address);
        let now = Instant::now();
        self.inner
            .counters
            .lock()
            .get(&identity)
            .filter(|c| c.window_end > now)
            .map_or(0, |c| c.count)
    }

    /// Number of identities with an open window.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .counters
            .lock()
            .values()
            .filter(|c| c.window_end > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every counter and stop decay timers.
    pub fn shutdown(&self) {
        self.inner.registry.shutdown();
        self.inner.counters.lock().clear();
    }
}

impl GuardInner {
    fn arm(this: &Arc<Self>, identity: &IdentityHash) -> Ticket {
        let weak: Weak<Self> = Arc::downgrade(this);
        let key = identity.clone();
        this.registry.schedule(
            identity.as_str(),
            this.config.decay_interval,
            move |ticket| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.decay(&key, ticket);
                }
            },
        )
    }

    fn decay(&self, identity: &IdentityHash, ticket: Ticket) {
        let mut counters = self.counters.lock();
        if counters.get(identity).is_some_and(|c| c.ticket == ticket) {
            counters.remove(identity);
            debug!(identity = %identity, "Rate window closed");
        }
    }
}

impl std::fmt::Debug for RateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGuard")
            .field("config", &self.inner.config)
            .field("tracked", &self.inner.counters.lock().len())
            .finish()
    }
}
