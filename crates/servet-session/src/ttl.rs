//! One-shot expiry scheduling shared by every store and the rate guard.
//!
//! A single sweeper task per registry drains a min-heap of deadlines
//! instead of arming one timer per record. Each scheduled entry gets a
//! fresh [`Ticket`]; owners keep the ticket next to their record and
//! compare it in the expiry callback, so a timer armed for an earlier
//! incarnation of a key can never remove a later one.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

type ExpiryFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type ExpiryCallback = Box<dyn FnOnce(Ticket) -> ExpiryFuture + Send + 'static>;
type Due = (String, Ticket, ExpiryCallback);

/// Rebuild the heap once stale (cancelled) entries outnumber live ones by this factor.
const COMPACT_FACTOR: usize = 2;
const COMPACT_MIN: usize = 64;

/// Longest TTL the registry will honour. Longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// `now + ttl` with `ttl` clamped to [`MAX_TTL`]. Never overflows.
pub fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.min(MAX_TTL);
    now.checked_add(ttl)
        .or_else(|| now.checked_add(MAX_TTL))
        .unwrap_or(now)
}

/// Handle to one scheduled expiry. Unique for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Pending {
    key: String,
    deadline: Instant,
    on_expire: ExpiryCallback,
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<(Instant, Ticket)>>,
    pending: HashMap<Ticket, Pending>,
    by_key: HashMap<String, Vec<Ticket>>,
    next_ticket: u64,
    closed: bool,
}

impl State {
    fn unlink(&mut self, key: &str, ticket: Ticket) {
        if let Some(tickets) = self.by_key.get_mut(key) {
            tickets.retain(|t| *t != ticket);
            if tickets.is_empty() {
                self.by_key.remove(key);
            }
        }
    }

    /// Remove every entry due at `now` and report the next deadline.
    fn take_due(&mut self, now: Instant) -> (Vec<Due>, Option<Instant>) {
        let mut due = Vec::new();

        while let Some(&Reverse((deadline, ticket))) = self.queue.peek() {
            if deadline > now {
                break;
            }
            self.queue.pop();
            if let Some(entry) = self.pending.remove(&ticket) {
                self.unlink(&entry.key, ticket);
                due.push((entry.key, ticket, entry.on_expire));
            }
        }

        if self.queue.len() > COMPACT_MIN && self.queue.len() > self.pending.len() * COMPACT_FACTOR
        {
            self.queue = self
                .pending
                .iter()
                .map(|(ticket, entry)| Reverse((entry.deadline, *ticket)))
                .collect();
        }

        let next = self.queue.peek().map(|Reverse((deadline, _))| *deadline);
        (due, next)
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Notify,
}

/// Registry of pending one-shot expiries.
///
/// Must be created inside a Tokio runtime; the sweeper task is spawned on
/// construction and stops when the registry is dropped.
pub struct TtlRegistry {
    shared: Arc<Shared>,
}

impl TtlRegistry {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Notify::new(),
        });
        tokio::spawn(sweep(Arc::clone(&shared)));
        Self { shared }
    }

    /// Arm a one-shot expiry for `key` after `ttl`, clamped to [`MAX_TTL`].
    ///
    /// Scheduling the same key again is allowed; each call gets its own
    /// ticket and fires independently unless cancelled. The callback
    /// receives the ticket it was armed under.
    pub fn schedule<F, Fut>(&self, key: &str, ttl: Duration, on_expire: F) -> Ticket
    where
        F: FnOnce(Ticket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = deadline_after(Instant::now(), ttl);
        let on_expire: ExpiryCallback =
            Box::new(move |ticket| -> ExpiryFuture { Box::pin(on_expire(ticket)) });
        let ticket = {
            let mut state = self.shared.state.lock();
            state.next_ticket += 1;
            let ticket = Ticket(state.next_ticket);
            state.queue.push(Reverse((deadline, ticket)));
            state.pending.insert(
                ticket,
                Pending {
                    key: key.to_string(),
                    deadline,
                    on_expire,
                },
            );
            state.by_key.entry(key.to_string()).or_default().push(ticket);
            ticket
        };
        self.shared.wake.notify_one();

        trace!(key = %key, %ticket, ttl_ms = ttl.as_millis() as u64, "Expiry scheduled");
        ticket
    }

    /// Disarm every pending expiry for `key`. Returns how many were disarmed.
    ///
    /// Once this returns, none of the disarmed callbacks will run.
    pub fn cancel(&self, key: &str) -> usize {
        let mut state = self.shared.state.lock();
        let Some(tickets) = state.by_key.remove(key) else {
            return 0;
        };
        tickets
            .into_iter()
            .filter(|ticket| state.pending.remove(ticket).is_some())
            .count()
    }

    /// Disarm a single expiry. Returns `false` if it already fired or was cancelled.
    pub fn cancel_ticket(&self, ticket: Ticket) -> bool {
        let mut state = self.shared.state.lock();
        match state.pending.remove(&ticket) {
            Some(entry) => {
                state.unlink(&entry.key, ticket);
                true
            }
            None => false,
        }
    }

    /// Deadline of a still-pending ticket.
    pub fn deadline(&self, ticket: Ticket) -> Option<Instant> {
        self.shared
            .state
            .lock()
            .pending
            .get(&ticket)
            .map(|entry| entry.deadline)
    }

    /// Whether any expiry is pending for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.shared.state.lock().by_key.contains_key(key)
    }

    /// Number of pending expiries.
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disarm everything and stop the sweeper.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            state.by_key.clear();
            state.queue.clear();
        }
        self.shared.wake.notify_one();
        debug!("TTL registry shut down");
    }
}

impl Default for TtlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TtlRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TtlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

async fn sweep(shared: Arc<Shared>) {
    loop {
        let (due, next) = {
            let mut state = shared.state.lock();
            if state.closed {
                return;
            }
            state.take_due(Instant::now())
        };

        for (key, ticket, on_expire) in due {
            trace!(key = %key, %ticket, "Expiry fired");
            tokio::spawn(on_expire(ticket));
        }

        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            None => shared.wake.notified().await,
        }
    }
}
