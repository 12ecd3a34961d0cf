//! # Message Broker
//!
//! Explicit routing table from `(scope, abstraction)` to an actor queue.
//!
//! ```text
//!  send(msg) ──► RouteTable ──┬─► (process, epfd)      ──► actor
//!                             ├─► (t1-prepare, uc)     ──► actor
//!                             ├─► (t1-prepare, ep0)    ──► actor
//!                             └─► parked[(t2-accept, ec)]  (until subscribe)
//! ```
//!
//! Messages for a route that has not subscribed yet are parked and flushed
//! in arrival order when it does. Messages for a retired scope are dropped.
//!
//! Both bookkeeping sets are bounded. At most `max_parked_routes` routes hold
//! parked traffic; parking for one more evicts the route parked longest ago.
//! At most `max_retired_scopes` retired scopes are remembered; retiring one
//! more forgets the oldest. A forgotten scope parks late traffic again, and
//! that traffic ages out through the parked-route bound.

use crate::route::{run_route, Handler, RouteKey};
use crate::{DEFAULT_MAX_PARKED_ROUTES, DEFAULT_MAX_RETIRED_SCOPES, DEFAULT_QUEUE_CAPACITY};
use parking_lot::Mutex;
use sc_telemetry::{ACTIVE_ROUTES, MESSAGES_DROPPED, MESSAGES_PARKED, MESSAGES_ROUTED};
use shared_types::{AbstractionId, Message, Scope};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// Errors from routing operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// A handler already owns the route.
    #[error("Route {route} already subscribed")]
    AlreadySubscribed { route: String },

    /// The scope was retired and accepts no new routes.
    #[error("Scope {scope} is retired")]
    Retired { scope: String },

    /// The actor queue is full.
    #[error("Queue full for route {route}")]
    QueueFull { route: String },

    /// The broker was shut down.
    #[error("Broker closed")]
    Closed,
}

/// What happened to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued on a live route.
    Enqueued,
    /// Held until the route subscribes.
    Parked,
    /// Dropped because its scope is retired.
    Dropped,
}

/// Broker sizing.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Capacity of each actor queue.
    pub queue_capacity: usize,
    /// Messages held per unsubscribed route before the oldest is dropped.
    pub max_parked_per_route: usize,
    /// Unsubscribed routes holding parked messages at once.
    pub max_parked_routes: usize,
    /// Retired scopes remembered before the oldest is forgotten.
    pub max_retired_scopes: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_parked_per_route: DEFAULT_QUEUE_CAPACITY,
            max_parked_routes: DEFAULT_MAX_PARKED_ROUTES,
            max_retired_scopes: DEFAULT_MAX_RETIRED_SCOPES,
        }
    }
}

/// Messages waiting for one route, stamped with when parking started.
struct Parked {
    since: u64,
    messages: VecDeque<Message>,
}

/// Retired scopes in retirement order, capped.
#[derive(Default)]
struct RetiredScopes {
    members: HashSet<Scope>,
    order: VecDeque<Scope>,
}

impl RetiredScopes {
    fn contains(&self, scope: &Scope) -> bool {
        self.members.contains(scope)
    }

    /// Remember `scope`, returning the scopes forgotten to stay within `capacity`.
    fn insert(&mut self, scope: Scope, capacity: usize) -> Vec<Scope> {
        if self.members.insert(scope.clone()) {
            self.order.push_back(scope);
        }
        let mut forgotten = Vec::new();
        while self.order.len() > capacity.max(1) {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                forgotten.push(oldest);
            }
        }
        forgotten
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Default)]
struct RouteTable {
    routes: HashMap<RouteKey, mpsc::Sender<Message>>,
    parked: HashMap<RouteKey, Parked>,
    parked_seq: u64,
    retired: RetiredScopes,
    cancellations: HashMap<Scope, watch::Sender<bool>>,
    closed: bool,
}

impl RouteTable {
    /// Route parked longest ago, if any.
    fn oldest_parked(&self) -> Option<RouteKey> {
        self.parked
            .iter()
            .min_by_key(|(_, parked)| parked.since)
            .map(|(key, _)| key.clone())
    }
}

/// Per-process message broker.
pub struct MessageBroker {
    table: Mutex<RouteTable>,
    config: BrokerConfig,
    messages_routed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl MessageBroker {
    /// Create a broker with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with the given sizing.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            table: Mutex::new(RouteTable::default()),
            config,
            messages_routed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Attach `handler` to `(scope, abstraction)` and spawn its actor.
    ///
    /// Parked messages for the route are delivered first, in arrival order.
    /// Must be called from within a tokio runtime.
    pub fn subscribe<H: Handler>(
        &self,
        scope: Scope,
        abstraction: AbstractionId,
        handler: H,
    ) -> Result<(), BrokerError> {
        let key = RouteKey::new(scope, abstraction);
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));

        let cancel = {
            let mut table = self.table.lock();
            if table.closed {
                return Err(BrokerError::Closed);
            }
            if table.retired.contains(&key.scope) {
                return Err(BrokerError::Retired {
                    scope: key.scope.to_string(),
                });
            }
            if table.routes.contains_key(&key) {
                return Err(BrokerError::AlreadySubscribed {
                    route: key.to_string(),
                });
            }

            if let Some(parked) = table.parked.remove(&key) {
                debug!(route = %key, count = parked.messages.len(), "Flushing parked messages");
                for message in parked.messages {
                    if sender.try_send(message).is_err() {
                        self.record_drop("queue_full");
                        warn!(route = %key, "Parked message dropped (queue full)");
                    }
                }
            }

            let cancel = table
                .cancellations
                .entry(key.scope.clone())
                .or_insert_with(|| watch::channel(false).0)
                .subscribe();
            table.routes.insert(key.clone(), sender);
            ACTIVE_ROUTES.inc();
            cancel
        };

        tokio::spawn(run_route(key, Box::new(handler), receiver, cancel));
        Ok(())
    }

    /// Route a message to its actor queue.
    pub fn send(&self, message: Message) -> Result<Delivery, BrokerError> {
        let key = RouteKey::of(&message);
        let mut table = self.table.lock();
        if table.closed {
            return Err(BrokerError::Closed);
        }

        if table.retired.contains(&key.scope) {
            debug!(route = %key, payload = message.payload.name(), "Dropped message for retired scope");
            drop(table);
            self.record_drop("retired");
            return Ok(Delivery::Dropped);
        }

        if let Some(sender) = table.routes.get(&key) {
            return match sender.try_send(message) {
                Ok(()) => {
                    self.messages_routed.fetch_add(1, Ordering::Relaxed);
                    MESSAGES_ROUTED.inc();
                    Ok(Delivery::Enqueued)
                }
                Err(mpsc::error::TrySendError::Full(message)) => {
                    error!(
                        route = %key,
                        payload = message.payload.name(),
                        "Actor queue exhausted, message dropped"
                    );
                    drop(table);
                    self.record_drop("queue_full");
                    Err(BrokerError::QueueFull {
                        route: key.to_string(),
                    })
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Actor exited; the route is being torn down.
                    table.routes.remove(&key);
                    ACTIVE_ROUTES.dec();
                    drop(table);
                    self.record_drop("closed");
                    Ok(Delivery::Dropped)
                }
            };
        }

        let mut evicted = None;
        if !table.parked.contains_key(&key)
            && table.parked.len() >= self.config.max_parked_routes.max(1)
        {
            if let Some(oldest) = table.oldest_parked() {
                evicted = table.parked.remove(&oldest).map(|p| (oldest, p.messages.len()));
            }
        }

        let limit = self.config.max_parked_per_route.max(1);
        let since = table.parked_seq;
        table.parked_seq += 1;
        let parked = table.parked.entry(key.clone()).or_insert_with(|| Parked {
            since,
            messages: VecDeque::new(),
        });
        let overflow = if parked.messages.len() >= limit {
            parked.messages.pop_front()
        } else {
            None
        };
        parked.messages.push_back(message);
        drop(table);

        MESSAGES_PARKED.inc();
        if let Some(oldest) = overflow {
            warn!(route = %key, payload = oldest.payload.name(), "Parked queue full, oldest message dropped");
            self.record_drop("parked_overflow");
        }
        if let Some((route, count)) = evicted {
            warn!(route = %route, count, "Too many parked routes, oldest route evicted");
            for _ in 0..count {
                self.record_drop("parked_overflow");
            }
        }
        Ok(Delivery::Parked)
    }

    /// Detach a single route. Its actor finishes the messages already queued.
    pub fn unsubscribe(&self, scope: &Scope, abstraction: AbstractionId) -> bool {
        let key = RouteKey::new(scope.clone(), abstraction);
        let mut table = self.table.lock();
        table.parked.remove(&key);
        let removed = table.routes.remove(&key).is_some();
        if removed {
            ACTIVE_ROUTES.dec();
            debug!(route = %key, "Route unsubscribed");
        }
        removed
    }

    /// Stop every actor of `scope` after its current message and drop all
    /// later traffic for it. Returns the number of routes removed.
    pub fn retire_scope(&self, scope: &Scope) -> usize {
        let mut table = self.table.lock();
        let capacity = self.config.max_retired_scopes;
        for forgotten in table.retired.insert(scope.clone(), capacity) {
            debug!(scope = %forgotten, "Retired scope forgotten");
        }
        table.parked.retain(|key, _| key.scope != *scope);

        let before = table.routes.len();
        table.routes.retain(|key, _| key.scope != *scope);
        let removed = before - table.routes.len();
        ACTIVE_ROUTES.sub(removed as i64);

        if let Some(cancel) = table.cancellations.remove(scope) {
            cancel.send_replace(true);
        }
        debug!(scope = %scope, routes = removed, "Scope retired");
        removed
    }

    /// Whether `scope` was retired.
    pub fn is_retired(&self, scope: &Scope) -> bool {
        self.table.lock().retired.contains(scope)
    }

    /// Whether a handler owns `(scope, abstraction)`.
    pub fn is_subscribed(&self, scope: &Scope, abstraction: AbstractionId) -> bool {
        self.table
            .lock()
            .routes
            .contains_key(&RouteKey::new(scope.clone(), abstraction))
    }

    /// Scopes that currently have a live route for `abstraction`.
    pub fn scopes_with(&self, abstraction: AbstractionId) -> Vec<Scope> {
        self.table
            .lock()
            .routes
            .keys()
            .filter(|key| key.abstraction == abstraction)
            .map(|key| key.scope.clone())
            .collect()
    }

    /// Messages waiting for `(scope, abstraction)` to subscribe.
    pub fn parked_count(&self, scope: &Scope, abstraction: AbstractionId) -> usize {
        self.table
            .lock()
            .parked
            .get(&RouteKey::new(scope.clone(), abstraction))
            .map_or(0, |parked| parked.messages.len())
    }

    /// Routes currently holding parked messages.
    pub fn parked_routes(&self) -> usize {
        self.table.lock().parked.len()
    }

    /// Retired scopes currently remembered.
    pub fn retired_scopes(&self) -> usize {
        self.table.lock().retired.len()
    }

    /// Stop every actor and refuse further traffic.
    pub fn shutdown(&self) {
        let mut table = self.table.lock();
        table.closed = true;
        ACTIVE_ROUTES.sub(table.routes.len() as i64);
        table.routes.clear();
        table.parked.clear();
        for (_, cancel) in table.cancellations.drain() {
            cancel.send_replace(true);
        }
        debug!("Broker shut down");
    }

    /// Total messages enqueued on live routes.
    pub fn messages_routed(&self) -> u64 {
        self.messages_routed.load(Ordering::Relaxed)
    }

    /// Total messages dropped.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, reason: &str) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        MESSAGES_DROPPED.with_label_values(&[reason]).inc();
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new()
    }
}
