// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! In-memory favorite set kept in step with a [`FavoriteStore`].
//!
//! # Flow
//!
//! ```text
//! toggle(A, B) ──► begin: flip set, mark A-B pending, publish
//!                     │
//!                     ▼
//!              durable task ── insert / delete (timeout-bounded)
//!                     │
//!            ok ──────┴────── err / timeout / panic
//!            │                       │
//!         commit                 roll back: restore A-B, publish
//! ```
//!
//! The set lives in one mutex-guarded book that is never held across an await.
//! Readers only see published [`FavoriteSnapshot`]s. A route has at most one durable
//! write in flight; what happens to a second request is decided by
//! [`Contention`].

use crate::catalog::normalize_code;
use crate::settings::{Contention, FavoriteSettings};
use crate::store::{FavoriteRoute, FavoriteStore, StoreError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Normalized (departure, destination) pair identifying a favorite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    departure: String,
    destination: String,
}

impl RouteKey {
    pub fn new(departure: &str, destination: &str) -> Result<Self, FavoriteError> {
        let departure = normalize_code(departure).ok_or_else(|| {
            FavoriteError::InvalidInput(format!("departure code {:?}", departure))
        })?;
        let destination = normalize_code(destination).ok_or_else(|| {
            FavoriteError::InvalidInput(format!("destination code {:?}", destination))
        })?;
        if departure == destination {
            return Err(FavoriteError::InvalidInput(format!(
                "route {} starts and ends at the same airport",
                departure
            )));
        }
        Ok(Self {
            departure,
            destination,
        })
    }

    pub fn departure(&self) -> &str {
        &self.departure
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.departure, self.destination)
    }
}

/// Why a durable operation did not complete.
#[derive(Error, Debug)]
pub enum StoreFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("durable task aborted")]
    Aborted,
}

#[derive(Error, Debug)]
pub enum FavoriteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Route {0} already has a write in flight")]
    Busy(RouteKey),
    #[error("Durable write failed for {route}: {cause}")]
    DurableWriteFailed {
        route: RouteKey,
        #[source]
        cause: StoreFailure,
    },
    #[error("Failed to load favorites: {0}")]
    Load(#[source] StoreFailure),
}

/// Published, immutable view of the favorite set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteSnapshot {
    pub revision: u64,
    pub routes: Arc<BTreeSet<RouteKey>>,
    /// Routes whose durable write has not resolved yet.
    pub pending: Arc<BTreeSet<RouteKey>>,
}

impl FavoriteSnapshot {
    pub fn contains(&self, departure: &str, destination: &str) -> bool {
        RouteKey::new(departure, destination)
            .map(|key| self.routes.contains(&key))
            .unwrap_or(false)
    }

    pub fn is_pending(&self, key: &RouteKey) -> bool {
        self.pending.contains(key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteKey> {
        self.routes.iter()
    }
}

/// Lifecycle of one optimistic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Flip,
    Set(bool),
}

/// Bookkeeping for a route with an unresolved durable write.
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    ticket: u64,
    /// Membership the store last reported for the route. Restored on rollback.
    stored: bool,
}

#[derive(Debug, Default)]
struct FavoriteBook {
    routes: BTreeSet<RouteKey>,
    pending: HashMap<RouteKey, PendingWrite>,
    revision: u64,
}

impl FavoriteBook {
    fn snapshot(&self) -> FavoriteSnapshot {
        FavoriteSnapshot {
            revision: self.revision,
            routes: Arc::new(self.routes.clone()),
            pending: Arc::new(self.pending.keys().cloned().collect()),
        }
    }
}

struct Inner {
    store: Arc<dyn FavoriteStore>,
    settings: FavoriteSettings,
    book: Mutex<FavoriteBook>,
    snapshot_tx: watch::Sender<FavoriteSnapshot>,
    key_locks: Mutex<HashMap<RouteKey, Arc<tokio::sync::Mutex<()>>>>,
    next_ticket: AtomicU64,
    shutdown: CancellationToken,
}

/// An optimistic change waiting on its durable write. Resolved exactly once;
/// dropping an unresolved ticket rolls the change back.
struct ToggleTicket {
    inner: Arc<Inner>,
    key: RouteKey,
    id: u64,
    was_favorite: bool,
    state: ToggleState,
}

impl ToggleTicket {
    fn commit(mut self) {
        self.resolve(ToggleState::Committed);
    }

    fn roll_back(mut self) {
        self.resolve(ToggleState::RolledBack);
    }

    fn resolve(&mut self, outcome: ToggleState) {
        if self.state != ToggleState::Pending {
            return;
        }
        self.state = outcome;
        self.inner.settle(&self.key, self.id, outcome);
    }
}

impl Drop for ToggleTicket {
    fn drop(&mut self) {
        if self.state == ToggleState::Pending {
            log::warn!(
                "[Favorites] Unresolved write dropped, rolling back — route={}",
                self.key
            );
            self.resolve(ToggleState::RolledBack);
        }
    }
}

impl Inner {
    fn lock_book(&self) -> MutexGuard<'_, FavoriteBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, book: &mut FavoriteBook) {
        book.revision += 1;
        self.snapshot_tx.send_replace(book.snapshot());
    }

    /// Applies the optimistic change. `Ok(None)` means the route already has the
    /// requested state.
    fn begin(self: &Arc<Self>, key: RouteKey, target: Target) -> Result<Option<ToggleTicket>, FavoriteError> {
        let mut book = self.lock_book();
        if book.pending.contains_key(&key) {
            log::debug!("[Favorites] Rejecting toggle, write in flight — route={}", key);
            return Err(FavoriteError::Busy(key));
        }

        let was_favorite = book.routes.contains(&key);
        let wanted = match target {
            Target::Flip => !was_favorite,
            Target::Set(state) => state,
        };
        if wanted == was_favorite {
            return Ok(None);
        }

        if wanted {
            book.routes.insert(key.clone());
        } else {
            book.routes.remove(&key);
        }
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        book.pending.insert(
            key.clone(),
            PendingWrite {
                ticket: id,
                stored: was_favorite,
            },
        );
        self.publish(&mut book);
        log::debug!(
            "[Favorites] Optimistic update — route={} favorite={} ticket={}",
            key,
            wanted,
            id
        );

        Ok(Some(ToggleTicket {
            inner: Arc::clone(self),
            key,
            id,
            was_favorite,
            state: ToggleState::Pending,
        }))
    }

    fn settle(&self, key: &RouteKey, id: u64, outcome: ToggleState) {
        let mut book = self.lock_book();
        let write = match book.pending.get(key) {
            Some(write) if write.ticket == id => *write,
            _ => {
                log::error!(
                    "[Favorites] Ticket does not own route — route={} ticket={}",
                    key,
                    id
                );
                return;
            }
        };
        book.pending.remove(key);

        if outcome == ToggleState::RolledBack {
            if write.stored {
                book.routes.insert(key.clone());
            } else {
                book.routes.remove(key);
            }
            log::info!("[Favorites] Rolled back — route={} favorite={}", key, write.stored);
        } else {
            log::debug!("[Favorites] Committed — route={} ticket={}", key, id);
        }
        self.publish(&mut book);
    }

    /// Merges a full store listing. Routes with a pending write keep their local state;
    /// the listing only updates what a rollback would restore.
    fn apply_store_routes(&self, routes: Vec<FavoriteRoute>) {
        let mut incoming = BTreeSet::new();
        for route in routes {
            match RouteKey::new(&route.departure_code, &route.destination_code) {
                Ok(key) => {
                    incoming.insert(key);
                }
                Err(e) => log::warn!("[Favorites] Skipping stored route {} — {}", route.id, e),
            }
        }

        let mut guard = self.lock_book();
        let book = &mut *guard;
        for (key, write) in book.pending.iter_mut() {
            write.stored = incoming.contains(key);
            if book.routes.contains(key) {
                incoming.insert(key.clone());
            } else {
                incoming.remove(key);
            }
        }
        if incoming != book.routes {
            log::debug!(
                "[Favorites] Merged store listing — before={} after={}",
                book.routes.len(),
                incoming.len()
            );
            book.routes = incoming;
            self.publish(book);
        }
    }

    async fn reload(&self) -> Result<(), FavoriteError> {
        let limit = self.settings.store_timeout();
        let routes = match tokio::time::timeout(limit, self.store.list_all()).await {
            Ok(Ok(routes)) => routes,
            Ok(Err(e)) => return Err(FavoriteError::Load(e.into())),
            Err(_) => return Err(FavoriteError::Load(StoreFailure::TimedOut(limit))),
        };
        self.apply_store_routes(routes);
        Ok(())
    }

    fn key_lock(&self, key: &RouteKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn release_key_lock(&self, key: &RouteKey) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// A write that timed out may still land in the store. Re-read it once the
    /// route is settled so the set follows whatever the store ended up with.
    fn reconcile(self: &Arc<Self>, key: &RouteKey) {
        let inner = Arc::clone(self);
        let key = key.clone();
        tokio::spawn(async move {
            match inner.reload().await {
                Ok(()) => log::debug!("[Favorites] Reconciled with store — route={}", key),
                Err(e) => log::warn!("[Favorites] Reconcile failed — route={} {}", key, e),
            }
        });
    }
}

/// A queued caller's place in line for one route.
///
/// Holds the per-key lock once acquired. Dropping it releases the lock and removes
/// the map entry once no other caller holds it, so a caller that gives up while
/// waiting leaves nothing behind.
struct KeyTurn {
    inner: Arc<Inner>,
    key: RouteKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyTurn {
    fn new(inner: &Arc<Inner>, key: RouteKey) -> Self {
        Self {
            inner: Arc::clone(inner),
            key,
            guard: None,
        }
    }

    async fn acquire(&mut self) {
        let lock = self.inner.key_lock(&self.key);
        self.guard = Some(lock.lock_owned().await);
    }
}

impl Drop for KeyTurn {
    fn drop(&mut self) {
        self.guard.take();
        self.inner.release_key_lock(&self.key);
    }
}

async fn write_route(
    store: &dyn FavoriteStore,
    key: &RouteKey,
    favorite: bool,
    limit: Duration,
) -> Result<(), StoreFailure> {
    let op = async {
        if favorite {
            store
                .insert(key.departure(), key.destination())
                .await
                .map(|_| ())
        } else {
            store.delete_by_codes(key.departure(), key.destination()).await
        }
    };
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(StoreFailure::from),
        Err(_) => Err(StoreFailure::TimedOut(limit)),
    }
}

async fn listen(
    inner: Weak<Inner>,
    mut notifications: broadcast::Receiver<Vec<FavoriteRoute>>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = notifications.recv() => message,
        };
        let Some(inner) = inner.upgrade() else { break };

        match message {
            Ok(routes) => inner.apply_store_routes(routes),
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    "[Favorites] Missed store notifications, reloading — skipped={}",
                    skipped
                );
                if let Err(e) = inner.reload().await {
                    log::warn!("[Favorites] Reload after lag failed — {}", e);
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    log::debug!("[Favorites] Store listener stopped");
}

/// Owner of the in-memory favorite set. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FavoritesSynchronizer {
    inner: Arc<Inner>,
}

impl FavoritesSynchronizer {
    /// Loads the current store contents and starts following its notifications.
    pub async fn start(
        store: Arc<dyn FavoriteStore>,
        settings: FavoriteSettings,
    ) -> Result<Self, FavoriteError> {
        // Subscribe before listing so nothing between the two is missed.
        let notifications = store.subscribe();
        let (snapshot_tx, _) = watch::channel(FavoriteSnapshot::default());
        let inner = Arc::new(Inner {
            store,
            settings,
            book: Mutex::new(FavoriteBook::default()),
            snapshot_tx,
            key_locks: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        inner.reload().await?;
        log::info!(
            "[Favorites] Synchronizer started — routes={} contention={:?}",
            inner.lock_book().routes.len(),
            inner.settings.contention
        );

        tokio::spawn(listen(
            Arc::downgrade(&inner),
            notifications,
            inner.shutdown.clone(),
        ));
        Ok(Self { inner })
    }

    /// Flips a route and returns whether it is a favorite afterwards.
    ///
    /// The new state is published before the store is written; on failure the route
    /// is restored and the error is returned.
    pub async fn toggle(&self, departure: &str, destination: &str) -> Result<bool, FavoriteError> {
        let key = RouteKey::new(departure, destination)?;
        let was_favorite = self.snapshot().routes.contains(&key);
        // A flip always changes the route, so `None` cannot come back here.
        Ok(self
            .apply(key, Target::Flip)
            .await?
            .unwrap_or(!was_favorite))
    }

    /// Unfavorites a route. Returns false when it was not a favorite.
    pub async fn remove(&self, departure: &str, destination: &str) -> Result<bool, FavoriteError> {
        let key = RouteKey::new(departure, destination)?;
        Ok(self.apply(key, Target::Set(false)).await?.is_some())
    }

    pub fn is_favorite(&self, departure: &str, destination: &str) -> bool {
        self.inner
            .snapshot_tx
            .borrow()
            .contains(departure, destination)
    }

    /// Whether any favorite route ends at `code`.
    pub fn is_destination_favorited(&self, code: &str) -> bool {
        let Some(code) = normalize_code(code) else {
            return false;
        };
        self.inner
            .snapshot_tx
            .borrow()
            .iter()
            .any(|key| key.destination() == code)
    }

    pub fn snapshot(&self) -> FavoriteSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FavoriteSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Re-reads the whole store, keeping pending routes as they are.
    pub async fn reload(&self) -> Result<(), FavoriteError> {
        self.inner.reload().await
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn apply(&self, key: RouteKey, target: Target) -> Result<Option<bool>, FavoriteError> {
        match self.inner.settings.contention {
            Contention::Reject => self.run(key, target, None).await,
            Contention::Queue => {
                let mut turn = KeyTurn::new(&self.inner, key.clone());
                turn.acquire().await;
                self.run(key, target, Some(turn)).await
            }
        }
    }

    /// Runs the durable write on its own task so an abandoned caller cannot leave
    /// the route pending. `turn` is released once the write resolves.
    async fn run(
        &self,
        key: RouteKey,
        target: Target,
        turn: Option<KeyTurn>,
    ) -> Result<Option<bool>, FavoriteError> {
        let Some(ticket) = self.inner.begin(key.clone(), target)? else {
            return Ok(None);
        };
        let favorite = !ticket.was_favorite;
        let inner = Arc::clone(&self.inner);
        let limit = self.inner.settings.store_timeout();

        let handle = tokio::spawn(async move {
            let _turn = turn;
            let outcome = write_route(inner.store.as_ref(), &ticket.key, favorite, limit).await;
            match &outcome {
                Ok(()) => ticket.commit(),
                Err(e) => {
                    log::warn!("[Favorites] Durable write failed — route={} {}", ticket.key, e);
                    let key = ticket.key.clone();
                    ticket.roll_back();
                    if matches!(e, StoreFailure::TimedOut(_)) {
                        inner.reconcile(&key);
                    }
                }
            }
            outcome
        });

        match handle.await {
            Ok(Ok(())) => Ok(Some(favorite)),
            Ok(Err(cause)) => Err(FavoriteError::DurableWriteFailed { route: key, cause }),
            Err(e) => {
                log::error!("[Favorites] Durable task died — route={} {}", key, e);
                self.inner.reconcile(&key);
                Err(FavoriteError::DurableWriteFailed {
                    route: key,
                    cause: StoreFailure::Aborted,
                })
            }
        }
    }
}
