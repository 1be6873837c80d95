// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

#![allow(dead_code)]

use flight_search_core::store::{FavoriteRoute, FavoriteStore, MemoryFavoriteStore, StoreError};
use flight_search_core::{Airport, AirportCatalog, CatalogError, SuggestionSource};
use futures::future::BoxFuture;
use simplelog::{Config, LevelFilter, TestLogger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

pub fn catalog() -> AirportCatalog {
    AirportCatalog::from_airports(vec![
        Airport::new("JFK", "John F Kennedy International", 62_000_000),
        Airport::new("LAX", "Los Angeles International", 88_000_000),
        Airport::new("LAS", "Harry Reid International", 52_000_000),
        Airport::new("ABQ", "Albuquerque Sunport", 5_000_000),
        Airport::new("ATL", "Hartsfield-Jackson Atlanta", 104_000_000),
        Airport::new("OPO", "Francisco Sá Carneiro Airport", 5_053_134),
    ])
    .unwrap()
}

/// Catalog-backed suggestion source with per-query delays, injected failures and a
/// call log.
pub struct ScriptedSource {
    catalog: AirportCatalog,
    delays: Mutex<HashMap<String, Duration>>,
    failures: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(catalog: AirportCatalog) -> Self {
        Self {
            catalog,
            delays: Mutex::new(HashMap::new()),
            failures: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn delay(&self, query: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(query.to_string(), delay);
    }

    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SuggestionSource for ScriptedSource {
    fn suggest<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Airport>, CatalogError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(query.to_string());
            let delay = self.delays.lock().unwrap().get(query).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let fail = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(CatalogError::Unavailable("scripted failure".into()));
            }
            Ok(self.catalog.search(query))
        })
    }
}

/// In-memory store with a write delay, injected failures and concurrency tracking.
pub struct FlakyStore {
    pub inner: MemoryFavoriteStore,
    delay: Mutex<Duration>,
    hang: AtomicBool,
    fail_writes: AtomicU32,
    writes: AtomicU32,
    active: AtomicU32,
    max_active: AtomicU32,
    per_key: Mutex<HashMap<(String, String), u32>>,
    max_per_key: AtomicU32,
}

struct Tracked<'a> {
    store: &'a FlakyStore,
    key: (String, String),
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.store.active.fetch_sub(1, Ordering::SeqCst);
        let mut per_key = self.store.per_key.lock().unwrap();
        if let Some(n) = per_key.get_mut(&self.key) {
            *n -= 1;
        }
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryFavoriteStore::new(),
            delay: Mutex::new(Duration::ZERO),
            hang: AtomicBool::new(false),
            fail_writes: AtomicU32::new(0),
            writes: AtomicU32::new(0),
            active: AtomicU32::new(0),
            max_active: AtomicU32::new(0),
            per_key: Mutex::new(HashMap::new()),
            max_per_key: AtomicU32::new(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        let store = Self::new();
        *store.delay.lock().unwrap() = delay;
        store
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> u32 {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn max_per_key(&self) -> u32 {
        self.max_per_key.load(Ordering::SeqCst)
    }

    fn track(&self, departure: &str, destination: &str) -> Tracked<'_> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let key = (departure.to_string(), destination.to_string());
        let mut per_key = self.per_key.lock().unwrap();
        let n = per_key.entry(key.clone()).or_insert(0);
        *n += 1;
        self.max_per_key.fetch_max(*n, Ordering::SeqCst);
        drop(per_key);

        Tracked { store: self, key }
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fail = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(StoreError::Rejected("injected failure".into()));
        }
        Ok(())
    }
}

impl FavoriteStore for FlakyStore {
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<FavoriteRoute>, StoreError>> {
        self.inner.list_all()
    }

    fn insert<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<FavoriteRoute, StoreError>> {
        Box::pin(async move {
            let _tracked = self.track(departure, destination);
            self.before_write().await?;
            self.inner.insert(departure, destination).await
        })
    }

    fn delete_by_codes<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let _tracked = self.track(departure, destination);
            self.before_write().await?;
            self.inner.delete_by_codes(departure, destination).await
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<FavoriteRoute>> {
        self.inner.subscribe()
    }
}
