// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Durable favorite-route records.
//!
//! A [`FavoriteStore`] is the only thing that touches persistence. Each insert or
//! delete is atomic on its own; ordering between calls for the same route is the
//! synchronizer's job. Stores announce changes they did not make through their own
//! insert/delete calls (initial load, reloads, external edits) on a broadcast
//! channel carrying the complete record list.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

const NOTIFY_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRoute {
    pub id: u64,
    pub departure_code: String,
    pub destination_code: String,
}

impl FavoriteRoute {
    fn same_route(&self, departure: &str, destination: &str) -> bool {
        self.departure_code == departure && self.destination_code == destination
    }
}

/// Equality ignores the surrogate id.
impl PartialEq for FavoriteRoute {
    fn eq(&self, other: &Self) -> bool {
        self.same_route(&other.departure_code, &other.destination_code)
    }
}

impl Eq for FavoriteRoute {}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store rejected write: {0}")]
    Rejected(String),
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub trait FavoriteStore: Send + Sync {
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<FavoriteRoute>, StoreError>>;

    /// Inserts the route, returning the existing record if it is already stored.
    fn insert<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<FavoriteRoute, StoreError>>;

    /// Deletes the route. Deleting a route that is not stored succeeds.
    fn delete_by_codes<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn subscribe(&self) -> broadcast::Receiver<Vec<FavoriteRoute>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FavoriteFile {
    #[serde(default)]
    next_id: u64,
    routes: Vec<FavoriteRoute>,
}

impl FavoriteFile {
    fn position(&self, departure: &str, destination: &str) -> Option<usize> {
        self.routes
            .iter()
            .position(|r| r.same_route(departure, destination))
    }

    fn allocate(&mut self, departure: &str, destination: &str) -> FavoriteRoute {
        self.next_id = self
            .next_id
            .max(self.routes.iter().map(|r| r.id).max().unwrap_or(0))
            + 1;
        FavoriteRoute {
            id: self.next_id,
            departure_code: departure.to_string(),
            destination_code: destination.to_string(),
        }
    }
}

/// Favorites kept in a JSON file, rewritten atomically on every change.
///
/// Each insert or delete runs on its own task and only replaces the in-memory copy
/// after the file is written, so a caller that stops waiting cannot leave memory and
/// disk disagreeing.
pub struct JsonFavoriteStore {
    shared: Arc<JsonFile>,
    notify: broadcast::Sender<Vec<FavoriteRoute>>,
}

struct JsonFile {
    path: PathBuf,
    file: tokio::sync::Mutex<FavoriteFile>,
}

impl JsonFile {
    async fn read(path: &Path) -> Result<FavoriteFile, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FavoriteFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, file: &FavoriteFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn insert(&self, departure: &str, destination: &str) -> Result<FavoriteRoute, StoreError> {
        let mut file = self.file.lock().await;
        if let Some(idx) = file.position(departure, destination) {
            return Ok(file.routes[idx].clone());
        }

        let mut next = file.clone();
        let route = next.allocate(departure, destination);
        next.routes.push(route.clone());
        self.persist(&next).await?;
        *file = next;
        Ok(route)
    }

    async fn delete(&self, departure: &str, destination: &str) -> Result<(), StoreError> {
        let mut file = self.file.lock().await;
        let Some(idx) = file.position(departure, destination) else {
            return Ok(());
        };

        let mut next = file.clone();
        next.routes.remove(idx);
        self.persist(&next).await?;
        *file = next;
        Ok(())
    }
}

impl JsonFavoriteStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = JsonFile::read(&path).await?;
        log::info!(
            "[Store] Opened favorites — path={} count={}",
            path.display(),
            file.routes.len()
        );
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self {
            shared: Arc::new(JsonFile {
                path,
                file: tokio::sync::Mutex::new(file),
            }),
            notify,
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Re-reads the file (e.g. after another process edited it) and announces the result.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let mut file = self.shared.file.lock().await;
        *file = JsonFile::read(&self.shared.path).await?;
        log::debug!("[Store] Reloaded favorites — count={}", file.routes.len());
        let _ = self.notify.send(file.routes.clone());
        Ok(())
    }
}

impl FavoriteStore for JsonFavoriteStore {
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<FavoriteRoute>, StoreError>> {
        Box::pin(async move { Ok(self.shared.file.lock().await.routes.clone()) })
    }

    fn insert<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<FavoriteRoute, StoreError>> {
        let shared = Arc::clone(&self.shared);
        let (departure, destination) = (departure.to_string(), destination.to_string());
        Box::pin(async move {
            tokio::spawn(async move { shared.insert(&departure, &destination).await }).await?
        })
    }

    fn delete_by_codes<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let shared = Arc::clone(&self.shared);
        let (departure, destination) = (departure.to_string(), destination.to_string());
        Box::pin(async move {
            tokio::spawn(async move { shared.delete(&departure, &destination).await }).await?
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<FavoriteRoute>> {
        self.notify.subscribe()
    }
}

/// Non-durable store for ephemeral sessions and tests.
pub struct MemoryFavoriteStore {
    file: Mutex<FavoriteFile>,
    notify: broadcast::Sender<Vec<FavoriteRoute>>,
}

impl Default for MemoryFavoriteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFavoriteStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            file: Mutex::new(FavoriteFile::default()),
            notify,
        }
    }

    /// Replaces every record as an outside writer would, and announces the new set.
    pub fn replace_all<'a, I>(&self, routes: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let snapshot = {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            file.routes.clear();
            for (departure, destination) in routes {
                if file.position(departure, destination).is_none() {
                    let route = file.allocate(departure, destination);
                    file.routes.push(route);
                }
            }
            file.routes.clone()
        };
        let _ = self.notify.send(snapshot);
    }

    pub fn routes(&self) -> Vec<FavoriteRoute> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .clone()
    }
}

impl FavoriteStore for MemoryFavoriteStore {
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<FavoriteRoute>, StoreError>> {
        Box::pin(async move { Ok(self.routes()) })
    }

    fn insert<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<FavoriteRoute, StoreError>> {
        Box::pin(async move {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(idx) = file.position(departure, destination) {
                return Ok(file.routes[idx].clone());
            }
            let route = file.allocate(departure, destination);
            file.routes.push(route.clone());
            Ok(route)
        })
    }

    fn delete_by_codes<'a>(
        &'a self,
        departure: &'a str,
        destination: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(idx) = file.position(departure, destination) {
                file.routes.remove(idx);
            }
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<FavoriteRoute>> {
        self.notify.subscribe()
    }
}
