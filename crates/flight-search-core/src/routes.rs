// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Destinations reachable from a departure airport, annotated with favorite flags.
//!
//! Every catalog airport other than the departure counts as a destination, listed in
//! catalog order. The destination list is fixed when the view is created; favorite
//! flags are read from the synchronizer's latest snapshot on every call.

use crate::catalog::{Airport, AirportCatalog, CatalogError};
use crate::favorites::{FavoriteSnapshot, FavoritesSynchronizer, RouteKey};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub destination: Airport,
    pub is_favorite: bool,
}

pub struct RouteView {
    departure: Airport,
    destinations: Arc<[Airport]>,
    favorites: watch::Receiver<FavoriteSnapshot>,
}

impl RouteView {
    pub fn departure(&self) -> &Airport {
        &self.departure
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Entries annotated with the latest published favorite set.
    pub fn current(&self) -> Vec<RouteEntry> {
        let snapshot = self.favorites.borrow().clone();
        self.annotate(&snapshot)
    }

    /// Waits for the favorite set to change and returns the re-annotated entries.
    ///
    /// Returns `None` once the synchronizer is gone.
    pub async fn changed(&mut self) -> Option<Vec<RouteEntry>> {
        self.favorites.changed().await.ok()?;
        let snapshot = self.favorites.borrow_and_update().clone();
        Some(self.annotate(&snapshot))
    }

    fn annotate(&self, snapshot: &FavoriteSnapshot) -> Vec<RouteEntry> {
        self.destinations
            .iter()
            .map(|destination| RouteEntry {
                is_favorite: RouteKey::new(&self.departure.code, &destination.code)
                    .map(|key| snapshot.routes.contains(&key))
                    .unwrap_or(false),
                destination: destination.clone(),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct RouteViewCoordinator {
    catalog: Arc<AirportCatalog>,
    favorites: FavoritesSynchronizer,
}

impl RouteViewCoordinator {
    pub fn new(catalog: Arc<AirportCatalog>, favorites: FavoritesSynchronizer) -> Self {
        Self { catalog, favorites }
    }

    pub fn routes_from(&self, departure_code: &str) -> Result<RouteView, CatalogError> {
        let departure = self.catalog.lookup(departure_code)?.clone();
        let destinations: Arc<[Airport]> = self
            .catalog
            .all()
            .iter()
            .filter(|a| a.code != departure.code)
            .cloned()
            .collect();
        log::debug!(
            "[Routes] Built route view — departure={} destinations={}",
            departure.code,
            destinations.len()
        );

        Ok(RouteView {
            departure,
            destinations,
            favorites: self.favorites.subscribe(),
        })
    }
}
