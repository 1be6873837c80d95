// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::catalog::{Airport, AirportCatalog, CatalogError, SuggestionSource};
use crate::favorites::{FavoriteError, FavoriteSnapshot, FavoritesSynchronizer};
use crate::routes::{RouteView, RouteViewCoordinator};
use crate::search::{SearchCoordinator, SearchSnapshot};
use crate::settings::Settings;
use crate::store::FavoriteStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Shown for a favorite whose airport is missing from the catalog.
pub const UNKNOWN_AIRPORT: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteRouteView {
    pub departure_code: String,
    pub departure_name: String,
    pub destination_code: String,
    pub destination_name: String,
}

/// Everything a front end needs: live search, favorites and route listings.
pub struct FlightSearch {
    catalog: Arc<AirportCatalog>,
    search: SearchCoordinator,
    favorites: FavoritesSynchronizer,
    routes: RouteViewCoordinator,
}

impl FlightSearch {
    /// The CSV from the settings if one is configured, otherwise the bundled dataset.
    pub fn load_catalog(settings: &Settings) -> Result<AirportCatalog, CatalogError> {
        match &settings.data.airports_csv {
            Some(path) => AirportCatalog::from_csv_path(path),
            None => AirportCatalog::bundled(),
        }
    }

    pub async fn open(
        catalog: Arc<AirportCatalog>,
        store: Arc<dyn FavoriteStore>,
        settings: &Settings,
    ) -> Result<Self, FavoriteError> {
        let source: Arc<dyn SuggestionSource> = catalog.clone();
        Self::open_with_source(catalog, source, store, settings).await
    }

    /// Like [`FlightSearch::open`] but with suggestions served by `source`.
    pub async fn open_with_source(
        catalog: Arc<AirportCatalog>,
        source: Arc<dyn SuggestionSource>,
        store: Arc<dyn FavoriteStore>,
        settings: &Settings,
    ) -> Result<Self, FavoriteError> {
        let favorites = FavoritesSynchronizer::start(store, settings.favorites.clone()).await?;
        let search = SearchCoordinator::spawn(source, settings.search.clone());
        let routes = RouteViewCoordinator::new(Arc::clone(&catalog), favorites.clone());

        Ok(Self {
            catalog,
            search,
            favorites,
            routes,
        })
    }

    pub fn set_query_text(&self, text: impl Into<String>) {
        self.search.set_query_text(text);
    }

    pub fn suggestions(&self) -> watch::Receiver<SearchSnapshot> {
        self.search.subscribe()
    }

    pub fn search_snapshot(&self) -> SearchSnapshot {
        self.search.snapshot()
    }

    pub fn favorites(&self) -> watch::Receiver<FavoriteSnapshot> {
        self.favorites.subscribe()
    }

    pub async fn toggle_favorite(&self, departure: &str, destination: &str) -> Result<bool, FavoriteError> {
        self.favorites.toggle(departure, destination).await
    }

    pub async fn remove_favorite(&self, departure: &str, destination: &str) -> Result<bool, FavoriteError> {
        self.favorites.remove(departure, destination).await
    }

    pub fn routes_from(&self, departure: &str) -> Result<RouteView, CatalogError> {
        self.routes.routes_from(departure)
    }

    pub fn airport(&self, code: &str) -> Result<&Airport, CatalogError> {
        self.catalog.lookup(code)
    }

    pub fn catalog(&self) -> &AirportCatalog {
        &self.catalog
    }

    /// Current favorites joined with airport names.
    pub fn favorite_routes(&self) -> Vec<FavoriteRouteView> {
        let name = |code: &str| {
            self.catalog
                .lookup(code)
                .map(|a| a.name.clone())
                .unwrap_or_else(|_| UNKNOWN_AIRPORT.to_string())
        };
        self.favorites
            .snapshot()
            .iter()
            .map(|key| FavoriteRouteView {
                departure_code: key.departure().to_string(),
                departure_name: name(key.departure()),
                destination_code: key.destination().to_string(),
                destination_name: name(key.destination()),
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.search.shutdown();
        self.favorites.shutdown();
    }
}
