// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

pub mod catalog;
pub mod favorites;
pub mod routes;
pub mod search;
pub mod session;
pub mod settings;
pub mod store;

use std::path::PathBuf;

pub use catalog::{Airport, AirportCatalog, CatalogError, SuggestionSource};
pub use favorites::{FavoriteError, FavoriteSnapshot, FavoritesSynchronizer, RouteKey};
pub use routes::{RouteEntry, RouteView, RouteViewCoordinator};
pub use search::{SearchCoordinator, SearchSnapshot, SearchStatus};
pub use session::{FavoriteRouteView, FlightSearch};
pub use settings::Settings;
pub use store::{FavoriteRoute, FavoriteStore, JsonFavoriteStore, MemoryFavoriteStore, StoreError};

/// Directory holding `settings.json` and `favorites.json`.
///
/// Falls back to the working directory when the platform has no config location.
pub fn get_config_root() -> PathBuf {
    directories::ProjectDirs::from("org", "flight-search", "Flight-Search")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
