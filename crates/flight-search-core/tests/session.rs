// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

mod common;

use flight_search_core::session::UNKNOWN_AIRPORT;
use flight_search_core::{FlightSearch, JsonFavoriteStore, SearchStatus, Settings};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    // Keep TempDir alive so the favorites file isn't deleted
    _dir: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        common::init_logging();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut settings = Settings::default();
        settings.data.favorites_file = Some(dir.path().join("favorites.json"));
        settings.search.debounce_ms = 20;
        Self { _dir: dir, settings }
    }

    async fn open(&self) -> FlightSearch {
        let catalog = Arc::new(common::catalog());
        let store = JsonFavoriteStore::open(self.settings.favorites_path())
            .await
            .unwrap();
        FlightSearch::open(catalog, Arc::new(store), &self.settings)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_favorites_survive_restart() {
    let fixture = Fixture::new();

    let app = fixture.open().await;
    assert!(app.toggle_favorite("JFK", "LAX").await.unwrap());
    assert!(app.toggle_favorite("OPO", "JFK").await.unwrap());
    assert!(app.remove_favorite("OPO", "JFK").await.unwrap());
    app.shutdown();
    drop(app);

    let app = fixture.open().await;
    let favorites = app.favorite_routes();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].departure_code, "JFK");
    assert_eq!(favorites[0].departure_name, "John F Kennedy International");
    assert_eq!(favorites[0].destination_name, "Los Angeles International");
}

#[tokio::test]
async fn test_favorite_with_unknown_airport_is_labelled() {
    let fixture = Fixture::new();
    let app = fixture.open().await;

    // Codes are not checked against the catalog.
    app.toggle_favorite("JFK", "ZZZ").await.unwrap();
    let favorites = app.favorite_routes();
    assert_eq!(favorites[0].destination_code, "ZZZ");
    assert_eq!(favorites[0].destination_name, UNKNOWN_AIRPORT);
}

#[tokio::test]
async fn test_route_view_tracks_favorites() {
    let fixture = Fixture::new();
    let app = fixture.open().await;

    let mut view = app.routes_from("OPO").unwrap();
    assert_eq!(view.len(), app.catalog().len() - 1);
    assert!(view.current().iter().all(|e| e.destination.code != "OPO"));

    app.toggle_favorite("OPO", "ATL").await.unwrap();
    let entries = view.changed().await.unwrap();
    let favorite: Vec<_> = entries
        .iter()
        .filter(|e| e.is_favorite)
        .map(|e| e.destination.code.as_str())
        .collect();
    assert_eq!(favorite, vec!["ATL"]);

    // Busiest destination first.
    assert_eq!(entries[0].destination.code, "ATL");
}

#[tokio::test]
async fn test_live_search_through_session() {
    let fixture = Fixture::new();
    let app = fixture.open().await;
    let mut suggestions = app.suggestions();

    app.set_query_text("international");
    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        suggestions.wait_for(|s| s.status == SearchStatus::Settled),
    )
    .await
    .expect("search settled")
    .unwrap()
    .clone();

    let codes: Vec<_> = snapshot.suggestions.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["LAX", "JFK", "LAS"]);
    assert_eq!(app.airport("lax").unwrap().name, "Los Angeles International");
    assert!(app.airport("XXX").is_err());
}
