// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Read-only airport table with code lookup and substring search.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

const BUNDLED_AIRPORTS: &str = include_str!("../data/airports.csv");

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Airport {
    #[serde(alias = "iata_code")]
    pub code: String,
    pub name: String,
    pub passengers: u64,
}

impl Airport {
    pub fn new(code: impl Into<String>, name: impl Into<String>, passengers: u64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            passengers,
        }
    }

    fn matches(&self, needle_lower: &str) -> bool {
        self.code.to_lowercase().contains(needle_lower)
            || self.name.to_lowercase().contains(needle_lower)
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Airport not found: {0}")]
    NotFound(String),
    #[error("Invalid airport code in dataset: {0:?}")]
    InvalidCode(String),
    #[error("Duplicate airport code in dataset: {0}")]
    DuplicateCode(String),
    #[error("Airport catalog unavailable: {0}")]
    Unavailable(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalizes an IATA code: trimmed, upper-cased, exactly three ASCII letters.
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// Default ordering: busiest airports first, ties broken by code.
fn default_order(a: &Airport, b: &Airport) -> std::cmp::Ordering {
    b.passengers
        .cmp(&a.passengers)
        .then_with(|| a.code.cmp(&b.code))
}

/// Immutable airport table.
///
/// Airports are stored in default order so `all()` and `search()` never need to
/// re-sort. Shared across tasks behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct AirportCatalog {
    airports: Vec<Airport>,
    by_code: HashMap<String, usize>,
}

impl AirportCatalog {
    pub fn from_airports(mut airports: Vec<Airport>) -> Result<Self, CatalogError> {
        for airport in &mut airports {
            airport.code = normalize_code(&airport.code)
                .ok_or_else(|| CatalogError::InvalidCode(airport.code.clone()))?;
        }
        airports.sort_by(default_order);

        let mut by_code = HashMap::with_capacity(airports.len());
        for (idx, airport) in airports.iter().enumerate() {
            if by_code.insert(airport.code.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateCode(airport.code.clone()));
            }
        }

        log::debug!("[Catalog] Built airport catalog — count={}", airports.len());
        Ok(Self { airports, by_code })
    }

    /// Reads a `code,name,passengers` CSV with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let airports = rdr
            .deserialize::<Airport>()
            .collect::<Result<Vec<_>, csv::Error>>()?;
        Self::from_airports(airports)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let catalog = Self::from_csv_reader(file)?;
        log::info!(
            "[Catalog] Loaded airports — path={} count={}",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// The dataset compiled into the library.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_csv_reader(BUNDLED_AIRPORTS.as_bytes())
    }

    pub fn lookup(&self, code: &str) -> Result<&Airport, CatalogError> {
        normalize_code(code)
            .and_then(|c| self.by_code.get(&c))
            .map(|&idx| &self.airports[idx])
            .ok_or_else(|| CatalogError::NotFound(code.trim().to_string()))
    }

    /// Case-insensitive substring match on code or name, in default order.
    ///
    /// A blank needle matches every airport.
    pub fn search(&self, needle: &str) -> Vec<Airport> {
        let needle = needle.trim().to_lowercase();
        self.airports
            .iter()
            .filter(|a| a.matches(&needle))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[Airport] {
        &self.airports
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

/// Async lookup seam used by the search coordinator.
pub trait SuggestionSource: Send + Sync {
    fn suggest<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Airport>, CatalogError>>;
}

impl SuggestionSource for AirportCatalog {
    fn suggest<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<Airport>, CatalogError>> {
        Box::pin(async move { Ok(self.search(query)) })
    }
}
