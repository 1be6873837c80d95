// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Debounced, latest-wins airport suggestions.
//!
//! The coordinator owns a worker task. Query text goes in over a channel; the worker
//! publishes [`SearchSnapshot`]s on a watch channel.
//!
//! Every query bumps a generation counter and cancels the lookup started for the
//! previous one. A lookup result is only published when its generation is still
//! current, so a slow lookup that finishes late can never replace newer suggestions.

use crate::catalog::{Airport, CatalogError, SuggestionSource};
use crate::settings::SearchSettings;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Query is blank.
    Idle,
    /// Waiting for the debounce timer or a lookup.
    Pending,
    /// Suggestions match the current query.
    Settled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    pub query: String,
    pub status: SearchStatus,
    pub suggestions: Arc<[Airport]>,
    /// Bumped each time a new suggestion list is published.
    pub revision: u64,
    /// Suggestions were kept after a failed lookup and may not match `query`.
    pub stale: bool,
}

impl Default for SearchSnapshot {
    fn default() -> Self {
        Self {
            query: String::new(),
            status: SearchStatus::Idle,
            suggestions: Arc::from(Vec::new()),
            revision: 0,
            stale: false,
        }
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

struct LookupDone {
    generation: u64,
    result: Result<Vec<Airport>, CatalogError>,
}

struct SearchWorker {
    source: Arc<dyn SuggestionSource>,
    settings: SearchSettings,
    snapshot_tx: watch::Sender<SearchSnapshot>,
    query: String,
    generation: u64,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    failures: u32,
}

impl SearchWorker {
    async fn run(
        mut self,
        mut queries: mpsc::UnboundedReceiver<String>,
        shutdown: CancellationToken,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                query = queries.recv() => match query {
                    Some(text) => self.on_query(text),
                    None => break,
                },

                Some(done) = done_rx.recv() => self.on_lookup_done(done),

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.start_lookup(&done_tx, &shutdown);
                }
            }
        }

        self.cancel_in_flight();
        log::debug!("[Search] Coordinator stopped");
    }

    fn on_query(&mut self, text: String) {
        self.generation += 1;
        self.cancel_in_flight();
        self.failures = 0;
        self.query = text;

        if self.query.trim().is_empty() {
            self.deadline = None;
            let query = self.query.clone();
            self.snapshot_tx.send_modify(|s| {
                s.query = query;
                s.status = SearchStatus::Idle;
                s.stale = false;
                if !s.suggestions.is_empty() {
                    s.suggestions = Arc::from(Vec::new());
                    s.revision += 1;
                }
            });
            return;
        }

        self.deadline = Some(Instant::now() + self.settings.debounce());
        let query = self.query.clone();
        self.snapshot_tx.send_modify(|s| {
            s.query = query;
            s.status = SearchStatus::Pending;
        });
    }

    fn start_lookup(&mut self, done_tx: &mpsc::UnboundedSender<LookupDone>, shutdown: &CancellationToken) {
        self.deadline = None;
        self.cancel_in_flight();

        let generation = self.generation;
        let query = self.query.trim().to_string();
        let cancel = shutdown.child_token();
        log::debug!(
            "[Search] Looking up suggestions — query={:?} generation={}",
            query,
            generation
        );

        let source = Arc::clone(&self.source);
        let done_tx = done_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                result = source.suggest(&query) => {
                    let _ = done_tx.send(LookupDone { generation, result });
                }
            }
        });

        self.in_flight = Some(InFlight { generation, cancel });
    }

    fn on_lookup_done(&mut self, done: LookupDone) {
        if done.generation != self.generation {
            log::debug!(
                "[Search] Discarding stale lookup — generation={} current={}",
                done.generation,
                self.generation
            );
            return;
        }
        if self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == done.generation)
        {
            self.in_flight = None;
        }

        match done.result {
            Ok(airports) => {
                self.failures = 0;
                self.snapshot_tx.send_modify(|s| {
                    s.status = SearchStatus::Settled;
                    s.suggestions = Arc::from(airports);
                    s.stale = false;
                    s.revision += 1;
                });
            }
            Err(e) => {
                self.failures += 1;
                self.snapshot_tx.send_modify(|s| {
                    s.status = SearchStatus::Pending;
                    s.stale = true;
                });
                if self.failures <= self.settings.retry_limit {
                    log::warn!(
                        "[Search] Lookup failed, retrying — query={:?} attempt={} {}",
                        self.query,
                        self.failures,
                        e
                    );
                    self.deadline = Some(Instant::now() + self.settings.retry_delay());
                } else {
                    log::error!(
                        "[Search] Lookup failed, keeping stale suggestions — query={:?} {}",
                        self.query,
                        e
                    );
                }
            }
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}

/// Handle to the search worker. Dropping it stops the worker.
pub struct SearchCoordinator {
    queries: mpsc::UnboundedSender<String>,
    snapshot_rx: watch::Receiver<SearchSnapshot>,
    shutdown: CancellationToken,
}

impl SearchCoordinator {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(source: Arc<dyn SuggestionSource>, settings: SearchSettings) -> Self {
        let (queries, query_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SearchSnapshot::default());
        let shutdown = CancellationToken::new();

        let worker = SearchWorker {
            source,
            settings,
            snapshot_tx,
            query: String::new(),
            generation: 0,
            deadline: None,
            in_flight: None,
            failures: 0,
        };
        tokio::spawn(worker.run(query_rx, shutdown.clone()));

        Self {
            queries,
            snapshot_rx,
            shutdown,
        }
    }

    pub fn set_query_text(&self, text: impl Into<String>) {
        if self.queries.send(text.into()).is_err() {
            log::warn!("[Search] Query ignored, coordinator is stopped");
        }
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SearchCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
