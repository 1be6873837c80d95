// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flight_search_core::{
    FavoriteStore, FlightSearch, JsonFavoriteStore, MemoryFavoriteStore, SearchSnapshot,
    SearchStatus, Settings,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Extra time a one-shot search waits beyond the debounce before giving up.
const SEARCH_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to settings.json in the config directory)
    #[arg(short, long, env = "FLIGHT_SEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Airport dataset CSV with a code,name,passengers header
    #[arg(long, env = "FLIGHT_SEARCH_AIRPORTS")]
    airports: Option<PathBuf>,

    /// Favorites file (defaults to favorites.json in the config directory)
    #[arg(long)]
    favorites: Option<PathBuf>,

    /// Keep favorites in memory for this run only
    #[arg(long)]
    ephemeral: bool,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search airports by code or name
    Search { query: String },
    /// Show a single airport
    Airport { code: String },
    /// List destinations from an airport, favorites marked
    Routes { code: String },
    /// List favorite routes
    Favorites,
    /// Toggle a favorite route
    Toggle {
        departure: String,
        destination: String,
    },
    /// Remove a favorite route
    Remove {
        departure: String,
        destination: String,
    },
    /// Interactive session: type to search, `:help` for commands
    Shell,
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Query(String),
    Routes(String),
    Toggle(String, String),
    Favorites,
    Help,
    Quit,
    Unknown(String),
}

fn parse_shell_line(line: &str) -> ShellCommand {
    let Some(rest) = line.trim_start().strip_prefix(':') else {
        return ShellCommand::Query(line.to_string());
    };

    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        ["routes", code] => ShellCommand::Routes(code.to_string()),
        ["toggle", departure, destination] => {
            ShellCommand::Toggle(departure.to_string(), destination.to_string())
        }
        ["favorites"] => ShellCommand::Favorites,
        ["help"] => ShellCommand::Help,
        ["quit"] | ["q"] => ShellCommand::Quit,
        _ => ShellCommand::Unknown(rest.trim().to_string()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Logger already initialised: {}", e);
    }
}

fn print_suggestions(snapshot: &SearchSnapshot) {
    if snapshot.stale {
        println!("(search unavailable, showing previous results)");
    }
    if snapshot.suggestions.is_empty() && snapshot.status == SearchStatus::Settled {
        println!("No airports match '{}'", snapshot.query.trim());
    }
    for airport in snapshot.suggestions.iter() {
        println!("{} - {}", airport.code, airport.name);
    }
}

fn print_routes(app: &FlightSearch, code: &str) -> Result<()> {
    let view = app.routes_from(code)?;
    println!(
        "Flights from {} - {}",
        view.departure().code,
        view.departure().name
    );
    if view.is_empty() {
        println!("No flights available.");
    }
    for entry in view.current() {
        let mark = if entry.is_favorite { "[*]" } else { "[ ]" };
        println!(
            "{} {} - {}",
            mark, entry.destination.code, entry.destination.name
        );
    }
    Ok(())
}

fn print_favorites(app: &FlightSearch) {
    let favorites = app.favorite_routes();
    if favorites.is_empty() {
        println!("No favorite routes");
    }
    for fav in favorites {
        println!(
            "{} - {}  ->  {} - {}",
            fav.departure_code, fav.departure_name, fav.destination_code, fav.destination_name
        );
    }
}

async fn toggle(app: &FlightSearch, departure: &str, destination: &str) -> Result<()> {
    let on = app.toggle_favorite(departure, destination).await?;
    println!(
        "{} {} -> {}",
        if on { "Favorited:" } else { "Unfavorited:" },
        departure.trim().to_uppercase(),
        destination.trim().to_uppercase()
    );
    Ok(())
}

/// Sends `query` and waits for the snapshot that answers it. Returns whatever is
/// current if the search does not settle within `limit`.
async fn settle_search(app: &FlightSearch, query: String, limit: Duration) -> Result<SearchSnapshot> {
    let mut rx = app.suggestions();
    app.set_query_text(query.clone());

    let settled = tokio::time::timeout(
        limit,
        rx.wait_for(|s| {
            s.query == query && matches!(s.status, SearchStatus::Settled | SearchStatus::Idle)
        }),
    )
    .await
    .map(|r| r.map(|snapshot| snapshot.clone()));
    match settled {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(_)) => anyhow::bail!("Search stopped before settling"),
        Err(_) => {
            log::warn!("Search did not settle within {:?}", limit);
            let snapshot = rx.borrow().clone();
            Ok(snapshot)
        }
    }
}

async fn run_search(app: &FlightSearch, settings: &Settings, query: String) -> Result<()> {
    let limit = settings.search.debounce() + SEARCH_GRACE;
    let snapshot = settle_search(app, query, limit).await?;
    print_suggestions(&snapshot);
    Ok(())
}

async fn run_shell(app: &FlightSearch) -> Result<()> {
    let mut updates = app.suggestions();
    let printer = tokio::spawn(async move {
        let mut last_revision = updates.borrow().revision;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.revision != last_revision || snapshot.stale {
                last_revision = snapshot.revision;
                print_suggestions(&snapshot);
            }
        }
    });

    println!("Type to search airports. :help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_shell_line(&line) {
            ShellCommand::Query(text) => app.set_query_text(text),
            ShellCommand::Routes(code) => {
                if let Err(e) = print_routes(app, &code) {
                    println!("{}", e);
                }
            }
            ShellCommand::Toggle(departure, destination) => {
                if let Err(e) = toggle(app, &departure, &destination).await {
                    println!("{}", e);
                }
            }
            ShellCommand::Favorites => print_favorites(app),
            ShellCommand::Help => {
                println!(":routes <CODE>         destinations from an airport");
                println!(":toggle <FROM> <TO>    toggle a favorite route");
                println!(":favorites             list favorite routes");
                println!(":quit                  leave");
            }
            ShellCommand::Quit => break,
            ShellCommand::Unknown(cmd) => println!("Unknown command ':{}'", cmd),
        }
    }

    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)?;
    if let Some(path) = cli.airports {
        settings.data.airports_csv = Some(path);
    }
    if let Some(path) = cli.favorites {
        settings.data.favorites_file = Some(path);
    }

    let catalog = Arc::new(FlightSearch::load_catalog(&settings).context("Failed to load airports")?);
    let store: Arc<dyn FavoriteStore> = if cli.ephemeral {
        Arc::new(MemoryFavoriteStore::new())
    } else {
        let path = settings.favorites_path();
        Arc::new(
            JsonFavoriteStore::open(&path)
                .await
                .with_context(|| format!("Failed to open favorites at {}", path.display()))?,
        )
    };
    let app = FlightSearch::open(catalog, store, &settings).await?;

    match &cli.command {
        Commands::Search { query } => run_search(&app, &settings, query.clone()).await?,
        Commands::Airport { code } => {
            let airport = app.airport(code)?;
            println!(
                "{} - {} ({} passengers)",
                airport.code, airport.name, airport.passengers
            );
        }
        Commands::Routes { code } => print_routes(&app, code)?,
        Commands::Favorites => print_favorites(&app),
        Commands::Toggle {
            departure,
            destination,
        } => toggle(&app, departure, destination).await?,
        Commands::Remove {
            departure,
            destination,
        } => {
            if app.remove_favorite(departure, destination).await? {
                println!("Removed: {} -> {}", departure, destination);
            } else {
                println!("No favorite route {} -> {}", departure, destination);
            }
        }
        Commands::Shell => run_shell(&app).await?,
    }

    app.shutdown();
    Ok(())
}
