// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use std::env;
use std::io;
use std::path::Path;
use tracing::info;

// Use library instead of local modules
use park_it::{
    init_logging, insert_spots, load_spots_csv, seed_default_spots, InteractiveShell, ParkingConfig,
    ParkingService, SqliteStore,
};

fn main() -> Result<()> {
    let config = ParkingConfig::from_env()?;
    config.validate()?;
    init_logging(&config.logging)?;

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("seed") => {
            let csv_path = args
                .get(2)
                .context("usage: park-it seed <spots.csv>")?;
            run_seed(&config, Path::new(csv_path))?;
        }
        Some("board") => run_board(&config)?,
        // Shell mode (default)
        _ => run_shell(&config)?,
    }

    Ok(())
}

fn open_store(config: &ParkingConfig) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.db_path, config.recurring_threshold)?;
    info!(db_path = %config.db_path.display(), "database opened");
    Ok(store)
}

fn run_seed(config: &ParkingConfig, csv_path: &Path) -> Result<()> {
    println!("📂 Loading spot inventory from {}", csv_path.display());
    let spots = load_spots_csv(csv_path)?;
    println!("✓ Read {} spots from CSV", spots.len());

    let store = open_store(config)?;
    let inserted = store.with_connection(|conn| insert_spots(conn, &spots))?;

    println!("✓ Inserted: {} spots", inserted);
    println!("✓ Skipped existing: {} spots", spots.len() - inserted);

    Ok(())
}

fn run_shell(config: &ParkingConfig) -> Result<()> {
    let store = open_store(config)?;
    let seeded = store.with_connection(|conn| {
        seed_default_spots(conn, config.seed_car_spots, config.seed_bike_spots)
    })?;
    if seeded > 0 {
        info!(seeded, "created default spot layout");
    }

    let service = ParkingService::new(store.clone(), store);

    let stdin = io::stdin();
    let stdout = io::stdout();
    InteractiveShell::new(&service, stdin.lock(), stdout.lock()).run()
}

#[cfg(feature = "tui")]
fn run_board(config: &ParkingConfig) -> Result<()> {
    let store = open_store(config)?;

    let mut app = ui::App::load(store)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ Board closed");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_board(_config: &ParkingConfig) -> Result<()> {
    eprintln!("❌ Board not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin park-server --features server");
    std::process::exit(1);
}
