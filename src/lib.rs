// Park It - Parking Lot Occupancy & Billing
// Exposes all modules for use in the shell, the API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod fare;
pub mod logging;
pub mod service;
pub mod shell;
pub mod store;

// Re-export commonly used types
pub use config::{LogFormat, LoggingConfig, ParkingConfig};
pub use db::{
    Event, Occupancy, SqliteStore,
    setup_database, seed_default_spots, load_spots_csv, insert_spots,
    get_all_spots, get_occupancy, get_open_tickets, get_tickets_for_vehicle,
    insert_event, get_events_for_entity,
};
pub use entities::{ParkingSpot, Ticket, TicketId, VehicleCategory};
pub use error::{ParkingError, ParkingResult};
pub use fare::{compute_fare, FareCalculator, FareError};
pub use logging::init_logging;
pub use service::{Clock, ExitReceipt, FixedClock, ParkingService, SystemClock};
pub use shell::InteractiveShell;
pub use store::{InMemorySpotDirectory, InMemoryTicketStore, SpotDirectory, TicketStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
