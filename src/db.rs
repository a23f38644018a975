use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::entities::{ParkingSpot, Ticket, TicketId, VehicleCategory};
use crate::store::{SpotDirectory, TicketStore};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Parking spots (seeded, never created by the workflow)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parking (
            parking_number INTEGER PRIMARY KEY CHECK (parking_number > 0),
            type TEXT NOT NULL CHECK (type IN ('CAR', 'BIKE')),
            available INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    // ==========================================================================
    // Tickets (one row per visit, out_time NULL while parked)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parking_number INTEGER NOT NULL REFERENCES parking(parking_number),
            vehicle_reg_number TEXT NOT NULL CHECK (length(trim(vehicle_reg_number)) > 0),
            price REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
            in_time TEXT NOT NULL,
            out_time TEXT,
            discount INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ticket_vehicle ON ticket(vehicle_reg_number, out_time)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ticket_in_time ON ticket(in_time)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parking_type ON parking(type, available)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SPOT INVENTORY
// ============================================================================

/// One line of a spot inventory CSV (`parking_number,type`)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpotRecord {
    pub parking_number: u32,
    #[serde(rename = "type")]
    pub category: VehicleCategory,
}

pub fn load_spots_csv(csv_path: &Path) -> Result<Vec<ParkingSpot>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut spots = Vec::new();

    for result in rdr.deserialize() {
        let record: SpotRecord = result.context("Failed to deserialize spot")?;
        if record.parking_number == 0 {
            bail!("spot numbers must be positive");
        }
        spots.push(ParkingSpot::new(record.parking_number, record.category, true));
    }

    Ok(spots)
}

/// Insert spots, skipping numbers that already exist
pub fn insert_spots(conn: &Connection, spots: &[ParkingSpot]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for spot in spots {
        let result = conn.execute(
            "INSERT INTO parking (parking_number, type, available) VALUES (?1, ?2, ?3)",
            params![spot.number, spot.category.as_str(), spot.available],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "spot inventory loaded");

    Ok(inserted)
}

/// Create `cars` car spots then `bikes` bike spots, only when no spot exists yet
pub fn seed_default_spots(conn: &Connection, cars: u32, bikes: u32) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM parking", [], |row| row.get(0))?;
    if existing > 0 {
        debug!(existing, "spot inventory already present");
        return Ok(0);
    }

    let spots: Vec<ParkingSpot> = (1..=cars)
        .map(|n| ParkingSpot::new(n, VehicleCategory::Car, true))
        .chain((cars + 1..=cars + bikes).map(|n| ParkingSpot::new(n, VehicleCategory::Bike, true)))
        .collect();

    insert_spots(conn, &spots)
}

pub fn get_all_spots(conn: &Connection) -> Result<Vec<ParkingSpot>> {
    let mut stmt = conn.prepare(
        "SELECT parking_number, type, available FROM parking ORDER BY parking_number",
    )?;

    let spots = stmt
        .query_map([], |row| {
            Ok(ParkingSpot::new(row.get(0)?, category_column(row, 1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(spots)
}

/// Free and total spots for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occupancy {
    pub category: VehicleCategory,
    pub total: i64,
    pub available: i64,
}

pub fn get_occupancy(conn: &Connection) -> Result<Vec<Occupancy>> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN available THEN 1 ELSE 0 END), 0)
         FROM parking
         WHERE type = ?1",
    )?;

    VehicleCategory::ALL
        .iter()
        .map(|category| -> Result<Occupancy> {
            let (total, available): (i64, i64) = stmt.query_row([category.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            Ok(Occupancy {
                category: *category,
                total,
                available,
            })
        })
        .collect()
}

// ============================================================================
// TICKETS
// ============================================================================

const TICKET_SELECT: &str = "SELECT t.id, t.parking_number, p.type, p.available,
        t.vehicle_reg_number, t.price, t.in_time, t.out_time, t.discount
     FROM ticket t
     JOIN parking p ON p.parking_number = t.parking_number";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let out_time: Option<String> = row.get(7)?;

    Ok(Ticket {
        id: row.get(0)?,
        spot: ParkingSpot::new(row.get(1)?, category_column(row, 2)?, row.get(3)?),
        vehicle_id: row.get(4)?,
        price: row.get(5)?,
        entry_time: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        exit_time: out_time.map(|s| parse_timestamp(7, &s)).transpose()?,
        discount: row.get(8)?,
    })
}

fn category_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<VehicleCategory> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn get_open_tickets(conn: &Connection) -> Result<Vec<Ticket>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE t.out_time IS NULL ORDER BY t.in_time",
        TICKET_SELECT
    ))?;

    let tickets = stmt
        .query_map([], ticket_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tickets)
}

/// Every ticket of a vehicle, oldest first
pub fn get_tickets_for_vehicle(conn: &Connection, vehicle_id: &str) -> Result<Vec<Ticket>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE t.vehicle_reg_number = ?1 ORDER BY t.in_time, t.id",
        TICKET_SELECT
    ))?;

    let tickets = stmt
        .query_map([vehicle_id], ticket_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tickets)
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, most recent first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &row.get::<_, String>(1)?)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn record_event(conn: &Connection, event: Event) {
    if let Err(e) = insert_event(conn, &event) {
        warn!(event_type = %event.event_type, error = ?e, "failed to record audit event");
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const EVENT_ACTOR: &str = "parking_service";

/// SQLite-backed spot directory and ticket store.
///
/// Clones share one connection; every call holds the lock for one statement
/// (or one statement plus its audit event).
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    recurring_threshold: u32,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path, recurring_threshold: u32) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn, recurring_threshold))
    }

    pub fn open_in_memory(recurring_threshold: u32) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn, recurring_threshold))
    }

    pub fn from_connection(conn: Connection, recurring_threshold: u32) -> Self {
        SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            recurring_threshold,
        }
    }

    /// Run `f` with the locked connection
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        f(&conn)
    }
}

impl SpotDirectory for SqliteStore {
    fn find_available(&self, category: VehicleCategory) -> Result<Option<u32>> {
        self.with_connection(|conn| {
            let number: Option<u32> = conn
                .query_row(
                    "SELECT MIN(parking_number) FROM parking WHERE type = ?1 AND available = 1",
                    [category.as_str()],
                    |row| row.get(0),
                )
                .context("Error fetching next available slot")?;
            Ok(number)
        })
    }

    fn set_availability(&self, spot_number: u32, available: bool) -> Result<bool> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE parking SET available = ?1 WHERE parking_number = ?2",
                    params![available, spot_number],
                )
                .context("Error updating parking info")?;
            debug!(spot_number, available, changed, "spot availability updated");
            Ok(changed == 1)
        })
    }
}

impl TicketStore for SqliteStore {
    fn is_recurring_user(&self, vehicle_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let completed: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM ticket
                     WHERE vehicle_reg_number = ?1 AND out_time IS NOT NULL",
                    [vehicle_id],
                    |row| row.get(0),
                )
                .context("Error while retrieving discount information")?;
            Ok(completed >= i64::from(self.recurring_threshold))
        })
    }

    fn create_ticket(&self, ticket: &Ticket) -> Result<TicketId> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO ticket (
                    parking_number, vehicle_reg_number, price, in_time, out_time, discount
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ticket.spot.number,
                    ticket.vehicle_id,
                    ticket.price,
                    format_timestamp(&ticket.entry_time),
                    ticket.exit_time.as_ref().map(format_timestamp),
                    ticket.discount,
                ],
            )
            .context("Error saving ticket")?;

            let id = conn.last_insert_rowid();

            record_event(
                conn,
                Event::new(
                    "ticket_created",
                    "ticket",
                    &id.to_string(),
                    serde_json::json!({
                        "vehicle_id": ticket.vehicle_id,
                        "parking_number": ticket.spot.number,
                        "category": ticket.spot.category,
                        "discount": ticket.discount,
                    }),
                    EVENT_ACTOR,
                ),
            );

            Ok(id)
        })
    }

    fn find_open_ticket(&self, vehicle_id: &str) -> Result<Option<Ticket>> {
        self.with_connection(|conn| {
            let ticket = conn
                .query_row(
                    &format!(
                        "{} WHERE t.vehicle_reg_number = ?1 AND t.out_time IS NULL
                         ORDER BY t.in_time DESC, t.id DESC
                         LIMIT 1",
                        TICKET_SELECT
                    ),
                    [vehicle_id],
                    ticket_from_row,
                )
                .optional()
                .context("Error fetching ticket")?;
            Ok(ticket)
        })
    }

    fn update_on_exit(&self, ticket: &Ticket) -> Result<bool> {
        let Some(exit_time) = ticket.exit_time else {
            bail!("ticket {} has no exit time", ticket.id);
        };

        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE ticket SET price = ?1, out_time = ?2
                     WHERE id = ?3 AND out_time IS NULL",
                    params![ticket.price, format_timestamp(&exit_time), ticket.id],
                )
                .context("Error while updating ticket")?;

            if changed == 1 {
                record_event(
                    conn,
                    Event::new(
                        "ticket_closed",
                        "ticket",
                        &ticket.id.to_string(),
                        serde_json::json!({
                            "vehicle_id": ticket.vehicle_id,
                            "price": ticket.price,
                        }),
                        EVENT_ACTOR,
                    ),
                );
            }

            Ok(changed == 1)
        })
    }
}
