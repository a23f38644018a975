// 🚗 Parking Workflow - vehicle entry and exit
//
// Visit lifecycle per vehicle: NONE → PARKED (entry) → EXITED (exit).
//
// The workflow is synchronous and holds no state between calls. Finding a spot
// and marking it taken are two separate directory calls, so concurrent callers
// must be serialised in front of the service (see `bin/server.rs`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::entities::{ParkingSpot, Ticket, VehicleCategory};
use crate::error::{ParkingError, ParkingResult};
use crate::fare::FareCalculator;
use crate::store::{SpotDirectory, TicketStore};

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for entry and exit timestamps
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// EXIT RECEIPT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ExitReceipt {
    /// Closed ticket, as persisted
    pub ticket: Ticket,
    pub price: f64,
    /// Whole stay fell inside the grace period
    pub was_free: bool,
    /// False when the directory did not confirm the release
    pub spot_released: bool,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ParkingService<D, T> {
    directory: D,
    tickets: T,
    fare: FareCalculator,
    clock: Box<dyn Clock + Send>,
}

impl<D: SpotDirectory, T: TicketStore> ParkingService<D, T> {
    pub fn new(directory: D, tickets: T) -> Self {
        Self::with_clock(directory, tickets, SystemClock)
    }

    pub fn with_clock(directory: D, tickets: T, clock: impl Clock + Send + 'static) -> Self {
        ParkingService {
            directory,
            tickets,
            fare: FareCalculator::new(),
            clock: Box::new(clock),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn tickets(&self) -> &T {
        &self.tickets
    }

    /// Park a vehicle: allocate a spot of `category` and open a ticket.
    ///
    /// Nothing is rolled back if a later step fails: a spot may stay marked
    /// unavailable without a ticket.
    pub fn process_entry(&self, category: VehicleCategory, vehicle_id: &str) -> ParkingResult<Ticket> {
        let vehicle_id = validate_vehicle_id(vehicle_id)?;

        let spot_number = self
            .directory
            .find_available(category)
            .map_err(|e| entry_failed("fetching next available spot", e))?;

        let spot_number = match spot_number {
            Some(n) if n > 0 => n,
            _ => {
                warn!(%category, vehicle_id, "parking slots are full");
                return Err(ParkingError::LotFull(category));
            }
        };

        let reserved = self
            .directory
            .set_availability(spot_number, false)
            .map_err(|e| entry_failed("reserving spot", e))?;
        if !reserved {
            error!(spot_number, "spot directory did not mark spot as taken");
            return Err(ParkingError::PersistenceFailure(format!(
                "spot {} could not be reserved",
                spot_number
            )));
        }

        let discount = self
            .tickets
            .is_recurring_user(vehicle_id)
            .map_err(|e| entry_failed("checking recurring user", e))?;

        let spot = ParkingSpot::new(spot_number, category, false);
        let mut ticket = Ticket::open(spot, vehicle_id, self.clock.now(), discount);

        ticket.id = self
            .tickets
            .create_ticket(&ticket)
            .map_err(|e| entry_failed("saving ticket", e))?;

        info!(
            ticket_id = ticket.id,
            spot_number,
            %category,
            vehicle_id,
            discount,
            entry_time = %ticket.entry_time,
            "vehicle parked"
        );

        Ok(ticket)
    }

    /// Close the open ticket of a vehicle, bill it and free its spot.
    ///
    /// The spot is only released once the ticket update has been confirmed.
    pub fn process_exit(&self, vehicle_id: &str) -> ParkingResult<ExitReceipt> {
        let vehicle_id = validate_vehicle_id(vehicle_id)?;

        let mut ticket = self
            .tickets
            .find_open_ticket(vehicle_id)
            .map_err(|e| exit_failed("fetching ticket", e))?
            .ok_or_else(|| {
                warn!(vehicle_id, "no open ticket");
                ParkingError::TicketNotFound(vehicle_id.to_string())
            })?;

        ticket.exit_time = Some(self.clock.now());

        let price = self.fare.fare_for(&ticket).map_err(|e| {
            error!(ticket_id = ticket.id, error = %e, "fare computation failed");
            ParkingError::from(e)
        })?;
        ticket.price = price;

        let updated = self
            .tickets
            .update_on_exit(&ticket)
            .map_err(|e| exit_failed("updating ticket", e))?;
        if !updated {
            error!(ticket_id = ticket.id, "ticket store did not confirm the update");
            return Err(ParkingError::TicketUpdateFailed(ticket.id));
        }

        let spot_number = ticket.spot.number;
        let spot_released = match self.directory.set_availability(spot_number, true) {
            Ok(true) => true,
            Ok(false) => {
                error!(spot_number, "spot directory did not release spot");
                false
            }
            Err(e) => {
                error!(spot_number, error = ?e, "error releasing spot");
                false
            }
        };
        ticket.spot.available = spot_released;

        info!(
            ticket_id = ticket.id,
            spot_number,
            vehicle_id,
            price,
            "vehicle exited"
        );

        Ok(ExitReceipt {
            was_free: price == 0.0,
            price,
            spot_released,
            ticket,
        })
    }
}

/// Trimmed, non-empty vehicle id
pub fn validate_vehicle_id(vehicle_id: &str) -> ParkingResult<&str> {
    let trimmed = vehicle_id.trim();
    if trimmed.is_empty() {
        return Err(ParkingError::InvalidInput(
            "vehicle registration number must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn entry_failed(step: &str, err: anyhow::Error) -> ParkingError {
    error!(step, error = ?err, "unable to process incoming vehicle");
    ParkingError::EntryFailed(err.context(format!("error {}", step)))
}

fn exit_failed(step: &str, err: anyhow::Error) -> ParkingError {
    error!(step, error = ?err, "unable to process exiting vehicle");
    ParkingError::ExitFailed(err.context(format!("error {}", step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TicketId;
    use crate::store::{InMemorySpotDirectory, InMemoryTicketStore};
    use anyhow::{anyhow, Result};
    use chrono::Duration;
    use std::cell::RefCell;

    const EPSILON: f64 = 1e-9;

    // ------------------------------------------------------------------------
    // Recording doubles
    // ------------------------------------------------------------------------

    struct RecordingDirectory {
        next_spot: Option<u32>,
        set_result: bool,
        fail_find: bool,
        availability_calls: RefCell<Vec<(u32, bool)>>,
    }

    impl RecordingDirectory {
        fn with_spot(next_spot: Option<u32>) -> Self {
            RecordingDirectory {
                next_spot,
                set_result: true,
                fail_find: false,
                availability_calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl SpotDirectory for RecordingDirectory {
        fn find_available(&self, _category: VehicleCategory) -> Result<Option<u32>> {
            if self.fail_find {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.next_spot)
        }

        fn set_availability(&self, spot_number: u32, available: bool) -> Result<bool> {
            self.availability_calls.borrow_mut().push((spot_number, available));
            Ok(self.set_result)
        }
    }

    struct RecordingTicketStore {
        recurring: bool,
        open_ticket: Option<Ticket>,
        update_result: bool,
        fail_create: bool,
        recurrence_checks: RefCell<Vec<String>>,
        created: RefCell<Vec<Ticket>>,
        updated: RefCell<Vec<Ticket>>,
    }

    impl RecordingTicketStore {
        fn new() -> Self {
            RecordingTicketStore {
                recurring: false,
                open_ticket: None,
                update_result: true,
                fail_create: false,
                recurrence_checks: RefCell::new(Vec::new()),
                created: RefCell::new(Vec::new()),
                updated: RefCell::new(Vec::new()),
            }
        }

        fn with_open_ticket(ticket: Ticket) -> Self {
            RecordingTicketStore {
                open_ticket: Some(ticket),
                ..Self::new()
            }
        }
    }

    impl TicketStore for RecordingTicketStore {
        fn is_recurring_user(&self, vehicle_id: &str) -> Result<bool> {
            self.recurrence_checks.borrow_mut().push(vehicle_id.to_string());
            Ok(self.recurring)
        }

        fn create_ticket(&self, ticket: &Ticket) -> Result<TicketId> {
            if self.fail_create {
                return Err(anyhow!("disk full"));
            }
            self.created.borrow_mut().push(ticket.clone());
            Ok(7)
        }

        fn find_open_ticket(&self, vehicle_id: &str) -> Result<Option<Ticket>> {
            Ok(self
                .open_ticket
                .clone()
                .filter(|t| t.vehicle_id == vehicle_id))
        }

        fn update_on_exit(&self, ticket: &Ticket) -> Result<bool> {
            self.updated.borrow_mut().push(ticket.clone());
            Ok(self.update_result)
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn parked(category: VehicleCategory, minutes_ago: i64, discount: bool) -> Ticket {
        let mut ticket = Ticket::open(
            ParkingSpot::new(1, category, false),
            "ABCDEF",
            now() - Duration::minutes(minutes_ago),
            discount,
        );
        ticket.id = 1;
        ticket
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < EPSILON, "expected {}, got {}", expected, actual);
    }

    // ------------------------------------------------------------------------
    // Entry
    // ------------------------------------------------------------------------

    #[test]
    fn test_entry_creates_ticket() {
        let directory = RecordingDirectory::with_spot(Some(1));
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let ticket = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap();

        assert_eq!(ticket.id, 7);
        assert_eq!(ticket.spot.number, 1);
        assert_eq!(ticket.spot.category, VehicleCategory::Car);
        assert_eq!(ticket.vehicle_id, "ABCDEF");
        assert_eq!(ticket.price, 0.0);
        assert_eq!(ticket.entry_time, now());
        assert!(ticket.exit_time.is_none());
        assert!(!ticket.discount);

        assert_eq!(*directory.availability_calls.borrow(), vec![(1, false)]);
        assert_eq!(*tickets.recurrence_checks.borrow(), vec!["ABCDEF".to_string()]);
        assert_eq!(tickets.created.borrow().len(), 1);
    }

    #[test]
    fn test_entry_recurring_user_gets_discount() {
        let directory = RecordingDirectory::with_spot(Some(4));
        let tickets = RecordingTicketStore {
            recurring: true,
            ..RecordingTicketStore::new()
        };
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let ticket = service.process_entry(VehicleCategory::Bike, "ABCDEF").unwrap();

        assert!(ticket.discount);
        assert!(tickets.created.borrow()[0].discount);
    }

    #[test]
    fn test_entry_lot_full_touches_nothing() {
        for full in [None, Some(0)] {
            let directory = RecordingDirectory::with_spot(full);
            let tickets = RecordingTicketStore::new();
            let service = ParkingService::new(&directory, &tickets);

            let err = service.process_entry(VehicleCategory::Bike, "ABCDEF").unwrap_err();

            assert!(matches!(err, ParkingError::LotFull(VehicleCategory::Bike)));
            assert!(directory.availability_calls.borrow().is_empty());
            assert!(tickets.recurrence_checks.borrow().is_empty());
            assert!(tickets.created.borrow().is_empty());
        }
    }

    #[test]
    fn test_entry_rejects_blank_vehicle_id() {
        let directory = RecordingDirectory::with_spot(Some(1));
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::new(&directory, &tickets);

        let err = service.process_entry(VehicleCategory::Car, "   ").unwrap_err();

        assert!(matches!(err, ParkingError::InvalidInput(_)));
        assert!(directory.availability_calls.borrow().is_empty());
        assert!(tickets.created.borrow().is_empty());
    }

    #[test]
    fn test_entry_trims_vehicle_id() {
        let directory = RecordingDirectory::with_spot(Some(1));
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::new(&directory, &tickets);

        let ticket = service.process_entry(VehicleCategory::Car, "  ABCDEF \n").unwrap();
        assert_eq!(ticket.vehicle_id, "ABCDEF");
    }

    #[test]
    fn test_entry_spot_not_reserved_creates_no_ticket() {
        let directory = RecordingDirectory {
            set_result: false,
            ..RecordingDirectory::with_spot(Some(1))
        };
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::new(&directory, &tickets);

        let err = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap_err();

        assert!(matches!(err, ParkingError::PersistenceFailure(_)));
        assert!(tickets.created.borrow().is_empty());
    }

    #[test]
    fn test_entry_collaborator_errors_surface_as_entry_failed() {
        let directory = RecordingDirectory {
            fail_find: true,
            ..RecordingDirectory::with_spot(Some(1))
        };
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::new(&directory, &tickets);

        let err = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap_err();
        assert!(matches!(err, ParkingError::EntryFailed(_)));

        let directory = RecordingDirectory::with_spot(Some(2));
        let tickets = RecordingTicketStore {
            fail_create: true,
            ..RecordingTicketStore::new()
        };
        let service = ParkingService::new(&directory, &tickets);

        let err = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap_err();
        assert!(matches!(err, ParkingError::EntryFailed(_)));
        // Reservation is not rolled back
        assert_eq!(*directory.availability_calls.borrow(), vec![(2, false)]);
    }

    // ------------------------------------------------------------------------
    // Exit
    // ------------------------------------------------------------------------

    #[test]
    fn test_exit_one_hour_car() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, 60, false));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let receipt = service.process_exit("ABCDEF").unwrap();

        assert_close(receipt.price, 1.5);
        assert!(!receipt.was_free);
        assert!(receipt.spot_released);
        assert_eq!(receipt.ticket.exit_time, Some(now()));
        assert!(receipt.ticket.spot.available);

        let updated = tickets.updated.borrow();
        assert_eq!(updated.len(), 1);
        assert_close(updated[0].price, 1.5);
        assert_eq!(updated[0].exit_time, Some(now()));
        assert_eq!(*directory.availability_calls.borrow(), vec![(1, true)]);
    }

    #[test]
    fn test_exit_bike_three_quarters() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Bike, 45, false));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let receipt = service.process_exit("ABCDEF").unwrap();
        assert_close(receipt.price, 0.75);
    }

    #[test]
    fn test_exit_within_grace_period_is_free() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, 15, false));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let receipt = service.process_exit("ABCDEF").unwrap();

        assert_eq!(receipt.price, 0.0);
        assert!(receipt.was_free);
        assert_eq!(*directory.availability_calls.borrow(), vec![(1, true)]);
    }

    #[test]
    fn test_exit_discounted_two_hours() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, 120, true));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let receipt = service.process_exit("ABCDEF").unwrap();
        assert_close(receipt.price, 2.85);
    }

    #[test]
    fn test_exit_without_ticket() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::new();
        let service = ParkingService::new(&directory, &tickets);

        let err = service.process_exit("UNKNOWN").unwrap_err();

        assert!(matches!(err, ParkingError::TicketNotFound(ref v) if v == "UNKNOWN"));
        assert!(tickets.updated.borrow().is_empty());
        assert!(directory.availability_calls.borrow().is_empty());
    }

    #[test]
    fn test_exit_update_failure_keeps_spot_taken() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore {
            update_result: false,
            ..RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, 60, false))
        };
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let err = service.process_exit("ABCDEF").unwrap_err();

        assert!(matches!(err, ParkingError::TicketUpdateFailed(1)));
        assert_eq!(tickets.updated.borrow().len(), 1);
        assert!(directory.availability_calls.borrow().is_empty());
    }

    #[test]
    fn test_exit_clock_before_entry_fails_fare() {
        let directory = RecordingDirectory::with_spot(None);
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, -10, false));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let err = service.process_exit("ABCDEF").unwrap_err();

        assert!(matches!(err, ParkingError::FareComputationFailed(_)));
        assert!(tickets.updated.borrow().is_empty());
        assert!(directory.availability_calls.borrow().is_empty());
    }

    #[test]
    fn test_exit_release_not_confirmed_still_closes_ticket() {
        let directory = RecordingDirectory {
            set_result: false,
            ..RecordingDirectory::with_spot(None)
        };
        let tickets = RecordingTicketStore::with_open_ticket(parked(VehicleCategory::Car, 60, false));
        let service = ParkingService::with_clock(&directory, &tickets, FixedClock(now()));

        let receipt = service.process_exit("ABCDEF").unwrap();

        assert!(!receipt.spot_released);
        assert_eq!(tickets.updated.borrow().len(), 1);
    }

    // ------------------------------------------------------------------------
    // Full visit against the in-memory collaborators
    // ------------------------------------------------------------------------

    #[test]
    fn test_two_visits_second_is_discounted() {
        let directory = InMemorySpotDirectory::with_layout(1, 1);
        let tickets = InMemoryTicketStore::new(1);

        let morning = now() - Duration::hours(5);
        let service = ParkingService::with_clock(directory.clone(), tickets.clone(), FixedClock(morning));
        let first = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap();
        assert!(!first.discount);
        assert!(!directory.get(1).unwrap().available);

        // Second car is turned away while the only car spot is taken
        let err = service.process_entry(VehicleCategory::Car, "OTHER").unwrap_err();
        assert!(matches!(err, ParkingError::LotFull(VehicleCategory::Car)));

        let service = ParkingService::with_clock(
            directory.clone(),
            tickets.clone(),
            FixedClock(morning + Duration::hours(1)),
        );
        let receipt = service.process_exit("ABCDEF").unwrap();
        assert_close(receipt.price, 1.5);
        assert!(directory.get(1).unwrap().available);

        let service = ParkingService::with_clock(directory.clone(), tickets.clone(), FixedClock(now()));
        let second = service.process_entry(VehicleCategory::Car, "ABCDEF").unwrap();
        assert!(second.discount);
        assert_ne!(second.id, first.id);

        let history = tickets.tickets_for_vehicle("ABCDEF");
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_open());
        assert!(history[1].is_open());
    }
}
