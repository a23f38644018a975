// Collaborator interfaces used by the parking workflow
//
// SpotDirectory and TicketStore are the systems of record; the workflow only
// holds transient copies for the duration of one entry or exit.
// This module also carries in-memory implementations, shaped like the
// registries in `entities` (shared `Arc<RwLock<Vec<_>>>`).

use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};

use crate::entities::{ParkingSpot, Ticket, TicketId, VehicleCategory};

// ============================================================================
// TRAITS
// ============================================================================

pub trait SpotDirectory {
    /// Number of the next available spot of `category`, None when the lot is full
    fn find_available(&self, category: VehicleCategory) -> Result<Option<u32>>;

    /// Flip the availability flag. Ok(false) when no spot was changed.
    fn set_availability(&self, spot_number: u32, available: bool) -> Result<bool>;
}

pub trait TicketStore {
    /// Whether this vehicle qualifies for the loyalty discount
    fn is_recurring_user(&self, vehicle_id: &str) -> Result<bool>;

    /// Persist a new ticket, returning its assigned id
    fn create_ticket(&self, ticket: &Ticket) -> Result<TicketId>;

    /// Most recent ticket for the vehicle that has no exit time yet
    fn find_open_ticket(&self, vehicle_id: &str) -> Result<Option<Ticket>>;

    /// Persist price and exit time. Ok(false) unless exactly one ticket changed.
    fn update_on_exit(&self, ticket: &Ticket) -> Result<bool>;
}

impl<T: SpotDirectory + ?Sized> SpotDirectory for &T {
    fn find_available(&self, category: VehicleCategory) -> Result<Option<u32>> {
        (**self).find_available(category)
    }

    fn set_availability(&self, spot_number: u32, available: bool) -> Result<bool> {
        (**self).set_availability(spot_number, available)
    }
}

impl<T: TicketStore + ?Sized> TicketStore for &T {
    fn is_recurring_user(&self, vehicle_id: &str) -> Result<bool> {
        (**self).is_recurring_user(vehicle_id)
    }

    fn create_ticket(&self, ticket: &Ticket) -> Result<TicketId> {
        (**self).create_ticket(ticket)
    }

    fn find_open_ticket(&self, vehicle_id: &str) -> Result<Option<Ticket>> {
        (**self).find_open_ticket(vehicle_id)
    }

    fn update_on_exit(&self, ticket: &Ticket) -> Result<bool> {
        (**self).update_on_exit(ticket)
    }
}

// ============================================================================
// IN-MEMORY SPOT DIRECTORY
// ============================================================================

/// Spot directory held in memory. Clones share the same spots.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpotDirectory {
    spots: Arc<RwLock<Vec<ParkingSpot>>>,
}

impl InMemorySpotDirectory {
    pub fn new(spots: Vec<ParkingSpot>) -> Self {
        InMemorySpotDirectory {
            spots: Arc::new(RwLock::new(spots)),
        }
    }

    /// `cars` car spots numbered from 1, followed by `bikes` bike spots
    pub fn with_layout(cars: u32, bikes: u32) -> Self {
        let spots = (1..=cars)
            .map(|n| ParkingSpot::new(n, VehicleCategory::Car, true))
            .chain((cars + 1..=cars + bikes).map(|n| ParkingSpot::new(n, VehicleCategory::Bike, true)))
            .collect();
        Self::new(spots)
    }

    pub fn get(&self, spot_number: u32) -> Option<ParkingSpot> {
        self.spots
            .read()
            .ok()?
            .iter()
            .find(|s| s.number == spot_number)
            .copied()
    }

    pub fn all(&self) -> Vec<ParkingSpot> {
        self.spots.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SpotDirectory for InMemorySpotDirectory {
    fn find_available(&self, category: VehicleCategory) -> Result<Option<u32>> {
        let spots = self.spots.read().map_err(|_| anyhow!("spot directory lock poisoned"))?;
        Ok(spots
            .iter()
            .filter(|s| s.category == category && s.available)
            .map(|s| s.number)
            .min())
    }

    fn set_availability(&self, spot_number: u32, available: bool) -> Result<bool> {
        let mut spots = self.spots.write().map_err(|_| anyhow!("spot directory lock poisoned"))?;
        match spots.iter_mut().find(|s| s.number == spot_number) {
            Some(spot) => {
                spot.available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// IN-MEMORY TICKET STORE
// ============================================================================

/// Ticket store held in memory. Clones share the same tickets.
///
/// A vehicle is recurring once it has `recurring_threshold` completed visits.
#[derive(Debug, Clone)]
pub struct InMemoryTicketStore {
    tickets: Arc<RwLock<Vec<Ticket>>>,
    recurring_threshold: usize,
}

impl Default for InMemoryTicketStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryTicketStore {
    pub fn new(recurring_threshold: usize) -> Self {
        InMemoryTicketStore {
            tickets: Arc::new(RwLock::new(Vec::new())),
            recurring_threshold,
        }
    }

    /// Every ticket ever created, oldest first
    pub fn all(&self) -> Vec<Ticket> {
        self.tickets.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn tickets_for_vehicle(&self, vehicle_id: &str) -> Vec<Ticket> {
        self.all()
            .into_iter()
            .filter(|t| t.vehicle_id == vehicle_id)
            .collect()
    }
}

impl TicketStore for InMemoryTicketStore {
    fn is_recurring_user(&self, vehicle_id: &str) -> Result<bool> {
        let tickets = self.tickets.read().map_err(|_| anyhow!("ticket store lock poisoned"))?;
        let completed = tickets
            .iter()
            .filter(|t| t.vehicle_id == vehicle_id && !t.is_open())
            .count();
        Ok(completed >= self.recurring_threshold)
    }

    fn create_ticket(&self, ticket: &Ticket) -> Result<TicketId> {
        let mut tickets = self.tickets.write().map_err(|_| anyhow!("ticket store lock poisoned"))?;
        let id = tickets.len() as TicketId + 1;
        let mut stored = ticket.clone();
        stored.id = id;
        tickets.push(stored);
        Ok(id)
    }

    fn find_open_ticket(&self, vehicle_id: &str) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().map_err(|_| anyhow!("ticket store lock poisoned"))?;
        Ok(tickets
            .iter()
            .filter(|t| t.vehicle_id == vehicle_id && t.is_open())
            .max_by_key(|t| t.entry_time)
            .cloned())
    }

    fn update_on_exit(&self, ticket: &Ticket) -> Result<bool> {
        let mut tickets = self.tickets.write().map_err(|_| anyhow!("ticket store lock poisoned"))?;
        match tickets.iter_mut().find(|t| t.id == ticket.id && t.is_open()) {
            Some(stored) => {
                stored.price = ticket.price;
                stored.exit_time = ticket.exit_time;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_find_available_returns_lowest_free_spot_of_category() {
        let directory = InMemorySpotDirectory::with_layout(3, 2);

        assert_eq!(directory.find_available(VehicleCategory::Car).unwrap(), Some(1));
        assert_eq!(directory.find_available(VehicleCategory::Bike).unwrap(), Some(4));

        assert!(directory.set_availability(1, false).unwrap());
        assert_eq!(directory.find_available(VehicleCategory::Car).unwrap(), Some(2));
    }

    #[test]
    fn test_full_category_reports_none() {
        let directory = InMemorySpotDirectory::with_layout(1, 1);
        directory.set_availability(2, false).unwrap();

        assert_eq!(directory.find_available(VehicleCategory::Bike).unwrap(), None);
        assert_eq!(directory.find_available(VehicleCategory::Car).unwrap(), Some(1));
    }

    #[test]
    fn test_set_availability_on_unknown_spot() {
        let directory = InMemorySpotDirectory::with_layout(1, 0);
        assert!(!directory.set_availability(42, false).unwrap());
    }

    #[test]
    fn test_ticket_lifecycle_and_recurrence() {
        let store = InMemoryTicketStore::new(1);
        let spot = ParkingSpot::new(1, VehicleCategory::Car, false);
        let entry = Utc::now() - Duration::hours(2);

        assert!(!store.is_recurring_user("AB-123").unwrap());

        let id = store.create_ticket(&Ticket::open(spot, "AB-123", entry, false)).unwrap();
        assert_eq!(id, 1);

        // An open ticket does not count as a visit
        assert!(!store.is_recurring_user("AB-123").unwrap());

        let mut open = store.find_open_ticket("AB-123").unwrap().unwrap();
        assert_eq!(open.id, 1);

        open.close(Utc::now(), 3.0);
        assert!(store.update_on_exit(&open).unwrap());

        // Closing twice changes nothing
        assert!(!store.update_on_exit(&open).unwrap());

        assert!(store.find_open_ticket("AB-123").unwrap().is_none());
        assert!(store.is_recurring_user("AB-123").unwrap());
        assert!(!store.is_recurring_user("ZZ-999").unwrap());
    }

    #[test]
    fn test_recurring_threshold() {
        let store = InMemoryTicketStore::new(2);
        let spot = ParkingSpot::new(1, VehicleCategory::Car, false);

        for visit in 0..2 {
            let entry = Utc::now() - Duration::hours(3 - visit);
            store.create_ticket(&Ticket::open(spot, "AB-123", entry, false)).unwrap();
            let mut open = store.find_open_ticket("AB-123").unwrap().unwrap();
            open.close(entry + Duration::minutes(40), 1.0);
            store.update_on_exit(&open).unwrap();

            assert_eq!(store.is_recurring_user("AB-123").unwrap(), visit == 1);
        }

        assert_eq!(store.tickets_for_vehicle("AB-123").len(), 2);
    }
}
