// 🎫 Ticket Entity
//
// One ticket per visit. Created at entry with price 0 and no exit time,
// closed exactly once at exit (price and exit time are set together).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spot::ParkingSpot;

/// Ticket id as assigned by the ticket store (0 until persisted)
pub type TicketId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,

    /// Snapshot of the spot at entry time
    pub spot: ParkingSpot,

    pub vehicle_id: String,

    /// Only meaningful once `exit_time` is set
    pub price: f64,

    pub entry_time: DateTime<Utc>,

    /// None while the vehicle is still parked
    pub exit_time: Option<DateTime<Utc>>,

    /// Loyalty discount, fixed at creation
    pub discount: bool,
}

impl Ticket {
    /// Open a new, not yet persisted, ticket
    pub fn open(
        spot: ParkingSpot,
        vehicle_id: impl Into<String>,
        entry_time: DateTime<Utc>,
        discount: bool,
    ) -> Self {
        Ticket {
            id: 0,
            spot,
            vehicle_id: vehicle_id.into(),
            price: 0.0,
            entry_time,
            exit_time: None,
            discount,
        }
    }

    /// Vehicle still parked
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Set exit time and price together
    pub fn close(&mut self, exit_time: DateTime<Utc>, price: f64) {
        self.exit_time = Some(exit_time);
        self.price = price;
    }

    /// Length of the stay, if the ticket is closed
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::VehicleCategory;
    use chrono::Duration;

    #[test]
    fn test_open_ticket_defaults() {
        let now = Utc::now();
        let ticket = Ticket::open(ParkingSpot::new(3, VehicleCategory::Car, false), "AB-123-CD", now, true);

        assert_eq!(ticket.id, 0);
        assert_eq!(ticket.price, 0.0);
        assert!(ticket.is_open());
        assert!(ticket.discount);
        assert_eq!(ticket.duration(), None);
    }

    #[test]
    fn test_close_sets_price_and_exit_time() {
        let entry = Utc::now() - Duration::minutes(90);
        let mut ticket = Ticket::open(ParkingSpot::new(4, VehicleCategory::Bike, false), "BIKE-1", entry, false);

        let exit = entry + Duration::minutes(90);
        ticket.close(exit, 1.5);

        assert!(!ticket.is_open());
        assert_eq!(ticket.price, 1.5);
        assert_eq!(ticket.duration(), Some(Duration::minutes(90)));
    }
}
