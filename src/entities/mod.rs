// Entity Models
//
// - ParkingSpot: identity is the spot number, category never changes
// - Ticket: one per visit, opened at entry, closed once at exit

pub mod spot;
pub mod ticket;

pub use spot::{ParkingSpot, VehicleCategory};
pub use ticket::{Ticket, TicketId};
