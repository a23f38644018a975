// 🅿️ Parking Spot Entity
//
// Spots are seeded outside the workflow. The only thing that ever changes on a
// spot is its availability flag; the number and the vehicle category are fixed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::fare::FareError;

// ============================================================================
// VEHICLE CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleCategory {
    Car,
    Bike,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 2] = [VehicleCategory::Car, VehicleCategory::Bike];

    /// Storage / wire name (`CAR`, `BIKE`)
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "CAR",
            VehicleCategory::Bike => "BIKE",
        }
    }

    /// Map a menu selection (1 = car, 2 = bike) to a category
    pub fn from_selection(selection: u32) -> Option<Self> {
        match selection {
            1 => Some(VehicleCategory::Car),
            2 => Some(VehicleCategory::Bike),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleCategory {
    type Err = FareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CAR" => Ok(VehicleCategory::Car),
            "BIKE" => Ok(VehicleCategory::Bike),
            other => Err(FareError::UnknownCategory(other.to_string())),
        }
    }
}

// ============================================================================
// PARKING SPOT
// ============================================================================

/// A numbered spot restricted to one vehicle category.
///
/// Equality and hashing only look at `number`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParkingSpot {
    pub number: u32,
    pub category: VehicleCategory,
    pub available: bool,
}

impl ParkingSpot {
    pub fn new(number: u32, category: VehicleCategory, available: bool) -> Self {
        ParkingSpot {
            number,
            category,
            available,
        }
    }
}

impl PartialEq for ParkingSpot {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for ParkingSpot {}

impl Hash for ParkingSpot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state);
    }
}
