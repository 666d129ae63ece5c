use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::parcel::ParcelSize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A locker installation as returned by `GET /api/parcel_lockers/`.
///
/// `available_slots_by_size` is a server-computed snapshot taken at fetch
/// time. It may be absent entirely, or miss individual sizes; it is never
/// recomputed on the client and is stale after any mutating call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelLocker {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: bool,
    pub number_of_slots: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub available_slots_count: Option<i64>,
    #[serde(default)]
    pub available_slots_by_size: Option<HashMap<ParcelSize, i64>>,
}

impl ParcelLocker {
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerSlot {
    pub id: i64,
    pub parcel_locker: i64,
    #[serde(default)]
    pub parcel_locker_name: Option<String>,
    pub slot_number: String,
    pub size: ParcelSize,
    pub is_occupied: bool,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_snapshot_tolerates_missing_sizes() {
        let raw = serde_json::json!({
            "id": 3,
            "name": "PKO-Centrum",
            "location": "Warszawa, Marszałkowska 1",
            "latitude": 52.2297,
            "longitude": 21.0122,
            "status": true,
            "number_of_slots": 20,
            "created_at": "2025-01-15T08:00:00Z",
            "available_slots_by_size": { "small": 4, "large": 0 }
        });

        let locker: ParcelLocker = serde_json::from_value(raw).unwrap();
        let by_size = locker.available_slots_by_size.unwrap();
        assert_eq!(by_size.get(&ParcelSize::Small), Some(&4));
        assert_eq!(by_size.get(&ParcelSize::Large), Some(&0));
        assert!(!by_size.contains_key(&ParcelSize::Medium));
    }

    #[test]
    fn availability_snapshot_may_be_absent() {
        let raw = serde_json::json!({
            "id": 4,
            "name": "PKO-Praga",
            "location": "Warszawa, Targowa 12",
            "latitude": 52.2512,
            "longitude": 21.0336,
            "status": false,
            "number_of_slots": 12,
            "created_at": "2025-02-01T08:00:00Z"
        });

        let locker: ParcelLocker = serde_json::from_value(raw).unwrap();
        assert!(locker.available_slots_by_size.is_none());
    }
}
