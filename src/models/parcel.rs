use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::locker::LockerSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelSize {
    Small,
    Medium,
    Large,
}

impl ParcelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelSize::Small => "small",
            ParcelSize::Medium => "medium",
            ParcelSize::Large => "large",
        }
    }
}

impl fmt::Display for ParcelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Preparing,
    InTransit,
    AwaitingPickup,
    PickedUp,
    Delivered,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Preparing => "preparing",
            ParcelStatus::InTransit => "in_transit",
            ParcelStatus::AwaitingPickup => "awaiting_pickup",
            ParcelStatus::PickedUp => "picked_up",
            ParcelStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parcel as the backend serializes it. The backend owns the record; the
/// client holds a read-and-display copy that is stale after any mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: i64,
    pub tracking_number: String,
    pub parcel_locker: i64,
    #[serde(default)]
    pub parcel_locker_name: Option<String>,
    #[serde(default)]
    pub locker_slot: Option<i64>,
    #[serde(default)]
    pub locker_slot_info: Option<LockerSlot>,
    pub size: ParcelSize,
    pub status: ParcelStatus,
    #[serde(default)]
    pub status_display: Option<String>,
    pub sender: i64,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub receiver: i64,
    #[serde(default)]
    pub receiver_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEventType {
    Created,
    PlacedInLocker,
    PickedUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: i64,
    pub parcel: i64,
    pub event_type: DeliveryEventType,
    #[serde(default)]
    pub event_type_display: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// Parcel detail view: the parcel plus its delivery history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelDetail {
    #[serde(flatten)]
    pub parcel: Parcel,
    #[serde(default)]
    pub history: Vec<DeliveryEvent>,
}
