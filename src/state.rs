use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::models::locker::ParcelLocker;
use crate::models::parcel::{Parcel, ParcelStatus};
use crate::models::user::User;
use crate::observability::metrics::Metrics;

/// Dashboard tabs over the parcel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusTab {
    #[default]
    All,
    InTransit,
    Preparing,
    AwaitingPickup,
    Delivered,
}

/// Client-side cache of backend state, owned by one session.
///
/// Mutations go through the explicit entry points below: lists are replaced
/// wholesale on refetch, a new parcel is prepended after a confirmed create,
/// and a parcel's status is patched after a confirmed status update. Nothing
/// here recomputes slot availability; the locker snapshot is authoritative
/// only as of the last fetch.
pub struct AppState {
    pub lockers: DashMap<i64, ParcelLocker>,
    parcels: RwLock<Vec<Parcel>>,
    users: RwLock<Vec<User>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            lockers: DashMap::new(),
            parcels: RwLock::new(Vec::new()),
            users: RwLock::new(Vec::new()),
            metrics: Metrics::new(),
        }
    }

    pub fn replace_lockers(&self, lockers: Vec<ParcelLocker>) {
        self.lockers.clear();
        for locker in lockers {
            self.lockers.insert(locker.id, locker);
        }
    }

    pub fn locker(&self, id: i64) -> Option<ParcelLocker> {
        self.lockers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn lockers_snapshot(&self) -> Vec<ParcelLocker> {
        self.lockers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub async fn replace_users(&self, users: Vec<User>) {
        *self.users.write().await = users;
    }

    pub async fn users_snapshot(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    /// Replaces the parcel list, newest first.
    pub async fn replace_parcels(&self, mut parcels: Vec<Parcel>) {
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        *self.parcels.write().await = parcels;
    }

    /// Prepends a freshly created parcel. Only the submission flow calls
    /// this, and only after the backend confirmed the create.
    pub async fn insert_parcel(&self, parcel: Parcel) {
        self.parcels.write().await.insert(0, parcel);
    }

    /// Patches one parcel's status after a confirmed backend transition.
    /// Returns false when the tracking number is not in the cache.
    pub async fn set_parcel_status(&self, tracking_number: &str, status: ParcelStatus) -> bool {
        let mut parcels = self.parcels.write().await;
        match parcels
            .iter_mut()
            .find(|parcel| parcel.tracking_number == tracking_number)
        {
            Some(parcel) => {
                parcel.status = status;
                parcel.status_display = None;
                true
            }
            None => false,
        }
    }

    pub async fn parcels_snapshot(&self) -> Vec<Parcel> {
        self.parcels.read().await.clone()
    }

    /// Tab filter plus substring search over tracking number, locker name
    /// and both usernames, mirroring the dashboard list.
    pub async fn parcels_filtered(&self, tab: StatusTab, search: &str) -> Vec<Parcel> {
        let needle = search.to_lowercase();
        self.parcels
            .read()
            .await
            .iter()
            .filter(|parcel| matches_tab(parcel, tab) && matches_search(parcel, &needle))
            .cloned()
            .collect()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_tab(parcel: &Parcel, tab: StatusTab) -> bool {
    match tab {
        StatusTab::All => true,
        StatusTab::InTransit => parcel.status == ParcelStatus::InTransit,
        StatusTab::Preparing => parcel.status == ParcelStatus::Preparing,
        StatusTab::AwaitingPickup => parcel.status == ParcelStatus::AwaitingPickup,
        StatusTab::Delivered => parcel.status == ParcelStatus::Delivered,
    }
}

fn matches_search(parcel: &Parcel, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    let mut haystacks = vec![parcel.tracking_number.to_lowercase()];
    if let Some(name) = &parcel.parcel_locker_name {
        haystacks.push(name.to_lowercase());
    }
    if let Some(sender) = &parcel.sender_username {
        haystacks.push(sender.to_lowercase());
    }
    if let Some(receiver) = &parcel.receiver_username {
        haystacks.push(receiver.to_lowercase());
    }

    haystacks.iter().any(|value| value.contains(needle))
}
