use crate::error::AvailabilityError;
use crate::models::parcel::ParcelSize;
use crate::state::AppState;

/// Local pre-check against the cached locker list: does the selected locker
/// report a free slot of the requested size?
///
/// Purely advisory. It reads the last fetched snapshot without re-fetching,
/// so a pass here can still lose the race against a concurrent sender; the
/// authoritative check happens server-side at creation time.
pub fn check_slot_availability(
    state: &AppState,
    locker_id: Option<i64>,
    size: ParcelSize,
) -> Result<(), AvailabilityError> {
    let locker_id = locker_id.ok_or(AvailabilityError::NothingSelected)?;

    let locker = state
        .locker(locker_id)
        .ok_or(AvailabilityError::LockerNotFound(locker_id))?;

    let free = locker
        .available_slots_by_size
        .as_ref()
        .and_then(|by_size| by_size.get(&size).copied())
        .ok_or(AvailabilityError::AvailabilityUnknown { size })?;

    if free <= 0 {
        return Err(AvailabilityError::NoFreeSlots { size });
    }

    Ok(())
}
