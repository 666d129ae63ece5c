use thiserror::Error;

use crate::models::parcel::ParcelSize;

/// Errors decoded once at the network boundary. Call sites match on the
/// variant instead of re-parsing response bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no available slots of the requested size in the selected locker")]
    SlotExhausted,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// Backend rejected the request and provided a `detail` message.
    #[error("{0}")]
    Backend(String),

    /// Backend rejected the request without a usable body.
    #[error("request failed with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Inline message shown to the user. Backend `detail` strings propagate
    /// verbatim; errors with no detail fall back to the caller's message,
    /// the way each screen of the original UI worded its own failure.
    pub fn user_message_or(&self, fallback: &str) -> String {
        match self {
            ApiError::SlotExhausted => {
                "Brak dostępnych skrytek o wybranym rozmiarze w wybranym paczkomacie.".to_string()
            }
            ApiError::Unauthorized => "Brak autoryzacji. Zaloguj się ponownie.".to_string(),
            ApiError::NotFound(detail) | ApiError::Backend(detail) => detail.clone(),
            ApiError::Transport(_) => "Błąd połączenia z serwerem".to_string(),
            ApiError::Status(_) | ApiError::Decode(_) => fallback.to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        self.user_message_or("Wystąpił nieznany błąd")
    }

    /// Stable label for the error-counter metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::SlotExhausted => "slot_exhausted",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Backend(_) => "backend",
            ApiError::Status(_) => "status",
            ApiError::Transport(_) => "transport",
            ApiError::Decode(_) => "decode",
        }
    }
}

/// Outcomes of the local slot-availability pre-check. All of these resolve
/// client-side with no network call and no retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvailabilityError {
    #[error("no locker selected")]
    NothingSelected,

    #[error("locker {0} not present in the fetched list")]
    LockerNotFound(i64),

    #[error("no availability information for size {size}")]
    AvailabilityUnknown { size: ParcelSize },

    #[error("no free slots of size {size}")]
    NoFreeSlots { size: ParcelSize },
}

impl AvailabilityError {
    pub fn user_message(&self) -> String {
        match self {
            AvailabilityError::NothingSelected => {
                "Wybierz paczkomat i rozmiar paczki".to_string()
            }
            AvailabilityError::LockerNotFound(_) => {
                "Nie znaleziono wybranego paczkomatu".to_string()
            }
            AvailabilityError::AvailabilityUnknown { size } => format!(
                "Brak informacji o dostępnych skrytkach rozmiaru {size} w wybranym paczkomacie."
            ),
            AvailabilityError::NoFreeSlots { size } => {
                format!("Brak dostępnych skrytek rozmiaru {size} w wybranym paczkomacie.")
            }
        }
    }
}
