use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{BackendClient, CreateParcelRequest};
use crate::config::FlowTimings;
use crate::error::{ApiError, AvailabilityError};
use crate::flows::availability::check_slot_availability;
use crate::flows::wait::WaitStrategy;
use crate::models::parcel::{Parcel, ParcelSize, ParcelStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Checking,
    Inserting,
    Success,
}

/// The send-parcel form as the user filled it in.
#[derive(Debug, Clone)]
pub struct ParcelForm {
    pub tracking_number: String,
    pub parcel_locker: Option<i64>,
    pub size: ParcelSize,
    pub receiver: i64,
    pub pickup_code: String,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] AvailabilityError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SubmissionError {
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Validation(err) => err.user_message(),
            SubmissionError::Api(err) => err.user_message_or("Nie udało się nadać paczki"),
        }
    }
}

/// Drives one send-parcel attempt through
/// `Idle → Checking → Inserting → (Success | Idle)`.
///
/// `Checking` is the local availability pre-check; `Inserting` is the
/// simulated hardware insertion wait, after which exactly one creation
/// request fires. Any failure lands back in `Idle` with a user-facing
/// message; the user resubmits from scratch (the insertion wait is not
/// retried on its own).
pub struct SubmissionFlow {
    api: Arc<BackendClient>,
    state: Arc<AppState>,
    wait: Arc<dyn WaitStrategy>,
    timings: FlowTimings,
    phase: SubmissionPhase,
    message: Option<String>,
}

impl SubmissionFlow {
    pub fn new(
        api: Arc<BackendClient>,
        state: Arc<AppState>,
        wait: Arc<dyn WaitStrategy>,
        timings: FlowTimings,
    ) -> Self {
        Self {
            api,
            state,
            wait,
            timings,
            phase: SubmissionPhase::Idle,
            message: None,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub async fn submit(&mut self, form: ParcelForm) -> Result<Parcel, SubmissionError> {
        self.message = None;
        self.phase = SubmissionPhase::Checking;

        if let Err(err) = check_slot_availability(&self.state, form.parcel_locker, form.size) {
            self.phase = SubmissionPhase::Idle;
            self.message = Some(err.user_message());
            self.state
                .metrics
                .submissions_total
                .with_label_values(&["rejected_locally"])
                .inc();
            return Err(err.into());
        }

        // The pre-check guarantees the locker id is present.
        let locker_id = form
            .parcel_locker
            .ok_or(AvailabilityError::NothingSelected)?;

        self.phase = SubmissionPhase::Inserting;
        let started = Instant::now();
        self.wait.wait(self.timings.insertion).await;

        let request = CreateParcelRequest {
            tracking_number: form.tracking_number,
            parcel_locker: locker_id,
            size: form.size,
            receiver: form.receiver,
            pickup_code: form.pickup_code,
            status: ParcelStatus::AwaitingPickup,
        };

        match self.api.create_parcel(&request).await {
            Ok(parcel) => {
                self.state.insert_parcel(parcel.clone()).await;
                self.phase = SubmissionPhase::Success;
                self.record_outcome("success", started);
                info!(
                    tracking_number = %parcel.tracking_number,
                    locker_id,
                    size = %parcel.size,
                    "parcel created"
                );

                // Confirmation screen stays up briefly, then the modal
                // closes on its own.
                self.wait.wait(self.timings.confirmation).await;
                self.phase = SubmissionPhase::Idle;
                Ok(parcel)
            }
            Err(err) => {
                self.phase = SubmissionPhase::Idle;
                let outcome = match &err {
                    // The pre-check passed but another sender took the last
                    // slot between check and submit.
                    ApiError::SlotExhausted => "slot_exhausted",
                    _ => "error",
                };
                self.message = Some(err.user_message_or("Nie udało się nadać paczki"));
                self.record_outcome(outcome, started);
                self.state
                    .metrics
                    .backend_errors_total
                    .with_label_values(&[err.kind()])
                    .inc();
                warn!(locker_id, error = %err, "parcel creation failed");
                Err(err.into())
            }
        }
    }

    fn record_outcome(&self, outcome: &str, started: Instant) {
        self.state
            .metrics
            .submissions_total
            .with_label_values(&[outcome])
            .inc();
        self.state
            .metrics
            .submission_duration_seconds
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::flows::wait::NoWait;

    fn flow_with_empty_cache() -> SubmissionFlow {
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        SubmissionFlow::new(
            Arc::new(BackendClient::new(base)),
            Arc::new(AppState::new()),
            Arc::new(NoWait),
            FlowTimings::immediate(),
        )
    }

    fn form(locker: Option<i64>) -> ParcelForm {
        ParcelForm {
            tracking_number: "PL-123".to_string(),
            parcel_locker: locker,
            size: ParcelSize::Small,
            receiver: 2,
            pickup_code: "1234".to_string(),
        }
    }

    #[tokio::test]
    async fn validation_failure_returns_to_idle_without_network() {
        let mut flow = flow_with_empty_cache();

        let err = flow.submit(form(None)).await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Validation(AvailabilityError::NothingSelected)
        ));
        assert_eq!(flow.phase(), SubmissionPhase::Idle);
        assert_eq!(flow.message(), Some("Wybierz paczkomat i rozmiar paczki"));
    }

    #[tokio::test]
    async fn unknown_locker_fails_the_pre_check() {
        let mut flow = flow_with_empty_cache();

        let err = flow.submit(form(Some(7))).await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Validation(AvailabilityError::LockerNotFound(7))
        ));
        assert_eq!(flow.message(), Some("Nie znaleziono wybranego paczkomatu"));
    }
}
