use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::BackendClient;
use crate::config::FlowTimings;
use crate::error::ApiError;
use crate::flows::status::StatusSynchronizer;
use crate::flows::wait::WaitStrategy;
use crate::models::parcel::ParcelStatus;
use crate::state::AppState;

const STATUS_UPDATE_FALLBACK: &str = "Nie udało się zaktualizować statusu paczki";
const PICKUP_CODE_FALLBACK: &str = "Nie udało się pobrać kodu odbioru";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupMethod {
    Qr,
    Code,
    RemoteUnlock,
}

impl PickupMethod {
    fn as_str(&self) -> &'static str {
        match self {
            PickupMethod::Qr => "qr",
            PickupMethod::Code => "code",
            PickupMethod::RemoteUnlock => "remote_unlock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupPhase {
    /// Method chooser.
    Select,
    /// QR screen: simulated scan or payload generation.
    Qr,
    /// Generated QR payload is on screen; delivery confirmation pending.
    QrDisplayed,
    /// Numeric-code screen before the code was requested.
    Code,
    /// One-time code is on screen; delivery confirmation pending.
    CodeDisplayed,
    /// Remote-unlock screen.
    RemoteUnlock,
    ThankYou,
    Closed,
}

#[derive(Debug, Error)]
pub enum PickupError {
    #[error("step not available in phase {0:?}")]
    WrongPhase(PickupPhase),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Default)]
struct PickupScreen {
    phase: Option<PickupPhase>,
    message: Option<String>,
    pickup_code: Option<String>,
    qr_payload: Option<String>,
    qr_scanned: bool,
}

/// One pickup modal instance for one tracking number.
///
/// The three methods are mutually exclusive while active; `back_to_select`
/// returns to the chooser and invalidates anything the abandoned sub-flow
/// still had in flight. Every suspend-then-act step captures the epoch
/// before waiting and re-checks it afterwards, so a timer that outlives its
/// screen never touches the network or shared state.
pub struct PickupFlow {
    api: Arc<BackendClient>,
    state: Arc<AppState>,
    sync: StatusSynchronizer,
    wait: Arc<dyn WaitStrategy>,
    timings: FlowTimings,
    tracking_number: String,
    screen: RwLock<PickupScreen>,
    epoch: AtomicU64,
}

impl PickupFlow {
    pub fn new(
        api: Arc<BackendClient>,
        state: Arc<AppState>,
        wait: Arc<dyn WaitStrategy>,
        timings: FlowTimings,
        tracking_number: impl Into<String>,
    ) -> Self {
        let sync = StatusSynchronizer::new(api.clone());
        Self {
            api,
            state,
            sync,
            wait,
            timings,
            tracking_number: tracking_number.into(),
            screen: RwLock::new(PickupScreen {
                phase: Some(PickupPhase::Select),
                ..PickupScreen::default()
            }),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub async fn phase(&self) -> PickupPhase {
        self.screen.read().await.phase.unwrap_or(PickupPhase::Closed)
    }

    pub async fn message(&self) -> Option<String> {
        self.screen.read().await.message.clone()
    }

    pub async fn pickup_code(&self) -> Option<String> {
        self.screen.read().await.pickup_code.clone()
    }

    pub async fn qr_payload(&self) -> Option<String> {
        self.screen.read().await.qr_payload.clone()
    }

    pub async fn qr_scanned(&self) -> bool {
        self.screen.read().await.qr_scanned
    }

    /// Picks a method from the chooser.
    pub async fn choose(&self, method: PickupMethod) -> Result<(), PickupError> {
        let mut screen = self.screen.write().await;
        match screen.phase {
            Some(PickupPhase::Select) => {
                screen.phase = Some(match method {
                    PickupMethod::Qr => PickupPhase::Qr,
                    PickupMethod::Code => PickupPhase::Code,
                    PickupMethod::RemoteUnlock => PickupPhase::RemoteUnlock,
                });
                screen.message = None;
                Ok(())
            }
            Some(other) => Err(PickupError::WrongPhase(other)),
            None => Err(PickupError::WrongPhase(PickupPhase::Closed)),
        }
    }

    /// Returns to the method chooser. Anything the abandoned sub-flow left
    /// pending becomes a no-op once its epoch check fails.
    pub async fn back_to_select(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut screen = self.screen.write().await;
        if screen.phase == Some(PickupPhase::Closed) {
            return;
        }
        *screen = PickupScreen {
            phase: Some(PickupPhase::Select),
            ..PickupScreen::default()
        };
        debug!(tracking_number = %self.tracking_number, "pickup back to method select");
    }

    /// Closes the modal. In-flight timers are orphaned and will not mutate
    /// state when they fire.
    pub async fn close(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.screen.write().await.phase = Some(PickupPhase::Closed);
        debug!(tracking_number = %self.tracking_number, "pickup modal closed");
    }

    /// Simulated local QR scan: a wait and a flag flip, no server call.
    pub async fn scan_qr(&self) -> Result<(), PickupError> {
        let epoch = self.begin(PickupPhase::Qr).await?;

        self.wait.wait(self.timings.scan).await;
        if !self.is_current(epoch) {
            return Ok(());
        }

        let mut screen = self.screen.write().await;
        screen.qr_scanned = true;
        screen.message =
            Some("Kod QR zeskanowany pomyślnie! Paczka została odebrana.".to_string());
        Ok(())
    }

    /// Generates the scannable payload, keeps it on screen for the display
    /// window, then confirms delivery.
    pub async fn generate_qr(&self) -> Result<(), PickupError> {
        let epoch = self.begin(PickupPhase::Qr).await?;

        {
            let mut screen = self.screen.write().await;
            screen.qr_payload = Some(self.tracking_number.clone());
            screen.phase = Some(PickupPhase::QrDisplayed);
        }

        self.wait.wait(self.timings.code_display).await;
        if !self.is_current(epoch) {
            return Ok(());
        }

        self.confirm_delivery(epoch, PickupMethod::Qr).await
    }

    /// Requests the one-time pickup code, shows it for the display window,
    /// then confirms delivery. The display and the status mutation are
    /// coupled by time only, not by any user action.
    pub async fn request_code(&self) -> Result<(), PickupError> {
        let epoch = self.begin(PickupPhase::Code).await?;

        let code = match self.api.get_pickup_code(&self.tracking_number).await {
            Ok(code) => code,
            Err(err) => {
                return self
                    .fail(epoch, PickupMethod::Code, err, PICKUP_CODE_FALLBACK)
                    .await;
            }
        };
        if !self.is_current(epoch) {
            return Ok(());
        }

        {
            let mut screen = self.screen.write().await;
            screen.pickup_code = Some(code);
            screen.phase = Some(PickupPhase::CodeDisplayed);
        }

        self.wait.wait(self.timings.code_display).await;
        if !self.is_current(epoch) {
            return Ok(());
        }

        self.confirm_delivery(epoch, PickupMethod::Code).await
    }

    /// Remote unlock: confirm delivery first, then hold the screen for the
    /// unlock window before thanking the user.
    pub async fn remote_unlock(&self) -> Result<(), PickupError> {
        let epoch = self.begin(PickupPhase::RemoteUnlock).await?;

        if let Err(err) = self.sync.mark_delivered(&self.tracking_number).await {
            return self
                .fail(epoch, PickupMethod::RemoteUnlock, err, STATUS_UPDATE_FALLBACK)
                .await;
        }
        if !self.is_current(epoch) {
            return Ok(());
        }
        self.state
            .set_parcel_status(&self.tracking_number, ParcelStatus::Delivered)
            .await;
        self.record_pickup(PickupMethod::RemoteUnlock, "success");
        info!(tracking_number = %self.tracking_number, method = "remote_unlock", "parcel picked up");

        self.wait.wait(self.timings.code_display).await;
        if !self.is_current(epoch) {
            return Ok(());
        }

        self.thank_you_and_close(epoch).await;
        Ok(())
    }

    /// Asks the backend to pop the slot door open without changing the
    /// parcel status. Used by the locker-side opener screen.
    pub async fn open_locker(&self) -> Result<(), PickupError> {
        let epoch = self.begin(PickupPhase::RemoteUnlock).await?;

        match self.api.open_locker(&self.tracking_number).await {
            Ok(()) => {
                if self.is_current(epoch) {
                    self.screen.write().await.message =
                        Some("Skrytka została otwarta! Możesz odebrać paczkę.".to_string());
                }
                Ok(())
            }
            Err(err) => {
                self.fail(
                    epoch,
                    PickupMethod::RemoteUnlock,
                    err,
                    "Błąd otwierania skrytki",
                )
                .await
            }
        }
    }

    async fn begin(&self, expected: PickupPhase) -> Result<u64, PickupError> {
        let mut screen = self.screen.write().await;
        let phase = screen.phase.unwrap_or(PickupPhase::Closed);
        if phase != expected {
            return Err(PickupError::WrongPhase(phase));
        }
        screen.message = None;
        Ok(self.epoch.load(Ordering::SeqCst))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Shared tail of the QR and numeric-code sub-flows: one status update
    /// through the synchronizer, then the local patch and the thank-you
    /// screen.
    async fn confirm_delivery(&self, epoch: u64, method: PickupMethod) -> Result<(), PickupError> {
        if let Err(err) = self.sync.mark_delivered(&self.tracking_number).await {
            return self.fail(epoch, method, err, STATUS_UPDATE_FALLBACK).await;
        }
        if !self.is_current(epoch) {
            // Delivered server-side, but this modal is gone; leave the
            // shared cache to the next refetch.
            return Ok(());
        }

        self.state
            .set_parcel_status(&self.tracking_number, ParcelStatus::Delivered)
            .await;
        self.record_pickup(method, "success");
        info!(
            tracking_number = %self.tracking_number,
            method = method.as_str(),
            "parcel picked up"
        );

        self.thank_you_and_close(epoch).await;
        Ok(())
    }

    async fn thank_you_and_close(&self, epoch: u64) {
        self.screen.write().await.phase = Some(PickupPhase::ThankYou);
        self.wait.wait(self.timings.thank_you).await;
        if self.is_current(epoch) {
            self.screen.write().await.phase = Some(PickupPhase::Closed);
        }
    }

    /// Halts the sub-flow at its current step: the message is set, nothing
    /// is rolled back, nothing retries. An already-issued code or QR
    /// payload stays as it is.
    async fn fail(
        &self,
        epoch: u64,
        method: PickupMethod,
        err: ApiError,
        fallback: &str,
    ) -> Result<(), PickupError> {
        self.record_pickup(method, "error");
        self.state
            .metrics
            .backend_errors_total
            .with_label_values(&[err.kind()])
            .inc();
        if self.is_current(epoch) {
            self.screen.write().await.message = Some(err.user_message_or(fallback));
        }
        Err(err.into())
    }

    fn record_pickup(&self, method: PickupMethod, outcome: &str) {
        self.state
            .metrics
            .pickups_total
            .with_label_values(&[method.as_str(), outcome])
            .inc();
    }
}
