use std::sync::Arc;

use tracing::{info, warn};

use crate::api::BackendClient;
use crate::error::ApiError;
use crate::models::parcel::ParcelStatus;

/// The single place the pickup modal mutates server state. Every pickup
/// method funnels through [`mark_delivered`](Self::mark_delivered) before
/// declaring success, so one pickup means exactly one status update.
#[derive(Debug, Clone)]
pub struct StatusSynchronizer {
    api: Arc<BackendClient>,
}

impl StatusSynchronizer {
    pub fn new(api: Arc<BackendClient>) -> Self {
        Self { api }
    }

    /// Transitions the parcel to `delivered` by tracking number. On failure
    /// the backend's detail travels back verbatim to the calling sub-flow.
    pub async fn mark_delivered(&self, tracking_number: &str) -> Result<(), ApiError> {
        match self
            .api
            .update_status(tracking_number, ParcelStatus::Delivered)
            .await
        {
            Ok(()) => {
                info!(tracking_number, "parcel marked delivered");
                Ok(())
            }
            Err(err) => {
                warn!(tracking_number, error = %err, "status update failed");
                Err(err)
            }
        }
    }
}
