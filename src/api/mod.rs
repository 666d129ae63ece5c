use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::models::locker::ParcelLocker;
use crate::models::parcel::{Parcel, ParcelDetail, ParcelSize, ParcelStatus};
use crate::models::user::User;

/// Substrings the backend uses in `non_field_errors` when parcel creation
/// loses the race for the last free slot.
const SLOT_EXHAUSTED_MARKERS: [&str; 2] =
    ["No available slots of size", "in the selected locker"];

/// Typed client for the locker backend. All response bodies are decoded
/// here, including error bodies; callers only ever see [`ApiError`]
/// variants and never re-match on raw JSON.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateParcelRequest {
    pub tracking_number: String,
    pub parcel_locker: i64,
    pub size: ParcelSize,
    pub receiver: i64,
    pub pickup_code: String,
    pub status: ParcelStatus,
}

#[derive(Debug, Deserialize)]
struct PickupCodeBody {
    #[serde(default)]
    pickup_code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// List endpoints answer either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Plain(Vec<T>),
    Paginated { results: Vec<T> },
}

impl<T> ListEnvelope<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Plain(items) => items,
            ListEnvelope::Paginated { results } => results,
        }
    }
}

impl BackendClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn with_http_client(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Decode(format!("invalid endpoint {path}: {err}")))
    }

    pub async fn list_lockers(&self) -> Result<Vec<ParcelLocker>, ApiError> {
        let url = self.endpoint("/api/parcel_lockers/")?;
        debug!(%url, "fetching parcel lockers");
        let response = self.http.get(url).send().await?;
        let envelope: ListEnvelope<ParcelLocker> = read_json(response).await?;
        Ok(envelope.into_vec())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let url = self.endpoint("/api/users/")?;
        debug!(%url, "fetching users");
        let response = self.http.get(url).send().await?;
        let envelope: ListEnvelope<User> = read_json(response).await?;
        Ok(envelope.into_vec())
    }

    pub async fn list_parcels(&self) -> Result<Vec<Parcel>, ApiError> {
        let url = self.endpoint("/api/parcels/")?;
        debug!(%url, "fetching parcels");
        let response = self.http.get(url).send().await?;
        let envelope: ListEnvelope<Parcel> = read_json(response).await?;
        Ok(envelope.into_vec())
    }

    pub async fn create_parcel(&self, request: &CreateParcelRequest) -> Result<Parcel, ApiError> {
        let url = self.endpoint("/api/parcels/")?;
        debug!(%url, tracking_number = %request.tracking_number, "creating parcel");
        let response = self.http.post(url).json(request).send().await?;
        read_json(response).await
    }

    pub async fn parcel_detail(&self, id: i64) -> Result<ParcelDetail, ApiError> {
        let url = self.endpoint(&format!("/api/parcels/{id}/"))?;
        debug!(%url, "fetching parcel detail");
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }

    /// Requests a one-time pickup code. The code is a short-lived secret
    /// and is only ever returned by this call.
    pub async fn get_pickup_code(&self, tracking_number: &str) -> Result<String, ApiError> {
        let url = self.endpoint("/api/get_pickup_code/")?;
        debug!(%url, tracking_number, "requesting pickup code");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "tracking_number": tracking_number }))
            .send()
            .await?;
        let body: PickupCodeBody = read_json(response).await?;
        match body.pickup_code {
            Some(code) => Ok(code),
            None => Err(ApiError::Backend(
                body.detail
                    .unwrap_or_else(|| "Nie udało się pobrać kodu odbioru".to_string()),
            )),
        }
    }

    pub async fn update_status(
        &self,
        tracking_number: &str,
        status: ParcelStatus,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("/api/update_status/")?;
        debug!(%url, tracking_number, %status, "updating parcel status");
        let response = self
            .http
            .put(url)
            .json(&serde_json::json!({
                "tracking_number": tracking_number,
                "status": status,
            }))
            .send()
            .await?;
        read_ok(response).await
    }

    pub async fn open_locker(&self, tracking_number: &str) -> Result<(), ApiError> {
        let url = self.endpoint("/api/parcels/open_locker/")?;
        debug!(%url, tracking_number, "requesting remote slot unlock");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "tracking_number": tracking_number }))
            .send()
            .await?;
        read_ok(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(decode_error(status, &bytes));
    }
    serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
}

async fn read_ok(response: Response) -> Result<(), ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(decode_error(status, &bytes));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    non_field_errors: Vec<String>,
}

/// Classifies a failed response exactly once. The slot-exhaustion substring
/// match lives here and nowhere else.
fn decode_error(status: StatusCode, body: &[u8]) -> ApiError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

    let slot_exhausted = parsed.non_field_errors.iter().any(|message| {
        SLOT_EXHAUSTED_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    });
    if slot_exhausted {
        return ApiError::SlotExhausted;
    }

    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }

    let detail = parsed
        .detail
        .or_else(|| parsed.non_field_errors.into_iter().next());

    match detail {
        Some(detail) if status == StatusCode::NOT_FOUND => ApiError::NotFound(detail),
        Some(detail) => ApiError::Backend(detail),
        None => ApiError::Status(status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_exhaustion_is_detected_from_non_field_errors() {
        let body = serde_json::json!({
            "non_field_errors": ["No available slots of size 'medium' in the selected locker."]
        });
        let err = decode_error(StatusCode::BAD_REQUEST, body.to_string().as_bytes());
        assert!(matches!(err, ApiError::SlotExhausted));
    }

    #[test]
    fn detail_propagates_verbatim() {
        let body = serde_json::json!({ "detail": "Ta paczka nie jest gotowa do odbioru." });
        let err = decode_error(StatusCode::BAD_REQUEST, body.to_string().as_bytes());
        match err {
            ApiError::Backend(detail) => {
                assert_eq!(detail, "Ta paczka nie jest gotowa do odbioru.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_maps_to_dedicated_variant() {
        let err = decode_error(StatusCode::UNAUTHORIZED, b"{}");
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn garbage_bodies_fall_back_to_the_bare_status() {
        let err = decode_error(StatusCode::INTERNAL_SERVER_ERROR, b"<html>boom</html>");
        assert!(matches!(err, ApiError::Status(500)));
    }

    #[test]
    fn not_found_keeps_the_backend_detail() {
        let body = serde_json::json!({ "detail": "Not found." });
        let err = decode_error(StatusCode::NOT_FOUND, body.to_string().as_bytes());
        assert!(matches!(err, ApiError::NotFound(detail) if detail == "Not found."));
    }

    #[test]
    fn list_envelope_accepts_both_shapes() {
        let plain: ListEnvelope<i64> = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(plain.into_vec(), vec![1, 2, 3]);

        let paginated: ListEnvelope<i64> =
            serde_json::from_str(r#"{ "results": [4, 5] }"#).unwrap();
        assert_eq!(paginated.into_vec(), vec![4, 5]);
    }
}
