use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use url::Url;

use locker_client::api::BackendClient;
use locker_client::config::FlowTimings;
use locker_client::error::{ApiError, AvailabilityError};
use locker_client::flows::pickup::{PickupFlow, PickupMethod, PickupPhase};
use locker_client::flows::submission::{
    ParcelForm, SubmissionError, SubmissionFlow, SubmissionPhase,
};
use locker_client::flows::wait::{NoWait, WaitStrategy};
use locker_client::models::parcel::{ParcelSize, ParcelStatus};
use locker_client::state::AppState;

/// In-process stand-in for the Django backend.
#[derive(Clone)]
struct MockBackend {
    events: Arc<Mutex<Vec<String>>>,
    create_posts: Arc<AtomicUsize>,
    status_puts: Arc<AtomicUsize>,
    exhaust_slots: Arc<AtomicBool>,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            create_posts: Arc::new(AtomicUsize::new(0)),
            status_puts: Arc::new(AtomicUsize::new(0)),
            exhaust_slots: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn push_event(&self, event: &str) {
        self.events.lock().await.push(event.to_string());
    }
}

async fn list_lockers(State(backend): State<MockBackend>) -> Json<Value> {
    backend.push_event("get:lockers").await;
    // Paginated envelope, the way DRF answers with pagination enabled.
    Json(json!({
        "results": [{
            "id": 1,
            "name": "PKO-Centrum",
            "location": "Warszawa, Marszałkowska 1",
            "latitude": 52.2297,
            "longitude": 21.0122,
            "status": true,
            "number_of_slots": 20,
            "created_at": "2025-05-01T08:00:00Z",
            "available_slots_count": 5,
            "available_slots_by_size": { "small": 0, "medium": 3, "large": 2 }
        }]
    }))
}

async fn list_parcels() -> Json<Value> {
    Json(json!([]))
}

async fn create_parcel(
    State(backend): State<MockBackend>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.create_posts.fetch_add(1, Ordering::SeqCst);
    backend.push_event("post:create").await;

    if backend.exhaust_slots.load(Ordering::SeqCst) {
        let size = payload["size"].as_str().unwrap_or("?");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "non_field_errors": [
                    format!("No available slots of size '{size}' in the selected locker.")
                ]
            })),
        );
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "id": 42,
            "tracking_number": payload["tracking_number"],
            "parcel_locker": payload["parcel_locker"],
            "size": payload["size"],
            "status": payload["status"],
            "sender": 1,
            "receiver": payload["receiver"],
            "created_at": "2025-05-02T10:00:00Z"
        })),
    )
}

async fn get_pickup_code(State(backend): State<MockBackend>) -> Json<Value> {
    backend.push_event("post:pickup_code").await;
    Json(json!({ "pickup_code": "4321" }))
}

async fn update_status(
    State(backend): State<MockBackend>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    backend.status_puts.fetch_add(1, Ordering::SeqCst);
    backend
        .push_event(&format!(
            "put:status:{}",
            payload["status"].as_str().unwrap_or("?")
        ))
        .await;
    Json(json!({ "message": "Status updated" }))
}

async fn spawn_backend() -> (Arc<BackendClient>, MockBackend) {
    let backend = MockBackend::new();
    let app = Router::new()
        .route("/api/parcel_lockers/", get(list_lockers))
        .route("/api/parcels/", get(list_parcels).post(create_parcel))
        .route("/api/get_pickup_code/", post(get_pickup_code))
        .route("/api/update_status/", put(update_status))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    // Keep proxies out of the loopback round trip.
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = Url::parse(&format!("http://{addr}")).unwrap();
    (Arc::new(BackendClient::with_http_client(url, http)), backend)
}

/// Logs every wait into the shared event log without sleeping.
struct RecordingWait {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WaitStrategy for RecordingWait {
    async fn wait(&self, duration: Duration) {
        self.events
            .lock()
            .await
            .push(format!("wait:{}ms", duration.as_millis()));
    }
}

/// Parks every wait until the test hands out a permit.
struct GateWait {
    permits: Arc<Semaphore>,
}

#[async_trait]
impl WaitStrategy for GateWait {
    async fn wait(&self, _duration: Duration) {
        let permit = self.permits.acquire().await.unwrap();
        permit.forget();
    }
}

async fn state_with_lockers(api: &BackendClient) -> Arc<AppState> {
    let state = Arc::new(AppState::new());
    state.replace_lockers(api.list_lockers().await.unwrap());
    state
}

fn form(size: ParcelSize) -> ParcelForm {
    ParcelForm {
        tracking_number: "PL-100".to_string(),
        parcel_locker: Some(1),
        size,
        receiver: 2,
        pickup_code: "1234".to_string(),
    }
}

fn awaiting_parcel(tracking: &str) -> locker_client::models::parcel::Parcel {
    serde_json::from_value(json!({
        "id": 7,
        "tracking_number": tracking,
        "parcel_locker": 1,
        "size": "medium",
        "status": "awaiting_pickup",
        "sender": 1,
        "receiver": 2,
        "created_at": "2025-05-02T10:00:00Z"
    }))
    .unwrap()
}

#[tokio::test]
async fn exhausted_size_is_blocked_locally_without_a_request() {
    let (api, backend) = spawn_backend().await;
    let state = state_with_lockers(&api).await;

    let mut flow = SubmissionFlow::new(
        api,
        state,
        Arc::new(NoWait),
        FlowTimings::immediate(),
    );

    // The fetched snapshot reports zero small slots.
    let err = flow.submit(form(ParcelSize::Small)).await.unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Validation(AvailabilityError::NoFreeSlots {
            size: ParcelSize::Small
        })
    ));
    assert_eq!(flow.phase(), SubmissionPhase::Idle);
    assert_eq!(
        flow.message(),
        Some("Brak dostępnych skrytek rozmiaru small w wybranym paczkomacie.")
    );
    assert_eq!(backend.create_posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_create_does_not_decrement_the_cached_snapshot() {
    let (api, _backend) = spawn_backend().await;
    let state = state_with_lockers(&api).await;

    let mut flow = SubmissionFlow::new(
        api,
        state.clone(),
        Arc::new(NoWait),
        FlowTimings::immediate(),
    );

    let parcel = flow.submit(form(ParcelSize::Medium)).await.unwrap();
    assert_eq!(parcel.tracking_number, "PL-100");
    assert_eq!(state.parcels_snapshot().await[0].tracking_number, "PL-100");

    // The locker snapshot is only ever replaced by a refetch.
    let locker = state.locker(1).unwrap();
    let by_size = locker.available_slots_by_size.unwrap();
    assert_eq!(by_size[&ParcelSize::Medium], 3);
}

#[tokio::test]
async fn losing_the_slot_race_surfaces_the_specific_message() {
    let (api, backend) = spawn_backend().await;
    let state = state_with_lockers(&api).await;
    backend.exhaust_slots.store(true, Ordering::SeqCst);

    let mut flow = SubmissionFlow::new(
        api,
        state,
        Arc::new(NoWait),
        FlowTimings::immediate(),
    );

    // The pre-check still passes on the stale snapshot; the backend says no.
    let err = flow.submit(form(ParcelSize::Medium)).await.unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Api(ApiError::SlotExhausted)
    ));
    assert_eq!(
        flow.message(),
        Some("Brak dostępnych skrytek o wybranym rozmiarze w wybranym paczkomacie.")
    );
    assert_eq!(backend.create_posts.load(Ordering::SeqCst), 1);
    assert_eq!(flow.phase(), SubmissionPhase::Idle);
}

#[tokio::test]
async fn insertion_wait_runs_before_the_single_creation_request() {
    let (api, backend) = spawn_backend().await;
    let state = state_with_lockers(&api).await;
    backend.events.lock().await.clear();

    let wait = Arc::new(RecordingWait {
        events: backend.events.clone(),
    });
    let mut flow = SubmissionFlow::new(api, state, wait, FlowTimings::default());

    flow.submit(form(ParcelSize::Medium)).await.unwrap();

    let events = backend.events.lock().await.clone();
    assert_eq!(
        events,
        vec!["wait:5000ms", "post:create", "wait:2000ms"],
        "creation must fire after the insertion wait, exactly once"
    );
    assert_eq!(backend.create_posts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoning_the_code_screen_orphans_the_pending_timer() {
    let (api, backend) = spawn_backend().await;
    let state = Arc::new(AppState::new());
    state.replace_parcels(vec![awaiting_parcel("PL-200")]).await;

    let permits = Arc::new(Semaphore::new(0));
    let flow = Arc::new(PickupFlow::new(
        api,
        state.clone(),
        Arc::new(GateWait {
            permits: permits.clone(),
        }),
        FlowTimings::default(),
        "PL-200",
    ));

    flow.choose(PickupMethod::Code).await.unwrap();
    let task = tokio::spawn({
        let flow = flow.clone();
        async move { flow.request_code().await }
    });

    // Wait until the code is on screen and the display timer is parked.
    for _ in 0..100 {
        if flow.pickup_code().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(flow.pickup_code().await.as_deref(), Some("4321"));
    assert_eq!(flow.phase().await, PickupPhase::CodeDisplayed);

    flow.back_to_select().await;
    permits.add_permits(1);
    task.await.unwrap().unwrap();

    // The orphaned timer fired but mutated nothing.
    assert_eq!(backend.status_puts.load(Ordering::SeqCst), 0);
    assert_eq!(flow.phase().await, PickupPhase::Select);
    assert_eq!(
        state.parcels_snapshot().await[0].status,
        ParcelStatus::AwaitingPickup
    );
}

#[tokio::test]
async fn each_pickup_method_issues_exactly_one_status_update() {
    for method in [PickupMethod::Qr, PickupMethod::Code, PickupMethod::RemoteUnlock] {
        let (api, backend) = spawn_backend().await;
        let state = Arc::new(AppState::new());
        state.replace_parcels(vec![awaiting_parcel("PL-300")]).await;

        let flow = PickupFlow::new(
            api,
            state.clone(),
            Arc::new(NoWait),
            FlowTimings::immediate(),
            "PL-300",
        );

        flow.choose(method).await.unwrap();
        match method {
            PickupMethod::Qr => flow.generate_qr().await.unwrap(),
            PickupMethod::Code => flow.request_code().await.unwrap(),
            PickupMethod::RemoteUnlock => flow.remote_unlock().await.unwrap(),
        }

        assert_eq!(
            backend.status_puts.load(Ordering::SeqCst),
            1,
            "one confirmed update per pickup, method {method:?}"
        );
        let events = backend.events.lock().await.clone();
        assert!(events.contains(&"put:status:delivered".to_string()));
        assert_eq!(flow.phase().await, PickupPhase::Closed);
        assert_eq!(
            state.parcels_snapshot().await[0].status,
            ParcelStatus::Delivered
        );

        let report = state.metrics.encode().unwrap();
        assert!(report.contains("pickups_total"));
    }
}
