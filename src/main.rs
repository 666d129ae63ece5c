use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

use locker_client::api::BackendClient;
use locker_client::config::Config;
use locker_client::error::ApiError;
use locker_client::flows::pickup::{PickupError, PickupFlow, PickupMethod};
use locker_client::flows::submission::{ParcelForm, SubmissionError, SubmissionFlow};
use locker_client::flows::wait::TimerWait;
use locker_client::geo::nearest_active_locker;
use locker_client::models::locker::GeoPoint;
use locker_client::models::parcel::ParcelSize;
use locker_client::state::{AppState, StatusTab};

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Pickup(#[from] PickupError),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let api = Arc::new(BackendClient::new(config.backend_url.clone()));
    let state = Arc::new(AppState::new());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");

    match command {
        "lockers" => lockers(&api, &state, &args[1..]).await,
        "parcels" => parcels(&api, &state, &args[1..]).await,
        "parcel" => parcel(&api, &args[1..]).await,
        "send" => send(api, state, config, &args[1..]).await,
        "pickup" => pickup(api, state, config, &args[1..]).await,
        "help" | "--help" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(CliError::Usage(format!("unknown command: {other}")))
        }
    }
}

fn print_usage() {
    println!("usage:");
    println!("  locker-client lockers [<lat> <lng>]");
    println!("  locker-client parcels [all|in_transit|preparing|awaiting_pickup|delivered] [search]");
    println!("  locker-client parcel <id>");
    println!("  locker-client send <locker_id> <size> <receiver_username>");
    println!("  locker-client pickup <tracking_number> <qr|code|unlock|open>");
}

async fn lockers(
    api: &BackendClient,
    state: &AppState,
    args: &[String],
) -> Result<(), CliError> {
    state.replace_lockers(api.list_lockers().await?);
    let mut lockers = state.lockers_snapshot();
    lockers.sort_by_key(|locker| locker.id);

    for locker in &lockers {
        let availability = match locker.available_slots_count {
            Some(count) => format!("{count} free"),
            None => "availability unknown".to_string(),
        };
        let active = if locker.status { "active" } else { "inactive" };
        println!(
            "#{} {} ({}) [{active}] {availability}",
            locker.id, locker.name, locker.location
        );
    }

    if let [lat, lng] = args {
        let from = GeoPoint {
            lat: parse_arg(lat, "lat")?,
            lng: parse_arg(lng, "lng")?,
        };
        match nearest_active_locker(&lockers, &from) {
            Some(nearest) => println!("nearest: #{} {}", nearest.id, nearest.name),
            None => println!("nearest: none active"),
        }
    }

    Ok(())
}

async fn parcels(
    api: &BackendClient,
    state: &AppState,
    args: &[String],
) -> Result<(), CliError> {
    let tab = match args.first().map(String::as_str) {
        None | Some("all") => StatusTab::All,
        Some("in_transit") => StatusTab::InTransit,
        Some("preparing") => StatusTab::Preparing,
        Some("awaiting_pickup") => StatusTab::AwaitingPickup,
        Some("delivered") => StatusTab::Delivered,
        Some(other) => return Err(CliError::Usage(format!("unknown tab: {other}"))),
    };
    let search = args.get(1).map(String::as_str).unwrap_or("");

    // One refresh for everything the dashboard shows.
    let (parcel_list, users) =
        futures::future::try_join(api.list_parcels(), api.list_users()).await?;
    state.replace_parcels(parcel_list).await;
    state.replace_users(users).await;

    for parcel in state.parcels_filtered(tab, search).await {
        let locker_name = parcel.parcel_locker_name.as_deref().unwrap_or("?");
        println!(
            "{} {} [{}] {} -> {} @ {}",
            parcel.created_at.format("%Y-%m-%d %H:%M"),
            parcel.tracking_number,
            parcel.status,
            parcel.sender_username.as_deref().unwrap_or("?"),
            parcel.receiver_username.as_deref().unwrap_or("?"),
            locker_name,
        );
    }

    Ok(())
}

async fn parcel(api: &BackendClient, args: &[String]) -> Result<(), CliError> {
    let [id] = args else {
        return Err(CliError::Usage("parcel needs <id>".to_string()));
    };
    let id: i64 = parse_arg(id, "id")?;

    let detail = api.parcel_detail(id).await?;
    println!(
        "{} [{}] size {} @ locker #{}",
        detail.parcel.tracking_number,
        detail.parcel.status,
        detail.parcel.size,
        detail.parcel.parcel_locker,
    );
    for event in &detail.history {
        let label = event
            .event_type_display
            .clone()
            .unwrap_or_else(|| format!("{:?}", event.event_type));
        println!("  {} {label}", event.event_time.format("%Y-%m-%d %H:%M"));
    }

    Ok(())
}

async fn send(
    api: Arc<BackendClient>,
    state: Arc<AppState>,
    config: Config,
    args: &[String],
) -> Result<(), CliError> {
    let [locker_id, size, receiver_name] = args else {
        return Err(CliError::Usage(
            "send needs <locker_id> <size> <receiver_username>".to_string(),
        ));
    };
    let locker_id: i64 = parse_arg(locker_id, "locker_id")?;
    let size = match size.as_str() {
        "small" => ParcelSize::Small,
        "medium" => ParcelSize::Medium,
        "large" => ParcelSize::Large,
        other => return Err(CliError::Usage(format!("unknown size: {other}"))),
    };

    // The pre-check reads the cached locker list, so fetch it first; the
    // receiver is picked by username the way the send form does it.
    let (lockers, users) =
        futures::future::try_join(api.list_lockers(), api.list_users()).await?;
    state.replace_lockers(lockers);
    state.replace_users(users).await;

    let receiver = state
        .users_snapshot()
        .await
        .iter()
        .find(|user| user.username == *receiver_name)
        .map(|user| user.id)
        .ok_or_else(|| CliError::Usage(format!("unknown receiver: {receiver_name}")))?;

    let form = ParcelForm {
        tracking_number: mint_tracking_number(),
        parcel_locker: Some(locker_id),
        size,
        receiver,
        pickup_code: mint_pickup_code(),
    };

    let mut flow = SubmissionFlow::new(api, state, Arc::new(TimerWait), config.timings);
    match flow.submit(form).await {
        Ok(parcel) => {
            println!("Paczka nadana: {}", parcel.tracking_number);
            Ok(())
        }
        Err(err) => {
            println!("{}", err.user_message());
            Err(err.into())
        }
    }
}

async fn pickup(
    api: Arc<BackendClient>,
    state: Arc<AppState>,
    config: Config,
    args: &[String],
) -> Result<(), CliError> {
    let [tracking_number, method] = args else {
        return Err(CliError::Usage(
            "pickup needs <tracking_number> <qr|code|unlock|open>".to_string(),
        ));
    };

    state.replace_parcels(api.list_parcels().await?).await;

    let flow = PickupFlow::new(
        api,
        state,
        Arc::new(TimerWait),
        config.timings,
        tracking_number.clone(),
    );

    let result = match method.as_str() {
        "qr" => {
            flow.choose(PickupMethod::Qr).await?;
            flow.generate_qr().await
        }
        "code" => {
            flow.choose(PickupMethod::Code).await?;
            let result = flow.request_code().await;
            if let Some(code) = flow.pickup_code().await {
                println!("Kod odbioru: {code}");
            }
            result
        }
        "unlock" => {
            flow.choose(PickupMethod::RemoteUnlock).await?;
            flow.remote_unlock().await
        }
        "open" => {
            flow.choose(PickupMethod::RemoteUnlock).await?;
            flow.open_locker().await
        }
        other => return Err(CliError::Usage(format!("unknown method: {other}"))),
    };

    match result {
        Ok(()) => {
            match flow.message().await {
                Some(message) => println!("{message}"),
                None => println!("Paczka odebrana: {tracking_number}"),
            }
            Ok(())
        }
        Err(err) => {
            if let Some(message) = flow.message().await {
                println!("{message}");
            }
            Err(err.into())
        }
    }
}

fn mint_tracking_number() -> String {
    format!("PL{}", Uuid::new_v4().simple())
}

fn mint_pickup_code() -> String {
    format!("{:04}", Uuid::new_v4().as_u128() % 10_000)
}

fn parse_arg<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, CliError> {
    raw.parse()
        .map_err(|_| CliError::Usage(format!("invalid {name}: {raw}")))
}
