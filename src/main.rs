use crate::api::*;
use crate::config::Settings;
use crate::dashboard::Dashboard;
use crate::db::SQLite;
use crate::payment::{PaymentVerifier, SolanaRpcVerifier, TestPaymentVerifier};
use crate::predictions::PredictionFilters;
use anyhow::Result;
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, info, trace};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

mod api;
mod api_keys;
#[cfg(test)]
mod client;
mod config;
mod dashboard;
mod db;
mod leaderboard;
mod payment;
mod predictions;
mod wallet;

type HandlerError = (StatusCode, String);

#[debug_handler]
async fn new_prediction(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<NewPredictionRequest>>,
) -> Result<(StatusCode, Json<RowId>), HandlerError> {
    let backend = state.write().await;
    let id = backend
        .new_prediction(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok((StatusCode::CREATED, id.into()))
}
#[debug_handler]
async fn get_predictions(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(filters): Json<PredictionFilters>,
) -> Result<Json<Vec<Prediction>>, HandlerError> {
    let backend = state.read().await;
    trace!("Getting predictions for {:?}", filters);
    let predictions = backend
        .get_predictions(filters)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(predictions))
}
async fn query_predictions(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(query): Json<PredictionQuery>,
) -> Result<Json<Vec<Prediction>>, HandlerError> {
    let backend = state.read().await;
    let predictions = backend
        .query_predictions(query)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(predictions))
}
async fn get_api_keys(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<()>>,
) -> Result<Json<Vec<ApiKeyRecord>>, HandlerError> {
    let backend = state.read().await;
    let keys = backend
        .get_api_keys(request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(keys))
}
async fn get_api_keys_by_category(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<KeyCategory>>,
) -> Result<Json<Vec<ApiKeyRecord>>, HandlerError> {
    let backend = state.read().await;
    let keys = backend
        .get_api_keys_by_category(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(keys))
}
async fn get_api_keys_by_provider(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<String>>,
) -> Result<Json<Vec<ApiKeyRecord>>, HandlerError> {
    let backend = state.read().await;
    let keys = backend
        .get_api_keys_by_provider(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(keys))
}
async fn log_api_key_action(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<NewAuditEntry>>,
) -> Result<StatusCode, HandlerError> {
    let backend = state.write().await;
    let (entry, access) = (request.data, request.access);
    debug!("Logging {} on API key {}", entry.action, entry.key_id);
    backend
        .log_api_key_action(entry, access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(StatusCode::CREATED)
}
async fn create_api_key(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<NewApiKey>>,
) -> Result<(StatusCode, Json<RowId>), HandlerError> {
    let backend = state.write().await;
    let id = backend
        .create_api_key(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok((StatusCode::CREATED, id.into()))
}
async fn update_api_key(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<UpdateApiKeyRequest>>,
) -> Result<(), HandlerError> {
    let backend = state.write().await;
    backend
        .update_api_key(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn delete_api_key(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<RowId>>,
) -> Result<(), HandlerError> {
    let backend = state.write().await;
    backend
        .delete_api_key(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_api_key_audit_log(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<RowId>>,
) -> Result<Json<Vec<AuditEntry>>, HandlerError> {
    let backend = state.read().await;
    let log = backend
        .get_api_key_audit_log(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(log))
}
#[debug_handler]
async fn submit_change(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<SubmitChangeRequest>,
) -> Result<(StatusCode, Json<RowId>), HandlerError> {
    let backend = state.write().await;
    let id = backend
        .submit_change(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok((StatusCode::CREATED, id.into()))
}
async fn review_change(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<ReviewChangeRequest>>,
) -> Result<(), HandlerError> {
    let backend = state.write().await;
    backend
        .review_change(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_changes(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<Option<ChangeStatus>>>,
) -> Result<Json<Vec<PendingChange>>, HandlerError> {
    let backend = state.read().await;
    let changes = backend
        .get_changes(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(changes))
}
async fn get_leaderboard(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<LeaderboardRequest>,
) -> Result<Json<Vec<LeaderboardUser>>, HandlerError> {
    let backend = state.read().await;
    let users = backend
        .get_leaderboard(request)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(users))
}
async fn record_prediction_result(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<PredictionResultRequest>>,
) -> Result<(), HandlerError> {
    let backend = state.write().await;
    backend
        .record_prediction_result(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_token_packages(State(state): State<Arc<RwLock<Dashboard>>>) -> Json<Vec<TokenPackage>> {
    let backend = state.read().await;
    Json(backend.get_token_packages())
}
#[debug_handler]
async fn purchase_tokens(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<PurchaseRequest>>,
) -> Result<Json<PurchaseResponse>, HandlerError> {
    let backend = state.write().await;
    let purchase = backend
        .purchase_tokens(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(purchase))
}
async fn get_purchases(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<()>>,
) -> Result<Json<Vec<TokenPurchase>>, HandlerError> {
    let backend = state.read().await;
    let purchases = backend
        .get_purchases(request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(purchases))
}
async fn get_login_challenge(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(user): Json<UserPubKey>,
) -> Result<String, HandlerError> {
    let mut backend = state.write().await;
    trace!("Getting login challenge for {}", user);
    let challenge = backend
        .create_login_challenge(user)
        .await
        .map_err(map_any_err_and_code)?;
    debug!("Login challenge for user {}: {}", user, challenge);
    Ok(challenge)
}
async fn try_login(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<LoginRequest>,
) -> Result<(), HandlerError> {
    let mut backend = state.write().await;
    backend
        .try_login(request.user, request.sig, request.challenge)
        .await
        .map_err(map_any_err_and_code)?;
    debug!("User {} successfully logged in", request.user);
    Ok(())
}
async fn check_login(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<AccessRequest>,
) -> Result<(), HandlerError> {
    let backend = state.read().await;
    backend
        .check_access(request)
        .await
        .map_err(|e| (StatusCode::UNAUTHORIZED, map_any_err(e)))?;
    Ok(())
}
async fn update_user(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<UpdateUserRequest>>,
) -> Result<(), HandlerError> {
    let backend = state.write().await;
    backend
        .update_user(request.data.user, request.data.username, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_user(
    State(state): State<Arc<RwLock<Dashboard>>>,
    Json(request): Json<PostRequest<UserPubKey>>,
) -> Result<Json<UserResponse>, HandlerError> {
    let backend = state.read().await;
    let user = backend
        .get_user(request.data, request.access)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(user))
}

#[derive(Parser)]
struct Args {
    /// Settings file, `tipster.toml` by default
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    admin: Vec<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    test: bool,
    #[arg(short, long)]
    db: Option<String>,
}
impl Args {
    fn apply(self, mut settings: Settings) -> Settings {
        settings.admins.extend(self.admin);
        if let Some(port) = self.port {
            settings.port = port;
        }
        if self.test {
            settings.test = true;
        }
        if self.db.is_some() {
            settings.db = self.db;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let settings = cli.apply(settings);
    Builder::default()
        .filter_level(settings.level_filter())
        .write_style(WriteStyle::Always)
        .init();
    let (_port, handle) = run_server(settings).await?;
    handle.await?;
    Ok(())
}

fn router(state: Arc<RwLock<Dashboard>>) -> Router {
    Router::new()
        .route("/new_prediction", post(new_prediction))
        .route("/get_predictions", post(get_predictions))
        .route("/query_predictions", post(query_predictions))
        .route("/get_api_keys", post(get_api_keys))
        .route("/get_api_keys_by_category", post(get_api_keys_by_category))
        .route("/get_api_keys_by_provider", post(get_api_keys_by_provider))
        .route("/log_api_key_action", post(log_api_key_action))
        .route("/create_api_key", post(create_api_key))
        .route("/update_api_key", post(update_api_key))
        .route("/delete_api_key", post(delete_api_key))
        .route("/get_api_key_audit_log", post(get_api_key_audit_log))
        .route("/submit_change", post(submit_change))
        .route("/review_change", post(review_change))
        .route("/get_changes", post(get_changes))
        .route("/get_leaderboard", post(get_leaderboard))
        .route("/record_prediction_result", post(record_prediction_result))
        .route("/get_token_packages", get(get_token_packages))
        .route("/purchase_tokens", post(purchase_tokens))
        .route("/get_purchases", post(get_purchases))
        .route("/get_login_challenge", post(get_login_challenge))
        .route("/try_login", post(try_login))
        .route("/check_login", post(check_login))
        .route("/update_user", post(update_user))
        .route("/get_user", post(get_user))
        .with_state(state)
}

async fn dashboard(settings: &Settings) -> Result<Dashboard> {
    let verifier: Box<dyn PaymentVerifier + Send + Sync> = if settings.test {
        Box::new(TestPaymentVerifier::default())
    } else {
        Box::new(SolanaRpcVerifier::new(
            Duration::from_secs(settings.request_timeout_secs),
            settings.treasury.clone(),
        )?)
    };
    Dashboard::new(
        Box::new(SQLite::new(settings.db.clone()).await?),
        verifier,
        settings.admins.clone(),
        settings.test,
    )
    .await
}

async fn run_server(settings: Settings) -> Result<(u16, JoinHandle<()>)> {
    let state = Arc::new(RwLock::new(dashboard(&settings).await?));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    info!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
