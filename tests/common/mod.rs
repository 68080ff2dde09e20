//! In-process fake of the metadata connector, scheduler and time-series
//! connector, served by Axum on an ephemeral port.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use harvest_client::storage::MemoryCredentialStore;
use harvest_client::{ClientConfig, HarvestClient};

pub const SECRET: &[u8] = b"connector-signing-secret";
pub const PASSWORD: &str = "correct horse";

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Token signed the way the connector signs them, expiring `ttl_secs` from now.
pub fn mint_token(sub: &str, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

#[derive(Default)]
pub struct Backend {
    pub catalog: Mutex<Vec<Value>>,
    /// Served by the first catalog call, after a delay, when set
    pub stale_catalog: Mutex<Option<Vec<Value>>>,
    pub catalog_calls: AtomicUsize,
    pub subscriptions: Mutex<Vec<Value>>,
    /// Served by the first subscription list call, after a delay, when set
    pub stale_subscriptions: Mutex<Option<Vec<Value>>>,
    pub subscription_calls: AtomicUsize,
    pub telemetry: Mutex<Vec<Value>>,
    /// Served by the first telemetry call, after a delay, when set
    pub stale_telemetry: Mutex<Option<Vec<Value>>>,
    pub telemetry_calls: AtomicUsize,
    /// Telemetry answers 500 with an empty body
    pub fail_telemetry: AtomicBool,
    /// Telemetry answers 200 with a body that is not JSON
    pub garble_telemetry: AtomicBool,
    pub subscribe_bodies: Mutex<Vec<Value>>,
    pub telemetry_timespans: Mutex<Vec<u32>>,
    pub fail_unsubscribe: AtomicBool,
    /// Every path that reached the server
    pub hits: Mutex<Vec<String>>,
}

impl Backend {
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn seed_subscription(&self, id: i64, user_id: i64, api_id: i64, status: &str) {
        self.subscriptions.lock().unwrap().push(json!({
            "subscriptionID": id,
            "userID": user_id,
            "availableApiID": api_id,
            "interval": 300,
            "status": status,
            "jobName": format!("job-{id}"),
            "command": "python fetchApis.py",
            "container": format!("worker-{id}"),
        }));
    }
}

pub fn catalog_entry(id: i64, name: &str, relevant: &[&str]) -> Value {
    json!({
        "availableApiID": id,
        "url": format!("https://upstream.example/{name}"),
        "name": name,
        "apiTokenRequired": false,
        "description": format!("{name} feed"),
        "subscriptionType": "FREE",
        "relevantFields": relevant,
    })
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

async fn record_hit(State(backend): State<Arc<Backend>>, req: Request, next: Next) -> Response {
    backend.hits.lock().unwrap().push(req.uri().path().to_string());
    next.run(req).await
}

async fn auth_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;
    decode::<Claims>(token, &DecodingKey::from_secret(SECRET), &Validation::new(Algorithm::HS256))
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(next.run(req).await)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login_handler(Json(body): Json<LoginBody>) -> Response {
    if body.password != PASSWORD {
        return message(StatusCode::UNAUTHORIZED, "ERROR: Incorrect user name or password");
    }
    Json(json!({
        "access_token": mint_token(&body.email, 3600),
        "userID": 1,
        "role": "USER",
    }))
    .into_response()
}

async fn create_user_handler(Json(body): Json<Value>) -> Response {
    if body.get("email").is_none() || body.get("firstName").is_none() {
        return message(StatusCode::BAD_REQUEST, "ERROR: Fill in all required fields");
    }
    message(StatusCode::CREATED, "SUCCESS: User created successfully")
}

async fn available_apis_handler(State(backend): State<Arc<Backend>>) -> Response {
    if let Some(stale) = take_stale(&backend.catalog_calls, &backend.stale_catalog).await {
        return Json(stale).into_response();
    }
    let catalog = backend.catalog.lock().unwrap().clone();
    if catalog.is_empty() {
        return message(StatusCode::NOT_FOUND, "ERROR: No availableApis found");
    }
    Json(catalog).into_response()
}

/// First call sleeps and answers with the stale payload, if one is armed.
async fn take_stale(calls: &AtomicUsize, stale: &Mutex<Option<Vec<Value>>>) -> Option<Vec<Value>> {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call != 1 {
        return None;
    }
    let stale = stale.lock().unwrap().clone()?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    Some(stale)
}

async fn subscriptions_by_user_handler(
    State(backend): State<Arc<Backend>>,
    Path(user_id): Path<String>,
) -> Json<Vec<Value>> {
    if let Some(stale) = take_stale(&backend.subscription_calls, &backend.stale_subscriptions).await {
        return Json(stale);
    }
    let subs = backend.subscriptions.lock().unwrap();
    Json(
        subs.iter()
            .filter(|s| s["userID"].to_string() == user_id)
            .cloned()
            .collect(),
    )
}

async fn subscribe_handler(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.subscribe_bodies.lock().unwrap().push(body.clone());
    let mut subs = backend.subscriptions.lock().unwrap();
    let id = subs.len() as i64 + 100;
    let user_id: i64 = body["userID"].as_str().and_then(|u| u.parse().ok()).unwrap_or(0);
    subs.push(json!({
        "subscriptionID": id,
        "userID": user_id,
        "availableApiID": body["apiID"],
        "interval": body["interval"],
        "status": "ACTIVE",
        "jobName": format!("job-{id}"),
        "container": "worker-new",
    }));
    Json(json!({ "message": "SUCCESS: Subscription created", "subscriptionID": id })).into_response()
}

fn set_status(backend: &Backend, id: i64, status: &str) -> Response {
    let mut subs = backend.subscriptions.lock().unwrap();
    match subs.iter_mut().find(|s| s["subscriptionID"] == id) {
        Some(sub) => {
            sub["status"] = json!(status);
            message(StatusCode::OK, &format!("SUCCESS: subscription {id} is now {status}"))
        }
        None => message(StatusCode::NOT_FOUND, &format!("ERROR: No subscription with ID {id} found")),
    }
}

async fn unsubscribe_handler(State(backend): State<Arc<Backend>>, Path(id): Path<i64>) -> Response {
    if backend.fail_unsubscribe.load(Ordering::SeqCst) {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "ERROR: job could not be stopped");
    }
    set_status(&backend, id, "INACTIVE")
}

async fn resubscribe_handler(State(backend): State<Arc<Backend>>, Path(id): Path<i64>) -> Response {
    set_status(&backend, id, "ACTIVE")
}

async fn influx_get_data_handler(
    State(backend): State<Arc<Backend>>,
    Path((_subscription_id, timespan)): Path<(i64, u32)>,
) -> Response {
    backend.telemetry_timespans.lock().unwrap().push(timespan);
    if backend.fail_telemetry.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if backend.garble_telemetry.load(Ordering::SeqCst) {
        return (StatusCode::OK, "<html>maintenance</html>").into_response();
    }
    if let Some(stale) = take_stale(&backend.telemetry_calls, &backend.stale_telemetry).await {
        return Json(stale).into_response();
    }
    Json(backend.telemetry.lock().unwrap().clone()).into_response()
}

pub fn create_router(backend: Arc<Backend>) -> Router {
    let auth_routes = Router::new()
        .route("/availableApis", get(available_apis_handler))
        .route("/subscriptionsByUserID/:user_id", get(subscriptions_by_user_handler))
        .route("/subscribeApi", post(subscribe_handler))
        .route("/unsubscribeApi/:id", get(unsubscribe_handler))
        .route("/resubscribeApi/:id", get(resubscribe_handler))
        .route("/influxGetData/:id/:timespan", get(influx_get_data_handler))
        .route_layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/login", post(login_handler))
        .route("/createUser", post(create_user_handler))
        .merge(auth_routes)
        .layer(middleware::from_fn_with_state(backend.clone(), record_hit))
        .with_state(backend)
}

/// Serve `backend` on 127.0.0.1 and return its base URL.
pub async fn spawn(backend: Arc<Backend>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(backend);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fake backend plus a client pointed at it, with an in-memory credential store.
pub async fn setup() -> (Arc<Backend>, HarvestClient) {
    let backend = Arc::new(Backend::default());
    let url = spawn(backend.clone()).await;
    let client = HarvestClient::with_store(
        ClientConfig::with_base_url(&url),
        Arc::new(MemoryCredentialStore::new()),
    )
    .unwrap();
    (backend, client)
}

/// Same as [`setup`] with a live session for user 1.
pub async fn setup_logged_in() -> (Arc<Backend>, HarvestClient) {
    let (backend, client) = setup().await;
    client.login("ada@example.org", PASSWORD).await.unwrap();
    (backend, client)
}
