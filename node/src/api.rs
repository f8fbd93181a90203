//! # REST + JSON-RPC + WebSocket API
//!
//! The node's HTTP face. Reads are served from REST routes and read-only
//! RPC methods; every state change goes through `POST /rpc`.
//!
//! ## Endpoints
//!
//! | Method | Path                         | Description                          |
//! |--------|------------------------------|--------------------------------------|
//! | GET    | `/health`                    | Liveness check                       |
//! | GET    | `/status`                    | Node and registrar summary           |
//! | GET    | `/names/:name`               | Record for a name or sub-name        |
//! | GET    | `/names/:name/price`         | Price breakdown (`?duration=` secs)  |
//! | GET    | `/auctions/:batch`           | Auction batch status                 |
//! | GET    | `/accounts/:address`         | Balance, nonce, allowlist flag       |
//! | POST   | `/rpc`                       | JSON-RPC 2.0 gateway                 |
//! | GET    | `/ws`                        | Live registrar event stream          |
//!
//! ## Calls
//!
//! Mutating RPC methods take named params with a `caller` address and,
//! where payment is involved, a `value` in native base units. The node
//! stamps `now` from its own clock.
//!
//! **WARNING: the node does not authenticate requests.** `caller` and
//! `value` are trusted exactly as sent, so anyone who can reach `/rpc` can
//! act as the admin and claim names without paying. Keep the RPC port bound
//! to localhost (the default) or behind a gateway that authenticates
//! callers and settles payment. Never expose it to an untrusted network.
//!
//! After every successful mutation the controller snapshot and the events
//! the call produced are written to the database in one transaction, then
//! the events are broadcast to WebSocket subscribers. Failed calls write
//! nothing. If that write fails, the in-memory controller is rolled back to
//! its state before the call and the call's events are discarded.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nomina_contracts::auction::{AuctionStatus, BatchId};
use nomina_contracts::authorization::RegistrationVoucher;
use nomina_contracts::controller::{
    CallContext, ControllerSnapshot, PriceBreakdown, RegistrarController,
};
use nomina_contracts::error::{ErrorKind, RegistrarError};
use nomina_contracts::events::RegistrarEvent;
use nomina_contracts::namehash::NameId;
use nomina_contracts::pricing::TierPrice;
use nomina_contracts::registry::NameStatus;
use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::config::SECONDS_PER_YEAR;
use nomina_protocol::crypto::hash::{self, Hash32};
use nomina_protocol::crypto::keys::{NominaPublicKey, NominaSignature};
use nomina_protocol::identity::Address;
use nomina_protocol::oracle::{PriceFeed, Quote, StaticPriceFeed};
use nomina_protocol::storage::{DbError, DbResult, NominaDB};

use crate::metrics::SharedMetrics;

/// Key of the controller snapshot in the `snapshots` tree.
pub const SNAPSHOT_KEY: &str = "registrar";

/// Most events `nomina_events` returns per call.
const MAX_EVENTS_PER_PAGE: usize = 500;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Source of the `now` stamped on calls.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Shared by all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    /// One lock serializes every registrar call.
    pub registrar: Arc<RwLock<RegistrarController>>,
    /// The devnet feed behind the controller, kept for `nomina_setQuote`.
    pub feed: Arc<StaticPriceFeed>,
    pub db: NominaDB,
    pub event_tx: broadcast::Sender<StreamEvent>,
    pub metrics: SharedMetrics,
    pub clock: Clock,
}

impl AppState {
    fn now(&self) -> i64 {
        (self.clock)()
    }
}

/// A registrar event with its position in the persisted log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub seq: u64,
    pub kind: String,
    pub event: RegistrarEvent,
}

/// Restores the controller from the database, or creates it and saves the
/// first snapshot when the database is empty.
pub fn bootstrap_registrar(
    db: &NominaDB,
    fresh: impl FnOnce() -> anyhow::Result<RegistrarController>,
    feed: Arc<dyn PriceFeed>,
) -> anyhow::Result<RegistrarController> {
    match db.get_snapshot::<ControllerSnapshot>(SNAPSHOT_KEY)? {
        Some(snapshot) => {
            let controller = RegistrarController::from_snapshot(snapshot, feed);
            tracing::info!(
                names = controller.registry().record_count(),
                events = db.event_count(),
                "registrar restored from snapshot"
            );
            Ok(controller)
        }
        None => {
            let controller = fresh()?;
            db.put_snapshot(SNAPSHOT_KEY, &controller.snapshot())?;
            tracing::info!("new registrar initialized");
            Ok(controller)
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/names/:name", get(name_handler))
        .route("/names/:name/price", get(price_handler))
        .route("/auctions/:batch", get(auction_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Server-defined codes, one per [`ErrorKind`]. Validation errors use
/// `INVALID_PARAMS`.
pub const STATE_ERROR: i32 = -32001;
pub const POLICY_ERROR: i32 = -32010;
pub const AUTHORIZATION_ERROR: i32 = -32011;
pub const PAYMENT_ERROR: i32 = -32012;
pub const PRICE_FEED_ERROR: i32 = -32013;

pub fn rpc_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => INVALID_PARAMS,
        ErrorKind::State => STATE_ERROR,
        ErrorKind::Policy => POLICY_ERROR,
        ErrorKind::Authorization => AUTHORIZATION_ERROR,
        ErrorKind::Payment => PAYMENT_ERROR,
        ErrorKind::PriceFeed => PRICE_FEED_ERROR,
    }
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {message}"))
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        tracing::error!("internal error: {}", message);
        Self::new(INTERNAL_ERROR, format!("Internal error: {message}"))
    }
}

impl From<&RegistrarError> for JsonRpcError {
    fn from(e: &RegistrarError) -> Self {
        Self {
            code: rpc_code(e.kind()),
            message: e.to_string(),
            data: Some(serde_json::json!({
                "kind": e.kind().to_string(),
                "code": e.code(),
            })),
        }
    }
}

impl From<DbError> for JsonRpcError {
    fn from(e: DbError) -> Self {
        Self::internal(e)
    }
}

type RpcResult = Result<serde_json::Value, JsonRpcError>;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    pub tld: String,
    pub names: usize,
    pub auction_batches: usize,
    pub events_persisted: usize,
    pub price_feed: String,
    /// `None` while the feed is down.
    pub quote: Option<Quote>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
    pub id: NameId,
    pub owner: Address,
    pub expiry: i64,
    pub status: NameStatus,
    pub approved: Option<Address>,
    pub parent: NameId,
    pub auction_batch: Option<BatchId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub name: String,
    pub duration: u64,
    pub registration: PriceBreakdown,
    /// `None` when no renewal price is configured for the bucket.
    pub renewal: Option<NativeAmount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuctionResponse {
    pub names: Vec<String>,
    pub status: AuctionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: NativeAmount,
    pub nonce: u64,
    pub allowlist_used: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn rest_error(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: None,
        }),
    )
        .into_response()
}

fn rest_registrar_error(e: &RegistrarError) -> Response {
    let status = match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::State => StatusCode::NOT_FOUND,
        ErrorKind::PriceFeed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: Some(e.code().to_string()),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registrar = state.registrar.read();
    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        chain_id: state.chain_id,
        tld: registrar.registry().tld().to_string(),
        names: registrar.registry().record_count(),
        auction_batches: registrar.auctions().batch_count(),
        events_persisted: state.db.event_count(),
        price_feed: registrar.price_feed().describe(),
        quote: registrar.price_feed().latest_quote().ok(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

async fn name_handler(Path(name): Path<String>, State(state): State<AppState>) -> Response {
    let now = state.now();
    let registrar = state.registrar.read();
    let registry = registrar.registry();
    let id = match registry.identifier_of(&name) {
        Ok(id) => id,
        Err(e) => return rest_registrar_error(&e),
    };
    match registry.record(&id) {
        Some(record) => Json(NameResponse {
            name: record.name.clone(),
            id,
            owner: record.owner,
            expiry: record.expiry,
            status: record.status(now, registry.grace_period()),
            approved: record.approved,
            parent: record.parent,
            auction_batch: registrar.auctions().batch_of(&id),
        })
        .into_response(),
        None => rest_error(StatusCode::NOT_FOUND, format!("Name not registered: {name}")),
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    /// Seconds. Defaults to one year.
    pub duration: Option<u64>,
}

async fn price_handler(
    Path(name): Path<String>,
    Query(query): Query<PriceQuery>,
    State(state): State<AppState>,
) -> Response {
    let now = state.now();
    let duration = query.duration.unwrap_or(SECONDS_PER_YEAR);
    let registrar = state.registrar.read();
    let registration = match registrar.quote(&name, duration, now) {
        Ok(breakdown) => breakdown,
        Err(e) => return rest_registrar_error(&e),
    };
    Json(PriceResponse {
        name: name.clone(),
        duration,
        registration,
        renewal: registrar
            .calculate_renewal_price(&name, duration)
            .ok(),
    })
    .into_response()
}

async fn auction_handler(Path(batch): Path<BatchId>, State(state): State<AppState>) -> Response {
    let now = state.now();
    let registrar = state.registrar.read();
    match registrar.auctions().batch(batch) {
        Some(found) => Json(AuctionResponse {
            names: found.names.clone(),
            status: found.status(now),
        })
        .into_response(),
        None => rest_error(
            StatusCode::NOT_FOUND,
            format!("Auction batch not found: {batch}"),
        ),
    }
}

async fn account_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    let address: Address = match address.parse() {
        Ok(a) => a,
        Err(e) => return rest_error(StatusCode::BAD_REQUEST, format!("Invalid address: {e}")),
    };
    let registrar = state.registrar.read();
    Json(AccountResponse {
        address,
        balance: registrar.balance_of(&address),
        nonce: registrar.nonce_of(&address),
        allowlist_used: registrar.allowlist_used(&address),
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// JSON-RPC Gateway
// ---------------------------------------------------------------------------

async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    let started = Instant::now();
    let outcome = dispatch(&state, &req);
    state
        .metrics
        .rpc_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code, "rpc call failed: {}", e.message);
            (None, Some(e))
        }
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn params<T: DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    let value = req
        .params
        .clone()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    serde_json::from_value(value).map_err(JsonRpcError::invalid_params)
}

fn to_value<T: Serialize>(value: T) -> RpcResult {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

fn parse_proof(proof: &[String]) -> Result<Vec<Hash32>, JsonRpcError> {
    proof
        .iter()
        .map(|h| {
            hash::from_hex(h).ok_or_else(|| JsonRpcError::invalid_params(format!("bad proof node {h}")))
        })
        .collect()
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Deserialize)]
struct NameDurationParams {
    name: String,
    #[serde(default = "one_year")]
    duration: u64,
}

#[derive(Deserialize)]
struct AccountParams {
    account: Address,
}

#[derive(Deserialize)]
struct BatchParams {
    batch_id: BatchId,
}

#[derive(Deserialize)]
struct EventsParams {
    #[serde(default)]
    from: u64,
    #[serde(default = "default_page")]
    limit: usize,
}

#[derive(Deserialize)]
struct VoucherCall {
    caller: Address,
    #[serde(default)]
    value: NativeAmount,
    voucher: RegistrationVoucher,
    signature: NominaSignature,
}

#[derive(Deserialize)]
struct ProofCall {
    caller: Address,
    #[serde(default)]
    value: NativeAmount,
    name: String,
    #[serde(default = "one_year")]
    duration: u64,
    proof: Vec<String>,
}

#[derive(Deserialize)]
struct PaidNameCall {
    caller: Address,
    #[serde(default)]
    value: NativeAmount,
    name: String,
    #[serde(default = "one_year")]
    duration: u64,
}

#[derive(Deserialize)]
struct AuctionPurchaseCall {
    caller: Address,
    #[serde(default)]
    value: NativeAmount,
    name: String,
    #[serde(default = "one_year")]
    duration: u64,
    price_ceiling: NativeAmount,
}

#[derive(Deserialize)]
struct TransferCall {
    caller: Address,
    name: String,
    from: Address,
    to: Address,
}

#[derive(Deserialize)]
struct ApproveCall {
    caller: Address,
    name: String,
    delegate: Option<Address>,
}

#[derive(Deserialize)]
struct SubnameCall {
    caller: Address,
    parent: String,
    label: String,
    owner: Address,
    #[serde(default = "one_year")]
    duration: u64,
}

#[derive(Deserialize)]
struct CallerOnly {
    caller: Address,
}

#[derive(Deserialize)]
struct SetTierCall {
    caller: Address,
    bucket: usize,
    /// Absent clears the tier.
    registration: Option<ReferenceAmount>,
    renewal: Option<ReferenceAmount>,
}

#[derive(Deserialize)]
struct AddressCall {
    caller: Address,
    address: Address,
}

#[derive(Deserialize)]
struct AllowlistRootCall {
    caller: Address,
    root: Option<String>,
}

#[derive(Deserialize)]
struct SignerCall {
    caller: Address,
    signer: Option<NominaPublicKey>,
}

#[derive(Deserialize)]
struct ReservationEntry {
    name: String,
    holder: Option<Address>,
}

#[derive(Deserialize)]
struct ReservationsCall {
    caller: Address,
    reservations: Vec<ReservationEntry>,
}

#[derive(Deserialize)]
struct CreateBatchCall {
    caller: Address,
    names: Vec<String>,
    start_price: ReferenceAmount,
    end_price: ReferenceAmount,
    window_duration: u64,
    window_start: i64,
}

#[derive(Deserialize)]
struct BatchActiveCall {
    caller: Address,
    batch_id: BatchId,
    active: bool,
}

#[derive(Deserialize)]
struct SecondsCall {
    caller: Address,
    seconds: u64,
}

#[derive(Deserialize)]
struct QuoteCall {
    caller: Address,
    answer: u128,
    #[serde(default = "default_quote_decimals")]
    decimals: u32,
}

fn one_year() -> u64 {
    SECONDS_PER_YEAR
}

fn default_page() -> usize {
    100
}

fn default_quote_decimals() -> u32 {
    8
}

/// Routes a request to its handler.
fn dispatch(state: &AppState, req: &JsonRpcRequest) -> RpcResult {
    let now = state.now();
    let ctx = |caller: Address| CallContext::new(caller, now);
    let paid = |caller: Address, value: NativeAmount| CallContext::new(caller, now).with_value(value);

    match req.method.as_str() {
        // -- Node ------------------------------------------------------------
        "nomina_version" => to_value(&state.version),
        "nomina_networkId" => to_value(&state.network),
        "nomina_chainId" => to_value(state.chain_id),

        // -- Reads -----------------------------------------------------------
        "nomina_getName" => {
            let p: NameParams = params(req)?;
            read(state, |r| {
                let id = r.registry().identifier_of(&p.name)?;
                r.registry()
                    .record(&id)
                    .cloned()
                    .ok_or(RegistrarError::UnknownName(p.name.clone()))
            })
        }
        "nomina_available" => {
            let p: NameParams = params(req)?;
            read(state, |r| r.registry().available(&p.name, now))
        }
        "nomina_price" => {
            let p: NameDurationParams = params(req)?;
            read(state, |r| r.quote(&p.name, p.duration, now))
        }
        "nomina_renewalPrice" => {
            let p: NameDurationParams = params(req)?;
            read(state, |r| r.calculate_renewal_price(&p.name, p.duration))
        }
        "nomina_nonce" => {
            let p: AccountParams = params(req)?;
            read(state, |r| Ok(r.nonce_of(&p.account)))
        }
        "nomina_balance" => {
            let p: AccountParams = params(req)?;
            read(state, |r| Ok(r.balance_of(&p.account)))
        }
        "nomina_reservation" => {
            let p: NameParams = params(req)?;
            read(state, |r| r.reservation_for(&p.name))
        }
        "nomina_auctionStatus" => {
            let p: BatchParams = params(req)?;
            read(state, |r| r.get_auction_status(p.batch_id, now))
        }
        "nomina_auctionPhase" => {
            let p: NameParams = params(req)?;
            read(state, |r| r.auction_phase(&p.name, now))
        }
        "nomina_config" => read(state, |r| Ok(r.config().clone())),
        "nomina_events" => {
            let p: EventsParams = params(req)?;
            let limit = p.limit.min(MAX_EVENTS_PER_PAGE);
            let events: Vec<(u64, RegistrarEvent)> = state.db.events_since(p.from, limit)?;
            to_value(
                events
                    .into_iter()
                    .map(|(seq, event)| StreamEvent {
                        seq,
                        kind: event.kind().to_string(),
                        event,
                    })
                    .collect::<Vec<_>>(),
            )
        }

        // -- Claims ----------------------------------------------------------
        "nomina_registerWithSignature" => {
            let p: VoucherCall = params(req)?;
            mutate(state, |r| {
                r.register_with_signature(&paid(p.caller, p.value), &p.voucher, &p.signature)
            })
        }
        "nomina_registerAuctionWithSignature" => {
            let p: VoucherCall = params(req)?;
            mutate(state, |r| {
                r.register_auction_with_signature(&paid(p.caller, p.value), &p.voucher, &p.signature)
            })
        }
        "nomina_registerWithProof" => {
            let p: ProofCall = params(req)?;
            let proof = parse_proof(&p.proof)?;
            mutate(state, |r| {
                r.register_with_merkle_proof(&paid(p.caller, p.value), &p.name, p.duration, &proof)
            })
        }
        "nomina_registerReserved" => {
            let p: PaidNameCall = params(req)?;
            mutate(state, |r| {
                r.register_reserved(&paid(p.caller, p.value), &p.name, p.duration)
            })
        }
        "nomina_purchaseAuction" => {
            let p: AuctionPurchaseCall = params(req)?;
            mutate(state, |r| {
                r.purchase_auction(&paid(p.caller, p.value), &p.name, p.duration, p.price_ceiling)
            })
        }

        // -- Owners ----------------------------------------------------------
        "nomina_renew" => {
            let p: PaidNameCall = params(req)?;
            mutate(state, |r| r.renew_name(&paid(p.caller, p.value), &p.name, p.duration))
        }
        "nomina_transfer" => {
            let p: TransferCall = params(req)?;
            mutate(state, |r| {
                let id = r.registry().identifier_of(&p.name)?;
                r.transfer(&ctx(p.caller), &id, p.from, p.to)
            })
        }
        "nomina_approve" => {
            let p: ApproveCall = params(req)?;
            mutate(state, |r| {
                let id = r.registry().identifier_of(&p.name)?;
                r.approve(&ctx(p.caller), &id, p.delegate)
            })
        }
        "nomina_registerSubname" => {
            let p: SubnameCall = params(req)?;
            mutate(state, |r| {
                let parent = r.registry().identifier_of(&p.parent)?;
                let (id, expiry) =
                    r.register_subname(&ctx(p.caller), &p.label, &parent, p.owner, p.duration)?;
                Ok(serde_json::json!({ "id": id, "expiry": expiry }))
            })
        }
        "nomina_withdraw" => {
            let p: CallerOnly = params(req)?;
            mutate(state, |r| r.withdraw(&ctx(p.caller)))
        }

        // -- Admin -----------------------------------------------------------
        "nomina_setTier" => {
            let p: SetTierCall = params(req)?;
            let tier = p.registration.map(|registration| TierPrice {
                registration,
                renewal: p.renewal,
            });
            mutate(state, |r| r.set_tier(&ctx(p.caller), p.bucket, tier))
        }
        "nomina_setPaymentRecipient" => {
            let p: AddressCall = params(req)?;
            mutate(state, |r| r.set_payment_recipient(&ctx(p.caller), p.address))
        }
        "nomina_setAllowlistRoot" => {
            let p: AllowlistRootCall = params(req)?;
            let root = p
                .root
                .as_deref()
                .map(|s| hash::from_hex(s).ok_or_else(|| JsonRpcError::invalid_params("bad root")))
                .transpose()?;
            mutate(state, |r| r.set_allowlist_root(&ctx(p.caller), root))
        }
        "nomina_setSignerKey" => {
            let p: SignerCall = params(req)?;
            mutate(state, |r| r.set_signer_key(&ctx(p.caller), p.signer))
        }
        "nomina_setReservations" => {
            let p: ReservationsCall = params(req)?;
            let entries: Vec<(String, Option<Address>)> = p
                .reservations
                .into_iter()
                .map(|e| (e.name, e.holder))
                .collect();
            mutate(state, |r| r.set_reservations(&ctx(p.caller), &entries))
        }
        "nomina_transferAdmin" => {
            let p: AddressCall = params(req)?;
            mutate(state, |r| r.transfer_admin(&ctx(p.caller), p.address))
        }
        "nomina_createAuctionBatch" => {
            let p: CreateBatchCall = params(req)?;
            let names: Vec<&str> = p.names.iter().map(String::as_str).collect();
            mutate(state, |r| {
                r.create_auction_batch(
                    &ctx(p.caller),
                    &names,
                    p.start_price,
                    p.end_price,
                    p.window_duration,
                    p.window_start,
                )
            })
        }
        "nomina_setAuctionBatchActive" => {
            let p: BatchActiveCall = params(req)?;
            mutate(state, |r| {
                r.set_auction_batch_active(&ctx(p.caller), p.batch_id, p.active)
            })
        }
        "nomina_setGracePeriod" => {
            let p: SecondsCall = params(req)?;
            mutate(state, |r| r.registry_mut().set_grace_period(p.caller, p.seconds))
        }
        "nomina_setMinRegistrationDuration" => {
            let p: SecondsCall = params(req)?;
            mutate(state, |r| {
                r.registry_mut()
                    .set_min_registration_duration(p.caller, p.seconds)
            })
        }
        "nomina_setQuote" => {
            let p: QuoteCall = params(req)?;
            set_quote(state, p, now)
        }

        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        )),
    }
}

/// Runs a read-only registrar query.
fn read<T, F>(state: &AppState, query: F) -> RpcResult
where
    T: Serialize,
    F: FnOnce(&RegistrarController) -> Result<T, RegistrarError>,
{
    let registrar = state.registrar.read();
    match query(&*registrar) {
        Ok(value) => to_value(value),
        Err(e) => Err(JsonRpcError::from(&e)),
    }
}

/// Runs a registrar mutation under the write lock, persists the outcome
/// and publishes its events.
fn mutate<T, F>(state: &AppState, op: F) -> RpcResult
where
    T: Serialize,
    F: FnOnce(&mut RegistrarController) -> Result<T, RegistrarError>,
{
    mutate_with(state, op, |snapshot, events| {
        state
            .db
            .save_snapshot_with_events(SNAPSHOT_KEY, snapshot, events)
    })
}

/// [`mutate`] with the write to storage supplied by the caller. If `persist`
/// fails the controller is restored to its state before `op` and the call's
/// events are dropped, so memory never runs ahead of the database.
fn mutate_with<T, F, P>(state: &AppState, op: F, persist: P) -> RpcResult
where
    T: Serialize,
    F: FnOnce(&mut RegistrarController) -> Result<T, RegistrarError>,
    P: FnOnce(&ControllerSnapshot, &[RegistrarEvent]) -> DbResult<u64>,
{
    let mut registrar = state.registrar.write();
    let before = registrar.snapshot();
    let outcome = op(&mut *registrar);
    let events = registrar.drain_events();

    let value = match outcome {
        Ok(value) => value,
        Err(e) => {
            state.metrics.observe_rejection(&e);
            return Err(JsonRpcError::from(&e));
        }
    };

    let first_seq = match persist(&registrar.snapshot(), &events) {
        Ok(seq) => seq,
        Err(e) => {
            let feed = Arc::clone(registrar.price_feed());
            *registrar = RegistrarController::from_snapshot(before, feed);
            tracing::error!(
                dropped_events = events.len(),
                "persisting registrar state failed, rolled back: {}",
                e
            );
            return Err(e.into());
        }
    };
    let names = registrar.registry().record_count();
    drop(registrar);

    state
        .metrics
        .names_registered
        .set(i64::try_from(names).unwrap_or(i64::MAX));
    state.metrics.observe_events(&events);
    for (offset, event) in events.into_iter().enumerate() {
        // No subscribers is fine.
        let _ = state.event_tx.send(StreamEvent {
            seq: first_seq + offset as u64,
            kind: event.kind().to_string(),
            event,
        });
    }
    to_value(value)
}

fn set_quote(state: &AppState, p: QuoteCall, now: i64) -> RpcResult {
    let admin = state.registrar.read().config().admin;
    if p.caller != admin {
        let e = RegistrarError::Unauthorized {
            caller: p.caller,
            action: "post price quotes",
        };
        state.metrics.observe_rejection(&e);
        return Err(JsonRpcError::from(&e));
    }
    if p.answer == 0 {
        return Err(JsonRpcError::invalid_params("answer must be positive"));
    }
    let quote = Quote::new(p.answer, p.decimals, now);
    state.feed.set_quote(quote);
    to_value(quote)
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Push-only stream of [`StreamEvent`]s. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
