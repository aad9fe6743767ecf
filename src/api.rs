//! HTTP API for the Payslip Engine.
//!
//! This module wires the calculator and the report interpreter to an
//! [`axum`](https://crates.io/crates/axum) router.  Handlers take a
//! snapshot of the shared registries, call into the core, and pass the
//! result on to the store.  The LINE webhook endpoint accepts the
//! platform's event envelope and feeds each text message through
//! [`ReportIntake`].  Submissions take the insurance and vehicle lease
//! fees from the driver directory when the form leaves them at zero.

use crate::config::EngineConfig;
use crate::display::{payslip_email_body, payslip_email_subject, PayslipDocument};
use crate::engine::{
    apply_driver_deductions, fill_driver_deductions, issue_payslip, preview, resolve_lines,
    run_monthly_batch, BatchOutcome, LineRequest, PayslipRequest,
};
use crate::error::{PayslipError, StoreError, ValidationError};
use crate::intake::{IncomingMessage, IntakeOutcome, LoggingReplySender, ReplySender, ReportIntake};
use crate::models::{
    DailyReport, DeductionSet, LineInput, PayslipMeta, PayslipRecord, PayslipResult,
};
use crate::registry::{load_seed_from_dir, DeliveryTypeRegistry, DriverDirectory, SeedFile};
use crate::store::{MemoryStore, PayslipStore};
use crate::tax::{InclusiveConsumptionTax, TaxCalculator};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Application state shared across requests.
pub struct AppState {
    pub delivery_types: RwLock<DeliveryTypeRegistry>,
    pub drivers: RwLock<DriverDirectory>,
    pub store: MemoryStore,
    pub replies: Arc<dyn ReplySender>,
    pub tax: Arc<dyn TaxCalculator>,
    pub app_url: Option<String>,
}

impl AppState {
    pub fn new(
        seed: SeedFile,
        tax: Arc<dyn TaxCalculator>,
        replies: Arc<dyn ReplySender>,
        app_url: Option<String>,
    ) -> Self {
        Self {
            delivery_types: RwLock::new(DeliveryTypeRegistry::new(seed.delivery_types)),
            drivers: RwLock::new(DriverDirectory::new(seed.drivers)),
            store: MemoryStore::new(),
            replies,
            tax,
            app_url,
        }
    }
}

/// Errors returned by handlers, rendered as `{"error", "message"}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "Bad Request", m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "Not Found", m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", m)
            }
        };
        let body = Json(serde_json::json!({ "error": error, "message": message }));
        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PayslipError> for ApiError {
    fn from(err: PayslipError) -> Self {
        match err {
            PayslipError::Validation(v) => v.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(format!("データが見つかりません: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Body of `POST /api/payslips/preview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub deductions: DeductionSet,
}

/// Body of `POST /api/payslips`.  Prices are looked up at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPayslipRequest {
    pub meta: PayslipMeta,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub deductions: DeductionSet,
}

/// Query of `GET /api/payslips/:id/email`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailQuery {
    #[serde(default)]
    pub custom_message: Option<String>,
}

/// A payslip email ready for the mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayslipEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub driver_id: String,
    pub line_user_id: String,
}

/// LINE webhook envelope.  Only the fields used here are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// The event as an incoming text message, or `None` for any other
    /// kind of event.
    fn into_message(self) -> Option<IncomingMessage> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message.filter(|m| m.kind == "text")?;
        let received_at = self
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Some(IncomingMessage {
            sender_id: self.source.and_then(|s| s.user_id).unwrap_or_default(),
            reply_token: self.reply_token.unwrap_or_default(),
            text: message.text.unwrap_or_default(),
            received_on: received_at.date_naive(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub outcomes: Vec<IntakeOutcome>,
}

/// Build the API router from configuration, loading seed data from the
/// configured directory.  Returns the router and a handle to the state.
pub async fn build_router(config: &EngineConfig) -> Result<(Router, Arc<AppState>)> {
    let seed = load_seed_from_dir(&config.seed_dir)?;
    tracing::info!(
        delivery_types = seed.delivery_types.len(),
        drivers = seed.drivers.len(),
        "seed data loaded"
    );
    let tax: Arc<dyn TaxCalculator> = Arc::new(InclusiveConsumptionTax {
        rate_percent: config.tax_rate_percent,
    });
    let state = Arc::new(AppState::new(
        seed,
        tax,
        Arc::new(LoggingReplySender),
        config.app_url.clone(),
    ));
    Ok((router(state.clone()), state))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/payslips", post(submit_payslip_handler))
        .route("/api/payslips/preview", post(preview_handler))
        .route("/api/payslips/batch", post(batch_handler))
        .route("/api/payslips/:id/document", get(document_handler))
        .route("/api/payslips/:id/email", get(email_handler))
        .route("/api/drivers/:id/payslips", get(driver_payslips_handler))
        .route("/api/drivers/:id/reports", get(driver_reports_handler))
        .route("/api/line/webhook", post(webhook_handler))
        .route("/api/line/link", post(link_handler))
        .with_state(state)
}

/// Handler for POST /api/payslips/preview
pub async fn preview_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<PreviewRequest>,
) -> Result<Json<PayslipResult>, ApiError> {
    let result = preview(&input.lines, &input.deductions, app_state.tax.as_ref())?;
    Ok(Json(result))
}

/// Handler for POST /api/payslips
pub async fn submit_payslip_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<SubmitPayslipRequest>,
) -> Result<(StatusCode, Json<PayslipRecord>), ApiError> {
    let lines = {
        let registry = app_state.delivery_types.read().await;
        resolve_lines(&input.lines, &registry)?
    };
    let mut request = PayslipRequest {
        meta: input.meta,
        lines,
        deductions: input.deductions,
    };
    if let Some(driver) = app_state.drivers.read().await.get(&request.meta.driver_id) {
        apply_driver_deductions(&mut request.deductions, driver);
    }
    let record = issue_payslip(request, app_state.tax.as_ref())?;
    app_state.store.save_payslip(record.clone()).await?;
    tracing::info!(
        id = %record.id,
        driver = %record.meta.driver_name,
        year = record.meta.year,
        month = record.meta.month,
        net_pay = record.result.net_pay,
        "payslip issued"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// Handler for POST /api/payslips/batch
pub async fn batch_handler(
    State(app_state): State<Arc<AppState>>,
    Json(mut requests): Json<Vec<PayslipRequest>>,
) -> Result<Json<BatchOutcome>, ApiError> {
    fill_driver_deductions(&mut requests, &*app_state.drivers.read().await);
    let tax = app_state.tax.clone();
    let outcome = tokio::task::spawn_blocking(move || run_monthly_batch(requests, tax.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    for record in &outcome.issued {
        app_state.store.save_payslip(record.clone()).await?;
    }
    tracing::info!(
        issued = outcome.issued.len(),
        failed = outcome.failures.len(),
        "monthly batch finished"
    );
    Ok(Json(outcome))
}

/// Handler for GET /api/payslips/:id/document
pub async fn document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PayslipDocument>, ApiError> {
    let record = app_state.store.payslip(&parse_id(&id)?).await?;
    Ok(Json(PayslipDocument::from_record(&record)))
}

/// Handler for GET /api/payslips/:id/email
pub async fn email_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<PayslipEmail>, ApiError> {
    let record = app_state.store.payslip(&parse_id(&id)?).await?;
    let to = app_state
        .drivers
        .read()
        .await
        .get(&record.meta.driver_id)
        .and_then(|d| d.email.clone())
        .filter(|email| !email.trim().is_empty())
        .ok_or(ValidationError::MissingDriverEmail)?;
    Ok(Json(PayslipEmail {
        to,
        subject: payslip_email_subject(&record),
        body: payslip_email_body(&record, query.custom_message.as_deref()),
    }))
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("invalid id: {id}")))
}

/// Handler for GET /api/drivers/:id/payslips
pub async fn driver_payslips_handler(
    State(app_state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Json<Vec<PayslipRecord>> {
    Json(app_state.store.payslips_for_driver(&driver_id).await)
}

/// Handler for GET /api/drivers/:id/reports
pub async fn driver_reports_handler(
    State(app_state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Json<Vec<DailyReport>> {
    Json(app_state.store.reports_for_driver(&driver_id).await)
}

/// Handler for POST /api/line/webhook
pub async fn webhook_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<WebhookBody>,
) -> Json<WebhookResponse> {
    // Snapshots, so no lock is held while replies are sent.
    let delivery_types = app_state.delivery_types.read().await.clone();
    let drivers = app_state.drivers.read().await.clone();
    let intake = ReportIntake {
        delivery_types: &delivery_types,
        drivers: &drivers,
        store: &app_state.store,
        replies: app_state.replies.as_ref(),
        app_url: app_state.app_url.as_deref(),
    };
    let messages: Vec<IncomingMessage> = body
        .events
        .into_iter()
        .filter_map(WebhookEvent::into_message)
        .collect();
    let outcomes = intake.handle_messages(&messages).await;
    Json(WebhookResponse {
        success: !outcomes
            .iter()
            .any(|o| matches!(o, IntakeOutcome::Failed { .. })),
        outcomes,
    })
}

/// Handler for POST /api/line/link
pub async fn link_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<LinkRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if input.driver_id.is_empty() || input.line_user_id.is_empty() {
        return Err(ApiError::BadRequest(
            "driverIdとlineUserIdが必要です".to_string(),
        ));
    }
    let linked = app_state
        .drivers
        .write()
        .await
        .link_line_user(&input.driver_id, &input.line_user_id);
    if !linked {
        return Err(ApiError::NotFound("ドライバーが見つかりません".to_string()));
    }
    tracing::info!(driver_id = %input.driver_id, "LINE account linked");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "LINE連携を設定しました"
    })))
}

/// Launch the API server.  This function builds the router from the
/// given configuration and binds to the configured address.  It blocks
/// until the server terminates (e.g. when interrupted).
pub async fn serve(config: EngineConfig) -> Result<()> {
    let (router, _state) = build_router(&config).await?;
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
