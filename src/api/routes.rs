//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    CashMovement, FeeCatalogEntry, OperationContext, PostingRequest, ServiceRecord,
    SettlementStatus, TreasuryEntry,
};
use crate::error::AppError;
use crate::handlers::{
    CashMovementInput, ServiceRecordInput, SettlementQuote, SettlementResult,
    StatusTransitionCommand, TreasuryEntryInput,
};
use crate::outbox::{HookReceipt, PendingPosting};
use crate::posting::PostingOutcome;
use crate::projection::{BalanceSummary, RecapPeriod, RecapQuery, RecapSource, SortOrder};
use crate::state::AppState;
use crate::store::CashFilter;

// =========================================================================
// Request/Response types
// =========================================================================

/// Ledger table addressed by `/data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    KasUnit,
    LayananAdmin,
    LayananInfo,
    ArusKas,
}

#[derive(Debug, Deserialize)]
pub struct DataQuery {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
    /// Storage code or staff label of a settlement status
    #[serde(default)]
    pub status: Option<String>,
}

/// `POST /data` body: `{ "type": ..., "data": { ... } }`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UpsertRequest {
    KasUnit(CashMovementInput),
    LayananAdmin(ServiceRecordInput),
    LayananInfo(FeeCatalogEntry),
    ArusKas(TreasuryEntryInput),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DataRows {
    KasUnit(Vec<CashMovement>),
    LayananAdmin(Vec<ServiceRecord>),
    LayananInfo(Vec<FeeCatalogEntry>),
    ArusKas(Vec<TreasuryEntry>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DataRow {
    KasUnit(CashMovement),
    LayananAdmin(ServiceRecord),
    LayananInfo(FeeCatalogEntry),
    ArusKas(TreasuryEntry),
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PostingResponse {
    Posted {
        posting_id: Uuid,
        service_record: ServiceRecord,
        cash_movement: CashMovement,
    },
    AlreadyPosted {
        posting_id: Uuid,
    },
    Skipped {
        reason: String,
    },
}

impl From<PostingOutcome> for PostingResponse {
    fn from(outcome: PostingOutcome) -> Self {
        match outcome {
            PostingOutcome::Posted {
                posting_id,
                service_record,
                cash_movement,
            } => PostingResponse::Posted {
                posting_id,
                service_record,
                cash_movement,
            },
            PostingOutcome::AlreadyPosted { posting_id } => {
                PostingResponse::AlreadyPosted { posting_id }
            }
            PostingOutcome::Skipped { reason } => PostingResponse::Skipped { reason },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub unit: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecapSourceParam {
    Treasury,
    Unit,
    Combined,
}

#[derive(Debug, Deserialize)]
pub struct RecapParams {
    #[serde(default)]
    pub source: Option<RecapSourceParam>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl RecapParams {
    /// Defaults to the treasury ledger, newest period first.
    pub fn into_query(self) -> Result<RecapQuery, AppError> {
        let source = match self.source.unwrap_or(RecapSourceParam::Treasury) {
            RecapSourceParam::Treasury => RecapSource::Treasury,
            RecapSourceParam::Combined => RecapSource::Combined,
            RecapSourceParam::Unit => {
                let unit = self
                    .unit
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| AppError::InvalidRequest("unit is required for source=unit".to_string()))?;
                RecapSource::Unit(unit)
            }
        };

        let mut query = RecapQuery::new(source).with_order(self.order.unwrap_or_default());
        if let Some(year) = self.year {
            query = query.with_year(year);
        }
        if let Some(filter) = self.filter.filter(|f| !f.trim().is_empty()) {
            query = query.with_filter(filter);
        }
        Ok(query)
    }
}

fn parse_status(status: Option<&str>) -> Result<Option<SettlementStatus>, AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(AppError::InvalidRequest),
        None => Ok(None),
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Ledger tables
        .route("/data", get(list_data).post(upsert_data))
        // Postings
        .route("/hooks/after-save", post(after_save))
        .route("/hooks/pending/:pending_id", get(get_pending))
        .route("/postings", post(create_posting))
        // Unit balances
        .route("/units/:unit/balance", get(get_unit_balance))
        .route("/units/:unit/balances", get(get_unit_balances))
        .route("/units/:unit/cash/:id/status", post(transition_cash_status))
        // Settlement
        .route("/settlements/quote", post(quote_settlement))
        .route("/settlements/:quote_id/confirm", post(confirm_settlement))
        .route("/settlements/:quote_id", delete(cancel_settlement))
        // Recaps
        .route("/recap/monthly", get(monthly_recap))
        .route("/recap/yearly", get(yearly_recap))
}

// =========================================================================
// GET /data, POST /data
// =========================================================================

/// List the rows of one ledger table
async fn list_data(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<Json<DataRows>, AppError> {
    let unit = query.unit.as_deref().map(str::trim).filter(|u| !u.is_empty());

    let rows = match query.data_type {
        DataType::KasUnit => {
            let filter = CashFilter {
                unit: unit.map(str::to_string),
                status: parse_status(query.status.as_deref())?,
            };
            DataRows::KasUnit(state.ledger.list_cash_movements(&filter).await?)
        }
        DataType::LayananAdmin => {
            DataRows::LayananAdmin(state.ledger.list_service_records(unit).await?)
        }
        DataType::LayananInfo => DataRows::LayananInfo(state.ledger.list_fees().await?),
        DataType::ArusKas => DataRows::ArusKas(state.ledger.list_treasury_entries().await?),
    };

    Ok(Json(rows))
}

/// Create or edit one row. `arus_kas` is create-only.
async fn upsert_data(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<UpsertRequest>,
) -> Result<(StatusCode, Json<DataRow>), AppError> {
    let (status, row) = match request {
        UpsertRequest::KasUnit(input) => {
            let status = created_or_ok(input.id.is_none());
            let row = state.ledger.save_cash_movement(input, &context).await?;
            (status, DataRow::KasUnit(row))
        }
        UpsertRequest::LayananAdmin(input) => {
            let status = created_or_ok(input.id.is_none());
            let row = state.ledger.save_service_record(input, &context).await?;
            (status, DataRow::LayananAdmin(row))
        }
        UpsertRequest::LayananInfo(entry) => {
            (StatusCode::OK, DataRow::LayananInfo(state.ledger.upsert_fee(entry).await?))
        }
        UpsertRequest::ArusKas(input) => {
            let row = state.ledger.create_treasury_entry(input, &context).await?;
            (StatusCode::CREATED, DataRow::ArusKas(row))
        }
    };

    Ok((status, Json(row)))
}

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

// =========================================================================
// Postings
// =========================================================================

/// After-save hook. Always answers 202; failures show up as `accepted: false`.
async fn after_save(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<PostingRequest>,
) -> (StatusCode, Json<HookReceipt>) {
    let receipt = state.outbox.after_save(request, &context).await;
    (StatusCode::ACCEPTED, Json(receipt))
}

async fn get_pending(
    State(state): State<AppState>,
    Path(pending_id): Path<Uuid>,
) -> Result<Json<PendingPosting>, AppError> {
    state
        .outbox
        .get(pending_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("pending posting {}", pending_id)))
}

/// Synchronous posting
async fn create_posting(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<PostingRequest>,
) -> Result<(StatusCode, Json<PostingResponse>), AppError> {
    let outcome = state.engine.post(&request, &context).await?;

    let status = match outcome {
        PostingOutcome::Posted { .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome.into())))
}

// =========================================================================
// Unit balances
// =========================================================================

async fn get_unit_balance(
    State(state): State<AppState>,
    Path(unit): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceSummary>, AppError> {
    let status = parse_status(query.status.as_deref())?;
    Ok(Json(state.balances.balance(&unit, status).await?))
}

async fn get_unit_balances(
    State(state): State<AppState>,
    Path(unit): Path<String>,
) -> Result<Json<Vec<BalanceSummary>>, AppError> {
    Ok(Json(state.balances.balances_by_status(&unit).await?))
}

async fn transition_cash_status(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path((unit, id)): Path<(String, Uuid)>,
    Json(command): Json<StatusTransitionCommand>,
) -> Result<Json<CashMovement>, AppError> {
    Ok(Json(state.ledger.transition(&unit, id, command, &context).await?))
}

// =========================================================================
// Settlement
// =========================================================================

async fn quote_settlement(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<SettlementQuote>, AppError> {
    Ok(Json(state.settlement.quote(&request.unit).await?))
}

async fn confirm_settlement(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(quote_id): Path<Uuid>,
) -> Result<(StatusCode, Json<SettlementResult>), AppError> {
    let result = state.settlement.confirm(quote_id, &context).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn cancel_settlement(
    State(state): State<AppState>,
    Path(quote_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.settlement.cancel(quote_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Recaps
// =========================================================================

async fn monthly_recap(
    State(state): State<AppState>,
    Query(params): Query<RecapParams>,
) -> Result<Json<Vec<RecapPeriod>>, AppError> {
    let query = params.into_query()?;
    Ok(Json(state.recap.monthly_recap(&query).await?))
}

async fn yearly_recap(
    State(state): State<AppState>,
    Query(params): Query<RecapParams>,
) -> Result<Json<Vec<RecapPeriod>>, AppError> {
    let query = params.into_query()?;
    Ok(Json(state.recap.yearly_recap(&query).await?))
}
