use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::ExtractionResult;
use crate::models::job::JobRequirements;
use crate::models::processed::ProcessedCandidate;
use crate::models::record::RawRecord;
use crate::screening::intake::{record_from_resume, records_from_csv};
use crate::screening::orchestrator::BatchSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ExtractRequest {
    pub record: RawRecord,
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub records: Vec<RawRecord>,
    pub requirements: JobRequirements,
    pub concurrency: Option<usize>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub summary: BatchSummary,
    pub candidates: Vec<ProcessedCandidate>,
}

/// POST /api/v1/screening/extract
pub async fn handle_extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractionResult>, AppError> {
    let Json(req) = payload.map_err(bad_json)?;
    let result = state.orchestrator.extractor().extract(&req.record).await;
    Ok(Json(result))
}

/// POST /api/v1/screening/batch
pub async fn handle_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(req) = payload.map_err(bad_json)?;
    screen_and_store(&state, req.records, &req.requirements, req.concurrency).await
}

/// POST /api/v1/screening/csv
/// Multipart fields: `candidates` (CSV file), `requirements` (JSON), `concurrency` (optional).
pub async fn handle_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, AppError> {
    let mut csv_bytes = None;
    let mut requirements = None;
    let mut concurrency = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "candidates" => csv_bytes = Some(field.bytes().await?),
            "requirements" => requirements = Some(parse_requirements(&field.text().await?)?),
            "concurrency" => concurrency = Some(parse_concurrency(&field.text().await?)?),
            other => debug!("ignoring multipart field '{other}'"),
        }
    }

    let csv_bytes =
        csv_bytes.ok_or_else(|| AppError::Validation("missing 'candidates' file".to_string()))?;
    let requirements = requirements
        .ok_or_else(|| AppError::Validation("missing 'requirements' field".to_string()))?;

    let records = records_from_csv(&csv_bytes)?;
    info!("Parsed {} candidate rows from CSV upload", records.len());
    screen_and_store(&state, records, &requirements, concurrency).await
}

/// POST /api/v1/screening/resume
/// Multipart fields: `resume` (PDF or plain text), `requirements` (JSON).
pub async fn handle_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, AppError> {
    let mut resume = None;
    let mut requirements = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                resume = Some((file_name, content_type, bytes));
            }
            "requirements" => requirements = Some(parse_requirements(&field.text().await?)?),
            other => debug!("ignoring multipart field '{other}'"),
        }
    }

    let (file_name, content_type, bytes) =
        resume.ok_or_else(|| AppError::Validation("missing 'resume' file".to_string()))?;
    let requirements = requirements
        .ok_or_else(|| AppError::Validation("missing 'requirements' field".to_string()))?;

    // PDF parsing is CPU-bound.
    let record = tokio::task::spawn_blocking(move || {
        record_from_resume(file_name.as_deref(), content_type.as_deref(), &bytes)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    screen_and_store(&state, vec![record], &requirements, Some(1)).await
}

async fn screen_and_store(
    state: &AppState,
    records: Vec<RawRecord>,
    requirements: &JobRequirements,
    concurrency: Option<usize>,
) -> Result<Json<BatchResponse>, AppError> {
    if records.is_empty() {
        return Err(AppError::Validation("no candidate records supplied".to_string()));
    }

    let concurrency = concurrency.unwrap_or(state.default_concurrency);
    let candidates = state
        .orchestrator
        .process_batch(records, requirements, concurrency)
        .await?;

    let batch_id = Uuid::new_v4();
    state.repository.save_batch(batch_id, &candidates).await?;

    let summary = BatchSummary::from_results(&candidates);
    info!(
        "Screened batch {batch_id}: {} succeeded, {} partial, {} failed",
        summary.succeeded, summary.partial, summary.failed
    );
    Ok(Json(BatchResponse {
        batch_id,
        summary,
        candidates,
    }))
}

fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

fn parse_requirements(raw: &str) -> Result<JobRequirements, AppError> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Validation(format!("'requirements' is not valid JSON: {e}")))
}

fn parse_concurrency(raw: &str) -> Result<usize, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("'concurrency' must be a positive integer, got '{raw}'")))
}
