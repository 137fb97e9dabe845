//! JSON routes over the shared ledger.
//!
//! Mutating handlers hand the whole operation (including the proof-of-work
//! seal) to the blocking pool while holding the ledger's write lock. Readers
//! wait on the lock asynchronously, so a long seal never parks a worker.

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::court::{CaseLedger, SharedLedger, SYSTEM_ACTOR};
use crate::error::LedgerError;
use crate::models::now_iso;

pub const ACTOR_HEADER: &str = "X-Actor";

pub struct AppState {
    pub ledger: SharedLedger,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    BadRequest(String),

    #[error("ledger worker failed")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::Validation(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Ledger(LedgerError::CaseNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::NoPendingTransactions) => StatusCode::CONFLICT,
            ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[derive(Deserialize)]
pub struct CreateCaseRequest {
    pub case_id: String,
    pub case_type: String,
    pub plaintiff_name: String,
    pub defendant_name: String,
    pub judge_id: String,
    pub description: String,
}

#[derive(Deserialize)]
pub struct DocumentRequest {
    pub document_name: String,
    pub document_content: String,
}

#[derive(Deserialize)]
pub struct HearingRequest {
    pub hearing_type: String,
    pub date: String,
    pub location: String,
}

#[derive(Deserialize)]
pub struct JudgmentRequest {
    pub ruling: String,
    pub verdict: String,
    pub details: String,
}

#[derive(Deserialize)]
pub struct JudgeRequest {
    pub name: String,
    pub specialty: String,
}

#[derive(Deserialize)]
pub struct VerifyDocumentRequest {
    pub case_id: String,
    pub document_content: String,
}

fn actor(req: &HttpRequest) -> String {
    req.headers()
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(SYSTEM_ACTOR)
        .to_string()
}

async fn mutate<F>(data: &web::Data<AppState>, op: F) -> Result<(), ApiError>
where
    F: FnOnce(&mut CaseLedger) -> Result<(), LedgerError> + Send + 'static,
{
    let ledger = data.ledger.clone();
    web::block(move || ledger.blocking_write(op)).await??;
    Ok(())
}

fn created(message: &str, case_id: &str) -> HttpResponse {
    HttpResponse::Created().json(json!({ "message": message, "case_id": case_id }))
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "court-ledger",
        "timestamp": now_iso(),
    }))
}

async fn get_all_cases(data: web::Data<AppState>) -> impl Responder {
    let cases = data.ledger.read().await.get_all_cases().clone();
    HttpResponse::Ok().json(json!({ "cases": cases }))
}

async fn get_case(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let case_id = path.into_inner();
    let (case, history) = {
        let ledger = data.ledger.read().await;
        (
            ledger.get_case_details(&case_id).cloned(),
            ledger.get_case_history(&case_id),
        )
    };
    let case = case.ok_or(LedgerError::CaseNotFound(case_id))?;
    Ok(HttpResponse::Ok().json(json!({ "case": case, "history": history })))
}

async fn get_case_history(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let case_id = path.into_inner();
    let history = data.ledger.read().await.get_case_history(&case_id);
    HttpResponse::Ok().json(json!({ "case_id": case_id, "history": history }))
}

async fn create_case(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateCaseRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let actor = actor(&req);
    let case_id = body.case_id.clone();
    mutate(&data, move |ledger| {
        ledger.create_case(
            &body.case_id,
            &body.case_type,
            &body.plaintiff_name,
            &body.defendant_name,
            &body.judge_id,
            &body.description,
            &actor,
        )
    })
    .await?;
    Ok(created("case created", &case_id))
}

async fn add_document(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DocumentRequest>,
) -> Result<HttpResponse, ApiError> {
    let case_id = path.into_inner();
    let body = body.into_inner();
    if body.document_content.is_empty() {
        return Err(ApiError::BadRequest("document_content is required".to_string()));
    }
    let actor = actor(&req);
    let id = case_id.clone();
    mutate(&data, move |ledger| {
        ledger.add_document(&id, &body.document_name, &body.document_content, &actor, &actor)
    })
    .await?;
    Ok(created("document added", &case_id))
}

async fn schedule_hearing(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<HearingRequest>,
) -> Result<HttpResponse, ApiError> {
    let case_id = path.into_inner();
    let body = body.into_inner();
    let actor = actor(&req);
    let id = case_id.clone();
    mutate(&data, move |ledger| {
        ledger.schedule_hearing(&id, &body.hearing_type, &body.date, &body.location, &actor)
    })
    .await?;
    Ok(created("hearing scheduled", &case_id))
}

async fn issue_judgment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<JudgmentRequest>,
) -> Result<HttpResponse, ApiError> {
    let case_id = path.into_inner();
    let body = body.into_inner();
    let actor = actor(&req);
    let id = case_id.clone();
    mutate(&data, move |ledger| {
        ledger.issue_judgment(&id, &body.ruling, &body.verdict, &body.details, &actor)
    })
    .await?;
    Ok(created("judgment issued", &case_id))
}

async fn register_judge(
    data: web::Data<AppState>,
    body: web::Json<JudgeRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.name.trim().is_empty() || body.specialty.trim().is_empty() {
        return Err(ApiError::BadRequest("name and specialty are required".to_string()));
    }
    let judge_id = data
        .ledger
        .write()
        .await
        .register_judge(&body.name, &body.specialty);
    Ok(HttpResponse::Created().json(json!({ "message": "judge registered", "judge_id": judge_id })))
}

async fn get_judges(data: web::Data<AppState>) -> impl Responder {
    let judges = data.ledger.read().await.judges().clone();
    HttpResponse::Ok().json(json!({ "judges": judges }))
}

async fn verify_document(
    data: web::Data<AppState>,
    body: web::Json<VerifyDocumentRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = data
        .ledger
        .read()
        .await
        .verify_document(&body.case_id, &body.document_content)?;
    Ok(HttpResponse::Ok().json(result))
}

async fn verify_chain(data: web::Data<AppState>) -> impl Responder {
    let report = data.ledger.read().await.integrity_report();
    HttpResponse::Ok().json(report)
}

async fn get_statistics(data: web::Data<AppState>) -> impl Responder {
    let statistics = data.ledger.read().await.get_statistics();
    HttpResponse::Ok().json(json!({ "statistics": statistics }))
}

async fn export_chain(data: web::Data<AppState>) -> impl Responder {
    let export = data.ledger.read().await.export_chain();
    HttpResponse::Ok().json(json!({ "blockchain": export }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/cases", web::get().to(get_all_cases))
            .route("/cases", web::post().to(create_case))
            .route("/cases/{case_id}", web::get().to(get_case))
            .route("/cases/{case_id}/history", web::get().to(get_case_history))
            .route("/cases/{case_id}/documents", web::post().to(add_document))
            .route("/cases/{case_id}/hearings", web::post().to(schedule_hearing))
            .route("/cases/{case_id}/judgment", web::post().to(issue_judgment))
            .route("/judges", web::post().to(register_judge))
            .route("/judges", web::get().to(get_judges))
            .route("/documents/verify", web::post().to(verify_document))
            .route("/blockchain/verify", web::get().to(verify_chain))
            .route("/blockchain/statistics", web::get().to(get_statistics))
            .route("/blockchain/export", web::get().to(export_chain)),
    );
}
