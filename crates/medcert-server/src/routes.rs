// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP routes.
//
//   GET  /health
//   GET  /api/verify/:input?qr=<token>
//   POST /api/certificates                       {"transactionId": 42}
//   GET  /api/certificates/:id/download
//   POST /api/certificates/:id/status            {"status": "revoked", "reason": "..."}
//
// Failures go through `public_error`, so bodies carry fixed messages only.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use medcert_certificates::DownloadOutcome;
use medcert_core::error::MedcertError;
use medcert_core::public_errors::{Operation, public_error};
use medcert_core::types::{CertificateId, CertificateStatus, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::services::app_services::AppServices;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Build the application router.
pub fn router(services: AppServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/verify/:input", get(verify))
        .route("/api/certificates", post(issue))
        .route("/api/certificates/:id/download", get(download))
        .route("/api/certificates/:id/status", post(change_status))
        .with_state(services)
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    "OK"
}

// === Error mapping ===

fn error_response(op: Operation, err: &MedcertError) -> Response {
    let public = public_error(op, err);
    if public.status >= 500 {
        error!(kind = %err.kind(), error = %err, ?op, "request failed");
    } else {
        info!(kind = %err.kind(), ?op, "request rejected");
    }
    let status = StatusCode::from_u16(public.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": public.message }))).into_response()
}

/// Run synchronous backend work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "blocking task failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal error" })),
        )
            .into_response()
    })
}

fn parse_id(op: Operation, raw: &str) -> Result<CertificateId, Response> {
    raw.parse()
        .map_err(|_| error_response(op, &MedcertError::not_found("certificate", raw)))
}

// === Verification ===

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub qr: Option<String>,
}

/// GET /api/verify/:input
async fn verify(
    State(services): State<AppServices>,
    Path(input): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let now = Utc::now();
    let verdict = match blocking(move || services.verify(&input, query.qr.as_deref(), now)).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = if verdict.found() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(verdict)).into_response()
}

// === Issuance ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub transaction_id: TransactionId,
}

/// What the issuing client gets back. The signature and storage path stay
/// server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedResponse {
    pub id: CertificateId,
    pub certificate_number: String,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub qr_code_data: String,
    pub qr_token: String,
    pub verification_hash: String,
    pub document_encrypted: bool,
}

/// POST /api/certificates
async fn issue(State(services): State<AppServices>, Json(req): Json<IssueRequest>) -> Response {
    let now = Utc::now();
    let result = match blocking(move || services.issue(req.transaction_id, now)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match result {
        Ok(issued) => {
            let cert = issued.certificate;
            let body = IssuedResponse {
                id: cert.id,
                certificate_number: cert.certificate_number,
                status: cert.status,
                issued_at: cert.issued_at,
                expires_at: cert.expires_at,
                qr_code_data: cert.qr_code_data,
                qr_token: cert.qr_token,
                verification_hash: cert.verification_hash,
                document_encrypted: issued.document_encrypted,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => error_response(Operation::Issue, &e),
    }
}

// === Download ===

/// GET /api/certificates/:id/download
async fn download(State(services): State<AppServices>, Path(raw_id): Path<String>) -> Response {
    let id = match parse_id(Operation::Download, &raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let now = Utc::now();
    let result = match blocking(move || services.download(id, now)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match result {
        Ok(DownloadOutcome::Available(doc)) => {
            let disposition = format!("attachment; filename=\"{}\"", doc.filename);
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            match HeaderValue::from_str(&disposition) {
                Ok(v) => {
                    headers.insert(header::CONTENT_DISPOSITION, v);
                }
                Err(e) => {
                    return error_response(
                        Operation::Download,
                        &MedcertError::Validation(format!("bad filename: {e}")),
                    );
                }
            }
            // The body owns its own copy; `doc.content` is wiped on drop.
            (StatusCode::OK, headers, doc.content.as_bytes().to_vec()).into_response()
        }
        Ok(DownloadOutcome::NotAvailable { .. }) => (
            StatusCode::GONE,
            Json(json!({ "error": "certificate document not available" })),
        )
            .into_response(),
        Err(e) => error_response(Operation::Download, &e),
    }
}

// === Administration ===

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    pub id: CertificateId,
    pub certificate_number: String,
    pub status: CertificateStatus,
}

/// POST /api/certificates/:id/status
async fn change_status(
    State(services): State<AppServices>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusChangeRequest>,
) -> Response {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    let capability = match services.authorize(presented) {
        Ok(cap) => cap,
        Err(e) => return error_response(Operation::StatusChange, &e),
    };
    let id = match parse_id(Operation::StatusChange, &raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let target: CertificateStatus = match req.status.parse() {
        Ok(t) => t,
        Err(e) => return error_response(Operation::StatusChange, &e),
    };

    let now = Utc::now();
    let result = match blocking(move || {
        services.change_status(&capability, id, target, req.reason.as_deref(), now)
    })
    .await
    {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match result {
        Ok(cert) => Json(StatusChangeResponse {
            id: cert.id,
            certificate_number: cert.certificate_number,
            status: cert.status,
        })
        .into_response(),
        Err(e) => error_response(Operation::StatusChange, &e),
    }
}
