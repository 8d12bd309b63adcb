/// Operator invoice endpoints
///
/// Teachers only see and change invoices where they are the instructor.
/// Admins act on every invoice.
use crate::{
    auth::OperatorAuth,
    billing::StatusChange,
    context::AppContext,
    error::{LmsError, LmsResult},
    store::{Invoice, InvoiceFilter, InvoiceStatus, NewInvoice},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

const MAX_LIST_LIMIT: i64 = 500;

/// Build invoice routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/invoices", post(create_invoice).get(list_invoices))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/status", post(set_status))
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub instructor_id: Option<String>,
    pub learner_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: InvoiceStatus,
}

/// Create a pending invoice
async fn create_invoice(
    State(ctx): State<AppContext>,
    auth: OperatorAuth,
    Json(mut req): Json<NewInvoice>,
) -> LmsResult<(StatusCode, Json<Invoice>)> {
    if !auth.is_admin() {
        if !req.instructor_id.is_empty() && req.instructor_id != auth.subject {
            return Err(LmsError::Authorization(
                "Teachers can only invoice for themselves".to_string(),
            ));
        }
        req.instructor_id = auth.subject.clone();
    }

    let invoice = ctx.invoices.create_invoice(req).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// List invoices visible to the caller
async fn list_invoices(
    State(ctx): State<AppContext>,
    auth: OperatorAuth,
    Query(query): Query<ListInvoicesQuery>,
) -> LmsResult<Json<ListInvoicesResponse>> {
    let status = query
        .status
        .as_deref()
        .map(InvoiceStatus::from_str)
        .transpose()?;

    let instructor_id = if auth.is_admin() {
        query.instructor_id
    } else {
        Some(auth.subject.clone())
    };

    let filter = InvoiceFilter {
        instructor_id,
        learner_id: query.learner_id,
        status,
        limit: Some(query.limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT)),
    };

    let invoices = ctx.invoices.list_invoices(&filter).await?;
    Ok(Json(ListInvoicesResponse { invoices }))
}

/// Fetch one invoice
async fn get_invoice(
    State(ctx): State<AppContext>,
    auth: OperatorAuth,
    Path(id): Path<String>,
) -> LmsResult<Json<Invoice>> {
    let invoice = load_owned(&ctx, &auth, &id).await?;
    Ok(Json(invoice))
}

/// Move an invoice to a new status, provisioning on payment
async fn set_status(
    State(ctx): State<AppContext>,
    auth: OperatorAuth,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> LmsResult<Json<StatusChange>> {
    load_owned(&ctx, &auth, &id).await?;

    let change = ctx.invoices.set_status(&id, req.status).await?;

    tracing::info!(
        "{} set invoice {} to {} ({} warnings)",
        auth.subject,
        change.invoice.invoice_number,
        change.invoice.status.as_str(),
        change.warnings.len()
    );

    Ok(Json(change))
}

/// Fetch an invoice the caller may act on. Foreign invoices read as missing.
async fn load_owned(ctx: &AppContext, auth: &OperatorAuth, id: &str) -> LmsResult<Invoice> {
    let invoice = ctx.invoices.get_invoice(id).await?;
    if !auth.is_admin() && invoice.instructor_id != auth.subject {
        return Err(LmsError::NotFound(format!("Invoice {} not found", id)));
    }
    Ok(invoice)
}
