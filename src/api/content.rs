/// Learner-facing content access endpoints
use crate::{
    access::{AccessDecision, ClientSignals, OpenOutcome},
    api::middleware::header_str,
    auth::AuthContext,
    context::AppContext,
    error::LmsResult,
    store::ContentKind,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

/// Build content routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/content/:kind/:id/access", get(access_status))
        .route("/api/content/:kind/:id/open", post(open_content))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatusResponse {
    #[serde(flatten)]
    pub decision: AccessDecision,
    pub allowed: bool,
    pub degraded: bool,
}

/// Current decision for the caller without recording an open
async fn access_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((kind, id)): Path<(String, String)>,
) -> LmsResult<Json<AccessStatusResponse>> {
    let kind = ContentKind::from_str(&kind)?;
    let (decision, degraded) = ctx.gate.status(kind, &id, &auth.subject).await?;

    Ok(Json(AccessStatusResponse {
        allowed: decision.allowed(),
        decision,
        degraded,
    }))
}

/// Open a lesson or attachment: check, then record if allowed
async fn open_content(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<ClientSignals>>,
) -> LmsResult<Json<OpenOutcome>> {
    let kind = ContentKind::from_str(&kind)?;
    let signals = with_header_signals(body.map(|Json(s)| s).unwrap_or_default(), &headers);

    let outcome = ctx.gate.open(kind, &id, &auth.subject, &signals).await?;
    Ok(Json(outcome))
}

/// Fill user agent and language from request headers when the client did not send them
fn with_header_signals(mut signals: ClientSignals, headers: &HeaderMap) -> ClientSignals {
    if signals.user_agent.is_none() {
        signals.user_agent = header_str(headers, "user-agent").map(str::to_string);
    }
    if signals.language.is_none() {
        signals.language = header_str(headers, "accept-language")
            .and_then(|v| v.split(',').next())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
    }
    signals
}
