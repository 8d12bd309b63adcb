/// Enrollment endpoints: operator grants and learner self-service
use crate::{
    auth::{AuthContext, OperatorAuth},
    context::AppContext,
    enrollment::{CourseGrant, EnrollmentResult},
    error::LmsResult,
    store::{EnrollmentSource, ItemType},
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;

/// Build enrollment routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/enrollments/grant", post(grant))
        .route("/api/courses/:id/enroll", post(enroll_self))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub learner_id: String,
    pub item_id: String,
    pub item_type: ItemType,
}

/// Manual grant by an operator. Store failures are reported in the body.
async fn grant(
    State(ctx): State<AppContext>,
    auth: OperatorAuth,
    Json(req): Json<GrantRequest>,
) -> Json<EnrollmentResult> {
    tracing::info!(
        "{} granting {} {} to {}",
        auth.subject,
        req.item_type.as_str(),
        req.item_id,
        req.learner_id
    );

    let result = ctx
        .resolver
        .grant(&req.learner_id, &req.item_id, req.item_type, EnrollmentSource::Manual)
        .await;

    Json(EnrollmentResult::from(result))
}

/// Self-service enrollment into a published free course
async fn enroll_self(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(course_id): Path<String>,
) -> LmsResult<Json<CourseGrant>> {
    let grant = ctx.resolver.enroll_self(&auth.subject, &course_id).await?;
    Ok(Json(grant))
}
