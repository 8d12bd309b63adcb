/// Learner wallet endpoint
use crate::{auth::AuthContext, context::AppContext, error::LmsResult, store::Wallet};
use axum::{extract::State, response::Json, routing::get, Router};

/// Build wallet routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/wallet", get(get_wallet))
}

async fn get_wallet(State(ctx): State<AppContext>, auth: AuthContext) -> LmsResult<Json<Wallet>> {
    let wallet = ctx.wallet.balance(&auth.subject).await?;
    Ok(Json(wallet))
}
