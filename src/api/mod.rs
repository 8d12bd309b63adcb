/// API routes and handlers
pub mod content;
pub mod enrollments;
pub mod health;
pub mod invoices;
pub mod middleware;
pub mod wallet;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(content::routes())
        .merge(invoices::routes())
        .merge(enrollments::routes())
        .merge(wallet::routes())
}
