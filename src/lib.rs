/// Lectern - entitlement and invoicing service for a multi-tenant learning platform
///
/// Decides whether a learner may open a lesson or attachment under its view
/// and device ceilings, tracks invoices through their lifecycle, and turns
/// paid invoices into course enrollments or wallet credit.

pub mod access;
pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod context;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod metrics;
pub mod server;
pub mod store;

pub use context::AppContext;
pub use error::{LmsError, LmsResult};
