/// Billing: invoices and wallets
///
/// Invoices move pending -> paid -> refunded or pending -> cancelled. Entering
/// `paid` provisions what the invoice bought: an enrollment for catalog items,
/// a wallet credit for credit and AI-minute packs.

pub mod invoice;
pub mod wallet;

pub use invoice::InvoiceManager;
pub use wallet::WalletManager;

use crate::{
    enrollment::GrantOutcome,
    store::{Invoice, Wallet},
};
use serde::Serialize;

/// What the status change provisioned
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Provisioning {
    /// Status is not `paid`
    NotApplicable,
    Granted(GrantOutcome),
    WalletCredited(Wallet),
    Skipped { reason: String },
    /// The invoice stays paid; the operator must remediate
    Failed { error: String },
}

/// Operator-facing warning kinds, distinct from request errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    OwningEntityMissing,
    PartialCascadeFailure,
    ProvisioningFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningWarning {
    pub kind: WarningKind,
    /// Course, item or learner the warning is about
    pub subject: String,
    pub message: String,
}

/// Result of `InvoiceManager::set_status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub invoice: Invoice,
    pub provisioning: Provisioning,
    pub warnings: Vec<ProvisioningWarning>,
}
