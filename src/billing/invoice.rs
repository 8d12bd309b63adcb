/// Invoice management and payment reconciliation
use crate::{
    billing::{Provisioning, ProvisioningWarning, StatusChange, WalletManager, WarningKind},
    enrollment::{CourseGrantStatus, EnrollmentResolver, GrantOutcome},
    error::{LmsError, LmsResult},
    metrics,
    store::{Invoice, InvoiceFilter, InvoiceStatus, ItemType, LearningStore, NewInvoice},
};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use uuid::Uuid;

const INVOICE_NUMBER_ATTEMPTS: usize = 3;
const STATUS_WRITE_ATTEMPTS: usize = 3;

/// Invoice manager
#[derive(Clone)]
pub struct InvoiceManager {
    store: Arc<dyn LearningStore>,
    resolver: EnrollmentResolver,
    wallet: WalletManager,
}

impl InvoiceManager {
    pub fn new(store: Arc<dyn LearningStore>, resolver: EnrollmentResolver, wallet: WalletManager) -> Self {
        Self {
            store,
            resolver,
            wallet,
        }
    }

    /// Generate a human-facing invoice number
    pub fn generate_invoice_number(now: DateTime<Utc>) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();

        format!("INV-{}-{}", now.format("%Y%m%d"), suffix.to_uppercase())
    }

    fn validate(new: &NewInvoice) -> LmsResult<()> {
        if new.learner_id.trim().is_empty() || new.instructor_id.trim().is_empty() {
            return Err(LmsError::Validation(
                "Invoice requires a learner and an instructor".to_string(),
            ));
        }
        if new.item_id.trim().is_empty() {
            return Err(LmsError::Validation("Invoice requires an item".to_string()));
        }
        if new.total_price < 0 {
            return Err(LmsError::Validation("Total price cannot be negative".to_string()));
        }
        if new.payment_type.trim().is_empty() {
            return Err(LmsError::Validation("Payment type is required".to_string()));
        }

        match new.item_type {
            ItemType::Credits if new.credits_amount.unwrap_or(0) <= 0 => Err(LmsError::Validation(
                "Credits invoices require a positive credits_amount".to_string(),
            )),
            ItemType::AiMinutes if new.minutes_amount.unwrap_or(0) <= 0 => {
                Err(LmsError::Validation(
                    "AI minutes invoices require a positive minutes_amount".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Create a pending invoice
    pub async fn create_invoice(&self, new: NewInvoice) -> LmsResult<Invoice> {
        Self::validate(&new)?;

        let now = Utc::now();
        let mut invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            invoice_number: Self::generate_invoice_number(now),
            learner_id: new.learner_id,
            instructor_id: new.instructor_id,
            item_id: new.item_id,
            item_type: new.item_type,
            total_price: new.total_price,
            payment_type: new.payment_type,
            status: InvoiceStatus::Pending,
            created_at: now,
            paid_at: None,
            credits_amount: new.credits_amount,
            minutes_amount: new.minutes_amount,
        };

        let mut attempt = 1;
        loop {
            match self.store.insert_invoice(&invoice).await {
                Ok(()) => break,
                Err(LmsError::Conflict(_)) if attempt < INVOICE_NUMBER_ATTEMPTS => {
                    tracing::debug!("Invoice number {} taken, regenerating", invoice.invoice_number);
                    invoice.invoice_number = Self::generate_invoice_number(now);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Created invoice {} for {} ({} {})",
            invoice.invoice_number,
            invoice.learner_id,
            invoice.item_type.as_str(),
            invoice.item_id
        );
        metrics::record_invoice_created(invoice.item_type.as_str());

        Ok(invoice)
    }

    /// Get invoice by id
    pub async fn get_invoice(&self, id: &str) -> LmsResult<Invoice> {
        self.store
            .get_invoice(id)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Invoice {} not found", id)))
    }

    /// List invoices with optional filters
    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> LmsResult<Vec<Invoice>> {
        self.store.list_invoices(filter).await
    }

    /// Change an invoice's status and provision what a payment grants.
    ///
    /// The status write is authoritative: provisioning runs after it and its
    /// failures come back as `Provisioning::Failed` plus warnings, never as an
    /// error of this call.
    ///
    /// The write is a compare-and-set on the status read here. When another
    /// writer changed the invoice in between, the transition is re-evaluated
    /// against the fresh row, so only the call that actually moved the invoice
    /// into `paid` tops up a wallet.
    pub async fn set_status(&self, invoice_id: &str, new_status: InvoiceStatus) -> LmsResult<StatusChange> {
        let mut attempt = 1;
        let (current, entering_paid, paid_at) = loop {
            let current = self.get_invoice(invoice_id).await?;

            if !current.status.can_transition_to(new_status) {
                return Err(LmsError::InvalidTransition {
                    from: current.status.as_str().to_string(),
                    to: new_status.as_str().to_string(),
                });
            }

            let entering_paid =
                new_status == InvoiceStatus::Paid && current.status != InvoiceStatus::Paid;
            let paid_at = entering_paid.then(Utc::now);

            if self
                .store
                .update_invoice_status(invoice_id, current.status, new_status, paid_at)
                .await?
            {
                break (current, entering_paid, paid_at);
            }

            if attempt >= STATUS_WRITE_ATTEMPTS {
                return Err(LmsError::Conflict(format!(
                    "Invoice {} is being changed concurrently",
                    invoice_id
                )));
            }
            tracing::debug!(
                "Invoice {} left {} before the write, re-reading",
                invoice_id,
                current.status.as_str()
            );
            attempt += 1;
        };

        metrics::record_invoice_transition(new_status.as_str());
        tracing::info!(
            "Invoice {}: {} -> {}",
            current.invoice_number,
            current.status.as_str(),
            new_status.as_str()
        );

        let mut invoice = current.clone();
        invoice.status = new_status;
        if paid_at.is_some() {
            invoice.paid_at = paid_at;
        }

        let mut warnings = Vec::new();
        let provisioning = if new_status != InvoiceStatus::Paid {
            Provisioning::NotApplicable
        } else if invoice.item_type.is_entitlement() {
            self.provision_enrollment(&invoice, &mut warnings).await
        } else if !entering_paid {
            Provisioning::Skipped {
                reason: "wallet top-up already applied".to_string(),
            }
        } else {
            self.provision_wallet(&invoice, &mut warnings).await
        };

        Ok(StatusChange {
            invoice,
            provisioning,
            warnings,
        })
    }

    async fn provision_enrollment(
        &self,
        invoice: &Invoice,
        warnings: &mut Vec<ProvisioningWarning>,
    ) -> Provisioning {
        match self
            .resolver
            .grant_entitlement(&invoice.learner_id, &invoice.item_id, invoice.item_type)
            .await
        {
            Ok(outcome) => {
                if let GrantOutcome::Chapter {
                    chapter_id,
                    membership_error: Some(error),
                    ..
                } = &outcome
                {
                    warnings.push(ProvisioningWarning {
                        kind: WarningKind::PartialCascadeFailure,
                        subject: chapter_id.clone(),
                        message: error.clone(),
                    });
                }
                for course in outcome.failed_courses() {
                    if let CourseGrantStatus::Failed { error } = &course.status {
                        warnings.push(ProvisioningWarning {
                            kind: WarningKind::PartialCascadeFailure,
                            subject: course.course_id.clone(),
                            message: error.clone(),
                        });
                    }
                }
                Provisioning::Granted(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    "Invoice {} is paid but enrollment failed: {}",
                    invoice.invoice_number,
                    e
                );
                metrics::record_error(e.code(), "billing");

                let kind = match &e {
                    LmsError::OwningEntityMissing(_) => WarningKind::OwningEntityMissing,
                    _ => WarningKind::ProvisioningFailed,
                };
                warnings.push(ProvisioningWarning {
                    kind,
                    subject: invoice.item_id.clone(),
                    message: e.to_string(),
                });
                Provisioning::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn provision_wallet(
        &self,
        invoice: &Invoice,
        warnings: &mut Vec<ProvisioningWarning>,
    ) -> Provisioning {
        match self.wallet.top_up(invoice).await {
            Ok(wallet) => Provisioning::WalletCredited(wallet),
            Err(e) => {
                tracing::warn!(
                    "Invoice {} is paid but wallet top-up failed: {}",
                    invoice.invoice_number,
                    e
                );
                metrics::record_error(e.code(), "billing");
                warnings.push(ProvisioningWarning {
                    kind: WarningKind::ProvisioningFailed,
                    subject: invoice.learner_id.clone(),
                    message: e.to_string(),
                });
                Provisioning::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
