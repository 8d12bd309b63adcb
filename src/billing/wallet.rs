/// Learner wallet: prepaid credits and AI tutor minutes
use crate::{
    error::{LmsError, LmsResult},
    store::{Invoice, ItemType, LearningStore, Wallet},
};
use chrono::Utc;
use std::sync::Arc;

/// Wallet manager
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn LearningStore>,
}

impl WalletManager {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    /// Current balance; learners without a wallet row have an empty one
    pub async fn balance(&self, learner_id: &str) -> LmsResult<Wallet> {
        Ok(self
            .store
            .get_wallet(learner_id)
            .await?
            .unwrap_or_else(|| Wallet {
                learner_id: learner_id.to_string(),
                credits: 0,
                ai_minutes: 0,
                updated_at: Utc::now(),
            }))
    }

    /// Apply a paid top-up invoice to the learner's wallet
    pub async fn top_up(&self, invoice: &Invoice) -> LmsResult<Wallet> {
        let (credits, minutes) = match invoice.item_type {
            ItemType::Credits => (invoice.credits_amount.unwrap_or(0), 0),
            ItemType::AiMinutes => (0, invoice.minutes_amount.unwrap_or(0)),
            other => {
                return Err(LmsError::Validation(format!(
                    "Invoice {} is a {} invoice, not a wallet top-up",
                    invoice.invoice_number,
                    other.as_str()
                )))
            }
        };

        if credits <= 0 && minutes <= 0 {
            return Err(LmsError::Validation(format!(
                "Invoice {} carries no top-up amount",
                invoice.invoice_number
            )));
        }

        let wallet = self
            .store
            .credit_wallet(&invoice.learner_id, credits, minutes, Utc::now())
            .await?;

        tracing::info!(
            "Wallet {} topped up by invoice {}: +{} credits, +{} minutes",
            invoice.learner_id,
            invoice.invoice_number,
            credits,
            minutes
        );

        Ok(wallet)
    }
}
