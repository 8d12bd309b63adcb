/// Records exchanged with a learning store backend
use crate::{
    access::DeviceGroupKey,
    error::{LmsError, LmsResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content a learner can open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Lesson,
    Attachment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Lesson => "lesson",
            ContentKind::Attachment => "attachment",
        }
    }

    pub fn from_str(s: &str) -> LmsResult<Self> {
        match s.to_lowercase().as_str() {
            "lesson" | "lessons" => Ok(ContentKind::Lesson),
            "attachment" | "attachments" => Ok(ContentKind::Attachment),
            _ => Err(LmsError::Validation(format!("Invalid content kind: {}", s))),
        }
    }
}

/// A lesson or attachment with its access ceilings.
///
/// `None` means unlimited for either ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: String,
    pub kind: ContentKind,
    pub view_limit: Option<u32>,
    pub device_limit: Option<u32>,
}

impl ContentUnit {
    /// Normalize a stored limit column: NULL, zero and negatives mean unlimited
    pub fn limit_from_column(value: Option<i64>) -> Option<u32> {
        value
            .filter(|v| *v > 0)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
    }
}

/// One content open. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: String,
    pub content_kind: ContentKind,
    pub content_id: String,
    pub learner_id: String,
    pub device_fingerprint: DeviceGroupKey,
    pub occurred_at: DateTime<Utc>,
}

/// What an invoice pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Course,
    Chapter,
    Lesson,
    Quiz,
    Credits,
    AiMinutes,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Course => "course",
            ItemType::Chapter => "chapter",
            ItemType::Lesson => "lesson",
            ItemType::Quiz => "quiz",
            ItemType::Credits => "credits",
            ItemType::AiMinutes => "ai_minutes",
        }
    }

    pub fn from_str(s: &str) -> LmsResult<Self> {
        match s.to_lowercase().as_str() {
            "course" => Ok(ItemType::Course),
            "chapter" => Ok(ItemType::Chapter),
            "lesson" => Ok(ItemType::Lesson),
            "quiz" => Ok(ItemType::Quiz),
            "credits" => Ok(ItemType::Credits),
            "ai_minutes" => Ok(ItemType::AiMinutes),
            _ => Err(LmsError::Validation(format!("Invalid item type: {}", s))),
        }
    }

    /// Item types whose payment grants an enrollment
    pub fn is_entitlement(&self) -> bool {
        matches!(
            self,
            ItemType::Course | ItemType::Chapter | ItemType::Lesson | ItemType::Quiz
        )
    }

    /// Item types whose payment tops up the learner's wallet
    pub fn is_wallet_top_up(&self) -> bool {
        matches!(self, ItemType::Credits | ItemType::AiMinutes)
    }
}

/// Invoice lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> LmsResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InvoiceStatus::Pending),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            "refunded" => Ok(InvoiceStatus::Refunded),
            _ => Err(LmsError::Validation(format!("Invalid invoice status: {}", s))),
        }
    }

    /// `paid -> paid` is accepted so a confirmation can be replayed.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Refunded) | (Paid, Paid)
        )
    }
}

/// Invoice record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub learner_id: String,
    pub instructor_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    /// Minor currency units
    pub total_price: i64,
    pub payment_type: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub credits_amount: Option<i64>,
    pub minutes_amount: Option<i64>,
}

/// Invoice creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub learner_id: String,
    /// Filled from the caller when a teacher creates the invoice
    #[serde(default)]
    pub instructor_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub total_price: i64,
    pub payment_type: String,
    #[serde(default)]
    pub credits_amount: Option<i64>,
    #[serde(default)]
    pub minutes_amount: Option<i64>,
}

/// Invoice listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub instructor_id: Option<String>,
    pub learner_id: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<i64>,
}

/// How an enrollment came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSource {
    Invoice,
    SelfService,
    Manual,
}

impl EnrollmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentSource::Invoice => "invoice",
            EnrollmentSource::SelfService => "self_service",
            EnrollmentSource::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> LmsResult<Self> {
        match s {
            "invoice" => Ok(EnrollmentSource::Invoice),
            "self_service" => Ok(EnrollmentSource::SelfService),
            "manual" => Ok(EnrollmentSource::Manual),
            _ => Err(LmsError::Validation(format!("Invalid enrollment source: {}", s))),
        }
    }
}

/// Course enrollment, unique per (learner_id, course_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub learner_id: String,
    pub course_id: String,
    pub source: EnrollmentSource,
    pub enrolled_at: DateTime<Utc>,
}

/// Chapter enrollment, unique per (learner_id, chapter_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEnrollment {
    pub learner_id: String,
    pub chapter_id: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Course catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub chapter_id: Option<String>,
    pub published: bool,
    /// Minor currency units; zero means free
    pub price: i64,
}

/// Items that belong to a course through a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedItem {
    Lesson,
    Quiz,
}

impl OwnedItem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnedItem::Lesson => "lesson",
            OwnedItem::Quiz => "quiz",
        }
    }
}

/// Result of resolving a lesson or quiz to its course
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerLookup {
    /// The lesson/quiz itself does not exist
    ItemMissing,
    /// The lesson/quiz exists but has no course
    Orphaned,
    Course(String),
}

/// Outcome of an insert guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Learner balance of prepaid credits and AI tutor minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub learner_id: String,
    pub credits: i64,
    pub ai_minutes: i64,
    pub updated_at: DateTime<Utc>,
}
