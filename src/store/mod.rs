/// Learning store
///
/// The remote relational store the entitlement and billing logic runs against.
/// Components receive an `Arc<dyn LearningStore>` explicitly; the SQLite backend
/// serves production and the in-memory backend serves tests and embedding.

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

use crate::error::LmsResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Store backend trait
///
/// Every method is a single round trip; callers compose them. Inserts guarded by
/// a uniqueness constraint report `InsertOutcome::AlreadyPresent` instead of failing.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Fetch a lesson or attachment
    async fn get_content_unit(&self, kind: ContentKind, id: &str) -> LmsResult<Option<ContentUnit>>;

    /// All access events for (content unit, learner)
    async fn list_access_events(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
    ) -> LmsResult<Vec<AccessEvent>>;

    /// Append one access event. No uniqueness across events.
    async fn append_access_event(&self, event: &AccessEvent) -> LmsResult<()>;

    /// Insert a new invoice
    async fn insert_invoice(&self, invoice: &Invoice) -> LmsResult<()>;

    /// Fetch an invoice by id
    async fn get_invoice(&self, id: &str) -> LmsResult<Option<Invoice>>;

    /// List invoices, newest first
    async fn list_invoices(&self, filter: &InvoiceFilter) -> LmsResult<Vec<Invoice>>;

    /// Compare-and-set status update: the row is only written while its
    /// status is still `expected`. `paid_at` is only written when `Some`.
    /// Returns false when no invoice with that id is in `expected`.
    async fn update_invoice_status(
        &self,
        id: &str,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> LmsResult<bool>;

    /// Fetch a course
    async fn get_course(&self, id: &str) -> LmsResult<Option<Course>>;

    /// Check a chapter exists
    async fn chapter_exists(&self, id: &str) -> LmsResult<bool>;

    /// Resolve the course a lesson or quiz belongs to
    async fn owning_course(&self, item: OwnedItem, id: &str) -> LmsResult<OwnerLookup>;

    /// Existing enrollment for (learner, course)
    async fn find_enrollment(&self, learner_id: &str, course_id: &str) -> LmsResult<Option<Enrollment>>;

    /// Insert an enrollment
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> LmsResult<InsertOutcome>;

    /// Existing chapter enrollment for (learner, chapter)
    async fn find_chapter_enrollment(
        &self,
        learner_id: &str,
        chapter_id: &str,
    ) -> LmsResult<Option<ChapterEnrollment>>;

    /// Insert a chapter enrollment
    async fn insert_chapter_enrollment(&self, enrollment: &ChapterEnrollment) -> LmsResult<InsertOutcome>;

    /// Published courses whose `chapter_id` points at the chapter
    async fn chapter_courses_by_fk(&self, chapter_id: &str) -> LmsResult<Vec<String>>;

    /// Published courses linked to the chapter through `chapter_item` rows of type course
    async fn chapter_courses_by_link(&self, chapter_id: &str) -> LmsResult<Vec<String>>;

    /// Fetch a learner's wallet
    async fn get_wallet(&self, learner_id: &str) -> LmsResult<Option<Wallet>>;

    /// Add to a learner's wallet, creating it on first credit
    async fn credit_wallet(
        &self,
        learner_id: &str,
        credits: i64,
        ai_minutes: i64,
        at: DateTime<Utc>,
    ) -> LmsResult<Wallet>;

    /// Readiness probe
    async fn ping(&self) -> LmsResult<()> {
        Ok(())
    }
}
