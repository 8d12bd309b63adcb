/// In-memory learning store
///
/// Mirrors the SQLite schema's uniqueness rules. Faults can be injected per
/// operation so callers can exercise failure policies without a database.
use crate::{
    error::{LmsError, LmsResult},
    store::{
        AccessEvent, ChapterEnrollment, ContentKind, ContentUnit, Course, Enrollment,
        InsertOutcome, Invoice, InvoiceFilter, InvoiceStatus, LearningStore, OwnedItem,
        OwnerLookup, Wallet,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Operations that can be made to fail
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Reading access events
    ReadAccessEvents,
    /// Appending access events
    AppendAccessEvent,
    /// Updating invoice status
    UpdateInvoice,
    /// Inserting an enrollment for a specific course
    EnrollCourse(String),
    /// Any enrollment read or insert
    AnyEnrollment,
    /// Reading a chapter's member courses
    ReadChapterMembership,
    /// Crediting a wallet
    CreditWallet,
}

#[derive(Default)]
struct MemoryState {
    units: HashMap<(ContentKind, String), ContentUnit>,
    events: Vec<AccessEvent>,
    invoices: HashMap<String, Invoice>,
    courses: HashMap<String, Course>,
    chapters: HashSet<String>,
    /// (chapter_id, course_id) join rows of type course, in insertion order
    chapter_links: Vec<(String, String)>,
    lesson_owner: HashMap<String, Option<String>>,
    quiz_owner: HashMap<String, Option<String>>,
    enrollments: HashMap<(String, String), Enrollment>,
    chapter_enrollments: HashMap<(String, String), ChapterEnrollment>,
    wallets: HashMap<String, Wallet>,
    faults: HashSet<Fault>,
}

/// In-memory store backend
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    enrollment_ops: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Seeding ==========

    pub async fn add_course(&self, id: &str, chapter_id: Option<&str>, published: bool, price: i64) {
        let mut state = self.state.write().await;
        state.courses.insert(
            id.to_string(),
            Course {
                id: id.to_string(),
                title: format!("Course {}", id),
                chapter_id: chapter_id.map(String::from),
                published,
                price,
            },
        );
    }

    pub async fn add_chapter(&self, id: &str) {
        self.state.write().await.chapters.insert(id.to_string());
    }

    pub async fn link_course_to_chapter(&self, chapter_id: &str, course_id: &str) {
        self.state
            .write()
            .await
            .chapter_links
            .push((chapter_id.to_string(), course_id.to_string()));
    }

    /// Add a lesson with its limits; `course_id = None` leaves it orphaned
    pub async fn add_lesson(
        &self,
        id: &str,
        course_id: Option<&str>,
        view_limit: Option<u32>,
        device_limit: Option<u32>,
    ) {
        let mut state = self.state.write().await;
        state
            .lesson_owner
            .insert(id.to_string(), course_id.map(String::from));
        state.units.insert(
            (ContentKind::Lesson, id.to_string()),
            ContentUnit {
                id: id.to_string(),
                kind: ContentKind::Lesson,
                view_limit,
                device_limit,
            },
        );
    }

    pub async fn add_attachment(&self, id: &str, view_limit: Option<u32>, device_limit: Option<u32>) {
        self.state.write().await.units.insert(
            (ContentKind::Attachment, id.to_string()),
            ContentUnit {
                id: id.to_string(),
                kind: ContentKind::Attachment,
                view_limit,
                device_limit,
            },
        );
    }

    pub async fn add_quiz(&self, id: &str, course_id: Option<&str>) {
        self.state
            .write()
            .await
            .quiz_owner
            .insert(id.to_string(), course_id.map(String::from));
    }

    // ========== Fault injection & inspection ==========

    pub async fn inject_fault(&self, fault: Fault) {
        self.state.write().await.faults.insert(fault);
    }

    /// Number of enrollment reads and writes attempted so far
    pub fn enrollment_ops(&self) -> usize {
        self.enrollment_ops.load(Ordering::SeqCst)
    }

    pub async fn enrollments_for(&self, learner_id: &str) -> Vec<Enrollment> {
        let state = self.state.read().await;
        let mut rows: Vec<Enrollment> = state
            .enrollments
            .values()
            .filter(|e| e.learner_id == learner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        rows
    }

    pub async fn chapter_enrollments_for(&self, learner_id: &str) -> Vec<ChapterEnrollment> {
        let state = self.state.read().await;
        state
            .chapter_enrollments
            .values()
            .filter(|e| e.learner_id == learner_id)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    fn check(state: &MemoryState, fault: Fault) -> LmsResult<()> {
        if state.faults.contains(&fault) {
            return Err(LmsError::Store(format!("injected fault: {:?}", fault)));
        }
        Ok(())
    }

    fn check_enrollment(&self, state: &MemoryState) -> LmsResult<()> {
        self.enrollment_ops.fetch_add(1, Ordering::SeqCst);
        Self::check(state, Fault::AnyEnrollment)
    }
}

#[async_trait]
impl LearningStore for MemoryStore {
    async fn get_content_unit(&self, kind: ContentKind, id: &str) -> LmsResult<Option<ContentUnit>> {
        let state = self.state.read().await;
        Ok(state.units.get(&(kind, id.to_string())).cloned())
    }

    async fn list_access_events(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
    ) -> LmsResult<Vec<AccessEvent>> {
        let state = self.state.read().await;
        Self::check(&state, Fault::ReadAccessEvents)?;

        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.content_kind == kind && e.content_id == content_id && e.learner_id == learner_id
            })
            .cloned()
            .collect())
    }

    async fn append_access_event(&self, event: &AccessEvent) -> LmsResult<()> {
        let mut state = self.state.write().await;
        Self::check(&state, Fault::AppendAccessEvent)?;
        state.events.push(event.clone());
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> LmsResult<()> {
        let mut state = self.state.write().await;
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(LmsError::Conflict(format!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }
        state.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, id: &str) -> LmsResult<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(id).cloned())
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> LmsResult<Vec<Invoice>> {
        let state = self.state.read().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| {
                filter
                    .instructor_id
                    .as_ref()
                    .map_or(true, |id| &i.instructor_id == id)
                    && filter.learner_id.as_ref().map_or(true, |id| &i.learner_id == id)
                    && filter.status.map_or(true, |s| i.status == s)
            })
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invoices.truncate(filter.limit.unwrap_or(100).max(0) as usize);
        Ok(invoices)
    }

    async fn update_invoice_status(
        &self,
        id: &str,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> LmsResult<bool> {
        let mut state = self.state.write().await;
        Self::check(&state, Fault::UpdateInvoice)?;

        match state.invoices.get_mut(id) {
            Some(invoice) if invoice.status == expected => {
                invoice.status = status;
                if paid_at.is_some() {
                    invoice.paid_at = paid_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_course(&self, id: &str) -> LmsResult<Option<Course>> {
        Ok(self.state.read().await.courses.get(id).cloned())
    }

    async fn chapter_exists(&self, id: &str) -> LmsResult<bool> {
        Ok(self.state.read().await.chapters.contains(id))
    }

    async fn owning_course(&self, item: OwnedItem, id: &str) -> LmsResult<OwnerLookup> {
        let state = self.state.read().await;
        let owners = match item {
            OwnedItem::Lesson => &state.lesson_owner,
            OwnedItem::Quiz => &state.quiz_owner,
        };

        Ok(match owners.get(id) {
            None => OwnerLookup::ItemMissing,
            Some(None) => OwnerLookup::Orphaned,
            Some(Some(course_id)) => OwnerLookup::Course(course_id.clone()),
        })
    }

    async fn find_enrollment(&self, learner_id: &str, course_id: &str) -> LmsResult<Option<Enrollment>> {
        let state = self.state.read().await;
        self.check_enrollment(&state)?;

        Ok(state
            .enrollments
            .get(&(learner_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> LmsResult<InsertOutcome> {
        let mut state = self.state.write().await;
        self.check_enrollment(&state)?;
        Self::check(&state, Fault::EnrollCourse(enrollment.course_id.clone()))?;

        if !state.courses.contains_key(&enrollment.course_id) {
            return Err(LmsError::Store(format!(
                "foreign key violation: course {}",
                enrollment.course_id
            )));
        }

        let key = (enrollment.learner_id.clone(), enrollment.course_id.clone());
        if state.enrollments.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        state.enrollments.insert(key, enrollment.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_chapter_enrollment(
        &self,
        learner_id: &str,
        chapter_id: &str,
    ) -> LmsResult<Option<ChapterEnrollment>> {
        let state = self.state.read().await;
        self.check_enrollment(&state)?;

        Ok(state
            .chapter_enrollments
            .get(&(learner_id.to_string(), chapter_id.to_string()))
            .cloned())
    }

    async fn insert_chapter_enrollment(&self, enrollment: &ChapterEnrollment) -> LmsResult<InsertOutcome> {
        let mut state = self.state.write().await;
        self.check_enrollment(&state)?;

        let key = (enrollment.learner_id.clone(), enrollment.chapter_id.clone());
        if state.chapter_enrollments.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        state.chapter_enrollments.insert(key, enrollment.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn chapter_courses_by_fk(&self, chapter_id: &str) -> LmsResult<Vec<String>> {
        let state = self.state.read().await;
        Self::check(&state, Fault::ReadChapterMembership)?;
        let mut ids: Vec<String> = state
            .courses
            .values()
            .filter(|c| c.published && c.chapter_id.as_deref() == Some(chapter_id))
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn chapter_courses_by_link(&self, chapter_id: &str) -> LmsResult<Vec<String>> {
        let state = self.state.read().await;
        Self::check(&state, Fault::ReadChapterMembership)?;
        Ok(state
            .chapter_links
            .iter()
            .filter(|(chapter, course)| {
                chapter == chapter_id && state.courses.get(course).map_or(false, |c| c.published)
            })
            .map(|(_, course)| course.clone())
            .collect())
    }

    async fn get_wallet(&self, learner_id: &str) -> LmsResult<Option<Wallet>> {
        Ok(self.state.read().await.wallets.get(learner_id).cloned())
    }

    async fn credit_wallet(
        &self,
        learner_id: &str,
        credits: i64,
        ai_minutes: i64,
        at: DateTime<Utc>,
    ) -> LmsResult<Wallet> {
        let mut state = self.state.write().await;
        Self::check(&state, Fault::CreditWallet)?;

        let wallet = state
            .wallets
            .entry(learner_id.to_string())
            .or_insert_with(|| Wallet {
                learner_id: learner_id.to_string(),
                credits: 0,
                ai_minutes: 0,
                updated_at: at,
            });
        wallet.credits += credits;
        wallet.ai_minutes += ai_minutes;
        wallet.updated_at = at;
        Ok(wallet.clone())
    }
}
