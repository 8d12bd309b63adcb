/// SQLite learning store backend
use crate::{
    access::DeviceGroupKey,
    error::{LmsError, LmsResult},
    store::{
        AccessEvent, ChapterEnrollment, ContentKind, ContentUnit, Course, Enrollment,
        EnrollmentSource, InsertOutcome, Invoice, InvoiceFilter, InvoiceStatus, ItemType,
        LearningStore, OwnedItem, OwnerLookup, Wallet,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

const INVOICE_COLUMNS: &str = "id, invoice_number, learner_id, instructor_id, item_id, item_type, \
     total_price, payment_type, status, created_at, paid_at, credits_amount, minutes_amount";

/// Learning store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn parse_timestamp(value: &str) -> LmsResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LmsError::Internal(format!("Invalid timestamp: {}", e)))
    }

    fn parse_invoice(row: SqliteRow) -> LmsResult<Invoice> {
        let item_type: String = row.get("item_type");
        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        let paid_at = row
            .get::<Option<String>, _>("paid_at")
            .map(|s| Self::parse_timestamp(&s))
            .transpose()?;

        Ok(Invoice {
            id: row.get("id"),
            invoice_number: row.get("invoice_number"),
            learner_id: row.get("learner_id"),
            instructor_id: row.get("instructor_id"),
            item_id: row.get("item_id"),
            item_type: ItemType::from_str(&item_type)?,
            total_price: row.get("total_price"),
            payment_type: row.get("payment_type"),
            status: InvoiceStatus::from_str(&status)?,
            created_at: Self::parse_timestamp(&created_at)?,
            paid_at,
            credits_amount: row.get("credits_amount"),
            minutes_amount: row.get("minutes_amount"),
        })
    }

    fn parse_wallet(row: SqliteRow) -> LmsResult<Wallet> {
        let updated_at: String = row.get("updated_at");
        Ok(Wallet {
            learner_id: row.get("learner_id"),
            credits: row.get("credits"),
            ai_minutes: row.get("ai_minutes"),
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl LearningStore for SqliteStore {
    async fn ping(&self) -> LmsResult<()> {
        crate::db::test_connection(&self.db).await
    }

    async fn get_content_unit(&self, kind: ContentKind, id: &str) -> LmsResult<Option<ContentUnit>> {
        let query = match kind {
            ContentKind::Lesson => "SELECT id, view_limit, device_limit FROM lesson WHERE id = ?",
            ContentKind::Attachment => {
                "SELECT id, view_limit, device_limit FROM attachment WHERE id = ?"
            }
        };

        let row = sqlx::query(query).bind(id).fetch_optional(&self.db).await?;

        Ok(row.map(|row| ContentUnit {
            id: row.get("id"),
            kind,
            view_limit: ContentUnit::limit_from_column(row.get("view_limit")),
            device_limit: ContentUnit::limit_from_column(row.get("device_limit")),
        }))
    }

    async fn list_access_events(
        &self,
        kind: ContentKind,
        content_id: &str,
        learner_id: &str,
    ) -> LmsResult<Vec<AccessEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_id, learner_id, device_fingerprint, occurred_at
            FROM access_event
            WHERE content_kind = ? AND content_id = ? AND learner_id = ?
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(content_id)
        .bind(learner_id)
        .fetch_all(&self.db)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let occurred_at: String = row.get("occurred_at");
            let fingerprint: String = row.get("device_fingerprint");
            events.push(AccessEvent {
                id: row.get("id"),
                content_kind: kind,
                content_id: row.get("content_id"),
                learner_id: row.get("learner_id"),
                device_fingerprint: DeviceGroupKey::from_stored(fingerprint),
                occurred_at: Self::parse_timestamp(&occurred_at)?,
            });
        }

        Ok(events)
    }

    async fn append_access_event(&self, event: &AccessEvent) -> LmsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_event (id, content_kind, content_id, learner_id, device_fingerprint, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(event.content_kind.as_str())
        .bind(&event.content_id)
        .bind(&event.learner_id)
        .bind(event.device_fingerprint.as_str())
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> LmsResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoice (id, invoice_number, learner_id, instructor_id, item_id, item_type,
                                 total_price, payment_type, status, created_at, paid_at,
                                 credits_amount, minutes_amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.learner_id)
        .bind(&invoice.instructor_id)
        .bind(&invoice.item_id)
        .bind(invoice.item_type.as_str())
        .bind(invoice.total_price)
        .bind(&invoice.payment_type)
        .bind(invoice.status.as_str())
        .bind(invoice.created_at.to_rfc3339())
        .bind(invoice.paid_at.map(|dt| dt.to_rfc3339()))
        .bind(invoice.credits_amount)
        .bind(invoice.minutes_amount)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LmsError::Conflict(format!(
                "Invoice number {} already exists",
                invoice.invoice_number
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_invoice(&self, id: &str) -> LmsResult<Option<Invoice>> {
        let query = format!("SELECT {} FROM invoice WHERE id = ?", INVOICE_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.db).await?;

        row.map(Self::parse_invoice).transpose()
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> LmsResult<Vec<Invoice>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM invoice WHERE 1 = 1", INVOICE_COLUMNS));

        if let Some(instructor_id) = &filter.instructor_id {
            builder.push(" AND instructor_id = ").push_bind(instructor_id.clone());
        }
        if let Some(learner_id) = &filter.learner_id {
            builder.push(" AND learner_id = ").push_bind(learner_id.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100));

        let rows = builder.build().fetch_all(&self.db).await?;

        rows.into_iter().map(Self::parse_invoice).collect()
    }

    async fn update_invoice_status(
        &self,
        id: &str,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> LmsResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invoice
            SET status = ?,
                paid_at = COALESCE(?, paid_at)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(paid_at.map(|dt| dt.to_rfc3339()))
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_course(&self, id: &str) -> LmsResult<Option<Course>> {
        let row = sqlx::query(
            "SELECT id, title, chapter_id, published, price FROM course WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| Course {
            id: row.get("id"),
            title: row.get("title"),
            chapter_id: row.get("chapter_id"),
            published: row.get("published"),
            price: row.get("price"),
        }))
    }

    async fn chapter_exists(&self, id: &str) -> LmsResult<bool> {
        let row = sqlx::query("SELECT 1 FROM chapter WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.is_some())
    }

    async fn owning_course(&self, item: OwnedItem, id: &str) -> LmsResult<OwnerLookup> {
        let query = match item {
            OwnedItem::Lesson => "SELECT course_id FROM lesson WHERE id = ?",
            OwnedItem::Quiz => "SELECT course_id FROM quiz WHERE id = ?",
        };

        let row = sqlx::query(query).bind(id).fetch_optional(&self.db).await?;

        Ok(match row {
            None => OwnerLookup::ItemMissing,
            Some(row) => match row.get::<Option<String>, _>("course_id") {
                Some(course_id) => OwnerLookup::Course(course_id),
                None => OwnerLookup::Orphaned,
            },
        })
    }

    async fn find_enrollment(&self, learner_id: &str, course_id: &str) -> LmsResult<Option<Enrollment>> {
        let row = sqlx::query(
            r#"
            SELECT learner_id, course_id, source, enrolled_at
            FROM enrollment
            WHERE learner_id = ? AND course_id = ?
            "#,
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let source: String = row.get("source");
                let enrolled_at: String = row.get("enrolled_at");
                Ok(Some(Enrollment {
                    learner_id: row.get("learner_id"),
                    course_id: row.get("course_id"),
                    source: EnrollmentSource::from_str(&source)?,
                    enrolled_at: Self::parse_timestamp(&enrolled_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> LmsResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO enrollment (learner_id, course_id, source, enrolled_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&enrollment.learner_id)
        .bind(&enrollment.course_id)
        .bind(enrollment.source.as_str())
        .bind(enrollment.enrolled_at.to_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyPresent),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_chapter_enrollment(
        &self,
        learner_id: &str,
        chapter_id: &str,
    ) -> LmsResult<Option<ChapterEnrollment>> {
        let row = sqlx::query(
            r#"
            SELECT learner_id, chapter_id, enrolled_at
            FROM chapter_enrollment
            WHERE learner_id = ? AND chapter_id = ?
            "#,
        )
        .bind(learner_id)
        .bind(chapter_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let enrolled_at: String = row.get("enrolled_at");
                Ok(Some(ChapterEnrollment {
                    learner_id: row.get("learner_id"),
                    chapter_id: row.get("chapter_id"),
                    enrolled_at: Self::parse_timestamp(&enrolled_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_chapter_enrollment(&self, enrollment: &ChapterEnrollment) -> LmsResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO chapter_enrollment (learner_id, chapter_id, enrolled_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&enrollment.learner_id)
        .bind(&enrollment.chapter_id)
        .bind(enrollment.enrolled_at.to_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyPresent),
            Err(e) => Err(e.into()),
        }
    }

    async fn chapter_courses_by_fk(&self, chapter_id: &str) -> LmsResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT id FROM course WHERE chapter_id = ? AND published = 1 ORDER BY created_at ASC",
        )
        .bind(chapter_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn chapter_courses_by_link(&self, chapter_id: &str) -> LmsResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.item_id AS id
            FROM chapter_item ci
            JOIN course c ON c.id = ci.item_id
            WHERE ci.chapter_id = ? AND ci.item_type = 'course' AND c.published = 1
            ORDER BY ci.position ASC
            "#,
        )
        .bind(chapter_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn get_wallet(&self, learner_id: &str) -> LmsResult<Option<Wallet>> {
        let row = sqlx::query(
            "SELECT learner_id, credits, ai_minutes, updated_at FROM wallet WHERE learner_id = ?",
        )
        .bind(learner_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_wallet).transpose()
    }

    async fn credit_wallet(
        &self,
        learner_id: &str,
        credits: i64,
        ai_minutes: i64,
        at: DateTime<Utc>,
    ) -> LmsResult<Wallet> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallet (learner_id, credits, ai_minutes, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(learner_id) DO UPDATE SET
                credits = credits + excluded.credits,
                ai_minutes = ai_minutes + excluded.ai_minutes,
                updated_at = excluded.updated_at
            RETURNING learner_id, credits, ai_minutes, updated_at
            "#,
        )
        .bind(learner_id)
        .bind(credits)
        .bind(ai_minutes)
        .bind(at.to_rfc3339())
        .fetch_one(&self.db)
        .await?;

        Self::parse_wallet(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO chapter (id, title, created_at) VALUES ('ch1', 'Algebra', ?)")
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();
        for (id, chapter, published) in [
            ("c1", Some("ch1"), 1),
            ("c2", Some("ch1"), 1),
            ("c3", None, 1),
            ("c4", Some("ch1"), 0),
        ] {
            sqlx::query(
                "INSERT INTO course (id, title, chapter_id, published, price, created_at) VALUES (?, ?, ?, ?, 0, ?)",
            )
            .bind(id)
            .bind(format!("Course {}", id))
            .bind(chapter)
            .bind(published)
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();
        }
        sqlx::query(
            "INSERT INTO chapter_item (chapter_id, item_type, item_id) VALUES ('ch1', 'course', 'c3'), ('ch1', 'course', 'c1'), ('ch1', 'quiz', 'q9')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO lesson (id, course_id, title, view_limit, device_limit, created_at) VALUES ('l1', 'c1', 'Intro', 3, 0, ?), ('l2', NULL, 'Loose', NULL, NULL, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_content_unit_limits() {
        let store = setup().await;

        let unit = store
            .get_content_unit(ContentKind::Lesson, "l1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.view_limit, Some(3));
        assert_eq!(unit.device_limit, None);

        assert!(store
            .get_content_unit(ContentKind::Attachment, "l1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_enrollment_insert_is_idempotent() {
        let store = setup().await;
        let enrollment = Enrollment {
            learner_id: "u1".to_string(),
            course_id: "c1".to_string(),
            source: EnrollmentSource::Invoice,
            enrolled_at: Utc::now(),
        };

        assert_eq!(
            store.insert_enrollment(&enrollment).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_enrollment(&enrollment).await.unwrap(),
            InsertOutcome::AlreadyPresent
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollment")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_non_unique_constraint_failure_is_an_error() {
        let store = setup().await;
        sqlx::query(
            "CREATE TRIGGER reject_c2 BEFORE INSERT ON enrollment WHEN NEW.course_id = 'c2' BEGIN SELECT RAISE(ABORT, 'enrollment rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let enrollment = Enrollment {
            learner_id: "u1".to_string(),
            course_id: "c2".to_string(),
            source: EnrollmentSource::Invoice,
            enrolled_at: Utc::now(),
        };
        assert!(store.insert_enrollment(&enrollment).await.is_err());
    }

    #[tokio::test]
    async fn test_chapter_membership_sources() {
        let store = setup().await;

        let by_fk = store.chapter_courses_by_fk("ch1").await.unwrap();
        assert_eq!(by_fk.len(), 2);
        assert!(by_fk.contains(&"c1".to_string()));
        assert!(by_fk.contains(&"c2".to_string()));

        let by_link = store.chapter_courses_by_link("ch1").await.unwrap();
        assert_eq!(by_link.len(), 2);
        assert!(by_link.contains(&"c3".to_string()));
        assert!(by_link.contains(&"c1".to_string()));
    }

    #[tokio::test]
    async fn test_owning_course_lookup() {
        let store = setup().await;

        assert_eq!(
            store.owning_course(OwnedItem::Lesson, "l1").await.unwrap(),
            OwnerLookup::Course("c1".to_string())
        );
        assert_eq!(
            store.owning_course(OwnedItem::Lesson, "l2").await.unwrap(),
            OwnerLookup::Orphaned
        );
        assert_eq!(
            store.owning_course(OwnedItem::Quiz, "nope").await.unwrap(),
            OwnerLookup::ItemMissing
        );
    }

    #[tokio::test]
    async fn test_wallet_credit_accumulates() {
        let store = setup().await;

        let wallet = store.credit_wallet("u1", 100, 0, Utc::now()).await.unwrap();
        assert_eq!(wallet.credits, 100);

        let wallet = store.credit_wallet("u1", 50, 30, Utc::now()).await.unwrap();
        assert_eq!(wallet.credits, 150);
        assert_eq!(wallet.ai_minutes, 30);
    }

    #[tokio::test]
    async fn test_invoice_status_keeps_paid_at_when_not_given() {
        let store = setup().await;
        let paid_at = Utc::now();
        let invoice = Invoice {
            id: "inv1".to_string(),
            invoice_number: "INV-1".to_string(),
            learner_id: "u1".to_string(),
            instructor_id: "t1".to_string(),
            item_id: "c1".to_string(),
            item_type: ItemType::Course,
            total_price: 1000,
            payment_type: "cash".to_string(),
            status: InvoiceStatus::Pending,
            created_at: Utc::now(),
            paid_at: None,
            credits_amount: None,
            minutes_amount: None,
        };
        store.insert_invoice(&invoice).await.unwrap();

        assert!(store
            .update_invoice_status("inv1", InvoiceStatus::Pending, InvoiceStatus::Paid, Some(paid_at))
            .await
            .unwrap());
        // A writer that still believes the invoice is pending loses
        assert!(!store
            .update_invoice_status("inv1", InvoiceStatus::Pending, InvoiceStatus::Cancelled, None)
            .await
            .unwrap());
        assert!(store
            .update_invoice_status("inv1", InvoiceStatus::Paid, InvoiceStatus::Refunded, None)
            .await
            .unwrap());

        let stored = store.get_invoice("inv1").await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Refunded);
        assert!(stored.paid_at.is_some());

        assert!(!store
            .update_invoice_status("missing", InvoiceStatus::Pending, InvoiceStatus::Paid, None)
            .await
            .unwrap());

        let dup = Invoice {
            id: "inv2".to_string(),
            ..invoice
        };
        assert!(matches!(
            store.insert_invoice(&dup).await,
            Err(LmsError::Conflict(_))
        ));
    }
}
