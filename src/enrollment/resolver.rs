/// Cascading enrollment resolver
use crate::{
    enrollment::{CourseGrant, CourseGrantStatus, GrantOutcome},
    error::{LmsError, LmsResult},
    metrics,
    store::{
        ChapterEnrollment, Enrollment, EnrollmentSource, InsertOutcome, ItemType, LearningStore,
        OwnedItem, OwnerLookup,
    },
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// Grants course, chapter, lesson and quiz entitlements
#[derive(Clone)]
pub struct EnrollmentResolver {
    store: Arc<dyn LearningStore>,
}

impl EnrollmentResolver {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    /// Grant the entitlement an invoice item pays for
    pub async fn grant_entitlement(
        &self,
        learner_id: &str,
        item_id: &str,
        item_type: ItemType,
    ) -> LmsResult<GrantOutcome> {
        self.grant(learner_id, item_id, item_type, EnrollmentSource::Invoice)
            .await
    }

    /// Grant an entitlement, tagging created enrollments with `source`
    pub async fn grant(
        &self,
        learner_id: &str,
        item_id: &str,
        item_type: ItemType,
        source: EnrollmentSource,
    ) -> LmsResult<GrantOutcome> {
        match item_type {
            ItemType::Course => {
                let status = self.enroll_course(learner_id, item_id, source).await?;
                Ok(GrantOutcome::Course(CourseGrant::new(item_id, status)))
            }
            ItemType::Lesson | ItemType::Quiz => {
                let owned = if item_type == ItemType::Lesson {
                    OwnedItem::Lesson
                } else {
                    OwnedItem::Quiz
                };
                let course_id = self.resolve_owner(owned, item_id).await?;
                let status = self.enroll_course(learner_id, &course_id, source).await?;
                Ok(GrantOutcome::Course(CourseGrant::new(&course_id, status)))
            }
            ItemType::Chapter => self.grant_chapter(learner_id, item_id, source).await,
            ItemType::Credits | ItemType::AiMinutes => {
                tracing::debug!("{} is not an enrollment item", item_type.as_str());
                Ok(GrantOutcome::Unsupported { item_type })
            }
        }
    }

    /// Self-service enrollment into a published free course
    pub async fn enroll_self(&self, learner_id: &str, course_id: &str) -> LmsResult<CourseGrant> {
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Course {} not found", course_id)))?;

        if !course.published {
            return Err(LmsError::NotFound(format!("Course {} not found", course_id)));
        }
        if course.price > 0 {
            return Err(LmsError::Authorization(format!(
                "Course {} requires payment",
                course_id
            )));
        }

        let status = self
            .ensure_enrolled(learner_id, course_id, EnrollmentSource::SelfService)
            .await?;
        Ok(CourseGrant::new(course_id, status))
    }

    /// Effective chapter membership: FK-linked courses, then join-table
    /// courses, deduplicated by id. Both sources only return published courses.
    pub async fn chapter_membership(&self, chapter_id: &str) -> LmsResult<Vec<String>> {
        let by_fk = self.store.chapter_courses_by_fk(chapter_id).await?;
        let by_link = self.store.chapter_courses_by_link(chapter_id).await?;

        let mut seen = HashSet::new();
        Ok(by_fk
            .into_iter()
            .chain(by_link)
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }

    async fn resolve_owner(&self, item: OwnedItem, item_id: &str) -> LmsResult<String> {
        match self.store.owning_course(item, item_id).await? {
            OwnerLookup::Course(course_id) => Ok(course_id),
            OwnerLookup::ItemMissing => Err(LmsError::NotFound(format!(
                "{} {} not found",
                item.as_str(),
                item_id
            ))),
            OwnerLookup::Orphaned => Err(LmsError::OwningEntityMissing(format!(
                "{} {} has no course",
                item.as_str(),
                item_id
            ))),
        }
    }

    async fn enroll_course(
        &self,
        learner_id: &str,
        course_id: &str,
        source: EnrollmentSource,
    ) -> LmsResult<CourseGrantStatus> {
        if self.store.get_course(course_id).await?.is_none() {
            return Err(LmsError::NotFound(format!("Course {} not found", course_id)));
        }
        self.ensure_enrolled(learner_id, course_id, source).await
    }

    /// Check-then-insert; losing a concurrent insert counts as already enrolled
    async fn ensure_enrolled(
        &self,
        learner_id: &str,
        course_id: &str,
        source: EnrollmentSource,
    ) -> LmsResult<CourseGrantStatus> {
        if self.store.find_enrollment(learner_id, course_id).await?.is_some() {
            metrics::record_enrollment(source.as_str(), "already_enrolled");
            return Ok(CourseGrantStatus::AlreadyEnrolled);
        }

        let enrollment = Enrollment {
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
            source,
            enrolled_at: Utc::now(),
        };

        let status = match self.store.insert_enrollment(&enrollment).await? {
            InsertOutcome::Inserted => {
                tracing::info!("Enrolled {} in course {} ({})", learner_id, course_id, source.as_str());
                CourseGrantStatus::Enrolled
            }
            InsertOutcome::AlreadyPresent => CourseGrantStatus::AlreadyEnrolled,
        };
        metrics::record_enrollment(source.as_str(), status.label());

        Ok(status)
    }

    async fn grant_chapter(
        &self,
        learner_id: &str,
        chapter_id: &str,
        source: EnrollmentSource,
    ) -> LmsResult<GrantOutcome> {
        if !self.store.chapter_exists(chapter_id).await? {
            return Err(LmsError::NotFound(format!("Chapter {} not found", chapter_id)));
        }

        // The chapter row must exist before any member course is attempted.
        let chapter_newly_enrolled = match self
            .store
            .find_chapter_enrollment(learner_id, chapter_id)
            .await?
        {
            Some(_) => false,
            None => {
                let enrollment = ChapterEnrollment {
                    learner_id: learner_id.to_string(),
                    chapter_id: chapter_id.to_string(),
                    enrolled_at: Utc::now(),
                };
                self.store.insert_chapter_enrollment(&enrollment).await? == InsertOutcome::Inserted
            }
        };

        // The chapter row is already written; a failed member read is reported, not raised.
        let members = match self.chapter_membership(chapter_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(
                    "Chapter {} for {}: member courses could not be read: {}",
                    chapter_id,
                    learner_id,
                    e
                );
                metrics::record_error(e.code(), "enrollment");
                return Ok(GrantOutcome::Chapter {
                    chapter_id: chapter_id.to_string(),
                    chapter_newly_enrolled,
                    courses: Vec::new(),
                    membership_error: Some(e.to_string()),
                });
            }
        };

        let attempts = members.iter().map(|course_id| async move {
            let status = match self.ensure_enrolled(learner_id, course_id, source).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        "Chapter {}: failed to enroll {} in course {}: {}",
                        chapter_id,
                        learner_id,
                        course_id,
                        e
                    );
                    metrics::record_cascade_failure();
                    CourseGrantStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            CourseGrant::new(course_id, status)
        });
        let courses = join_all(attempts).await;

        let failed = courses.iter().filter(|c| c.status.is_failed()).count();
        if failed > 0 {
            tracing::warn!(
                "Chapter {} for {}: {} of {} member courses failed to enroll",
                chapter_id,
                learner_id,
                failed,
                courses.len()
            );
        } else {
            tracing::info!(
                "Chapter {} for {}: {} member courses granted",
                chapter_id,
                learner_id,
                courses.len()
            );
        }

        Ok(GrantOutcome::Chapter {
            chapter_id: chapter_id.to_string(),
            chapter_newly_enrolled,
            courses,
            membership_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::Fault, MemoryStore};

    async fn chapter_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_chapter("ch1").await;
        store.add_course("c1", Some("ch1"), true, 0).await;
        store.add_course("c2", Some("ch1"), true, 0).await;
        store.add_course("c3", None, true, 0).await;
        store.link_course_to_chapter("ch1", "c3").await;
        store
    }

    #[tokio::test]
    async fn test_course_grant_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.add_course("c1", None, true, 5000).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let first = resolver.grant_entitlement("u1", "c1", ItemType::Course).await.unwrap();
        assert!(first.is_success());
        assert_eq!(
            first,
            GrantOutcome::Course(CourseGrant::new("c1", CourseGrantStatus::Enrolled))
        );

        let second = resolver.grant_entitlement("u1", "c1", ItemType::Course).await.unwrap();
        assert!(second.is_success());
        assert_eq!(
            second,
            GrantOutcome::Course(CourseGrant::new("c1", CourseGrantStatus::AlreadyEnrolled))
        );

        assert_eq!(store.enrollments_for("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_course_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EnrollmentResolver::new(store);

        let result = resolver.grant_entitlement("u1", "ghost", ItemType::Course).await;
        assert!(matches!(result, Err(LmsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lesson_and_quiz_resolve_to_course() {
        let store = Arc::new(MemoryStore::new());
        store.add_course("c1", None, true, 0).await;
        store.add_lesson("l1", Some("c1"), None, None).await;
        store.add_quiz("q1", Some("c1")).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let outcome = resolver.grant_entitlement("u1", "l1", ItemType::Lesson).await.unwrap();
        assert_eq!(
            outcome,
            GrantOutcome::Course(CourseGrant::new("c1", CourseGrantStatus::Enrolled))
        );

        let outcome = resolver.grant_entitlement("u1", "q1", ItemType::Quiz).await.unwrap();
        assert_eq!(
            outcome,
            GrantOutcome::Course(CourseGrant::new("c1", CourseGrantStatus::AlreadyEnrolled))
        );
        assert_eq!(store.enrollments_for("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_orphaned_lesson_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.add_lesson("l1", None, None, None).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let result = resolver.grant_entitlement("u1", "l1", ItemType::Lesson).await;
        assert!(matches!(result, Err(LmsError::OwningEntityMissing(_))));

        let result = resolver.grant_entitlement("u1", "q404", ItemType::Quiz).await;
        assert!(matches!(result, Err(LmsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chapter_cascade_unions_both_sources() {
        let store = chapter_store().await;
        // Listed through both sources; must only be enrolled once
        store.link_course_to_chapter("ch1", "c1").await;
        // Unpublished courses are not members
        store.add_course("c4", Some("ch1"), false, 0).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let outcome = resolver.grant_entitlement("u1", "ch1", ItemType::Chapter).await.unwrap();
        assert!(outcome.is_success());
        match &outcome {
            GrantOutcome::Chapter {
                chapter_newly_enrolled,
                courses,
                ..
            } => {
                assert!(*chapter_newly_enrolled);
                assert_eq!(courses.len(), 3);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let enrolled: Vec<String> = store
            .enrollments_for("u1")
            .await
            .into_iter()
            .map(|e| e.course_id)
            .collect();
        assert_eq!(enrolled, vec!["c1", "c2", "c3"]);
        assert_eq!(store.chapter_enrollments_for("u1").await.len(), 1);

        // Replaying the grant is a no-op
        let again = resolver.grant_entitlement("u1", "ch1", ItemType::Chapter).await.unwrap();
        match again {
            GrantOutcome::Chapter {
                chapter_newly_enrolled,
                courses,
                ..
            } => {
                assert!(!chapter_newly_enrolled);
                assert!(courses
                    .iter()
                    .all(|c| c.status == CourseGrantStatus::AlreadyEnrolled));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.enrollments_for("u1").await.len(), 3);
        assert_eq!(store.chapter_enrollments_for("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_chapter_cascade_isolates_course_failures() {
        let store = chapter_store().await;
        store.inject_fault(Fault::EnrollCourse("c2".to_string())).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let outcome = resolver.grant_entitlement("u1", "ch1", ItemType::Chapter).await.unwrap();
        assert!(outcome.is_success());

        let failed = outcome.failed_courses();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].course_id, "c2");

        let enrolled: Vec<String> = store
            .enrollments_for("u1")
            .await
            .into_iter()
            .map(|e| e.course_id)
            .collect();
        assert_eq!(enrolled, vec!["c1", "c3"]);
    }

    #[tokio::test]
    async fn test_chapter_level_failure_is_an_error() {
        let store = chapter_store().await;
        store.inject_fault(Fault::AnyEnrollment).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let result = resolver.grant_entitlement("u1", "ch1", ItemType::Chapter).await;
        assert!(matches!(result, Err(LmsError::Store(_))));

        let result = resolver.grant_entitlement("u1", "missing", ItemType::Chapter).await;
        assert!(matches!(result, Err(LmsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_member_read_failure_keeps_chapter_grant() {
        let store = chapter_store().await;
        store.inject_fault(Fault::ReadChapterMembership).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let outcome = resolver.grant_entitlement("u1", "ch1", ItemType::Chapter).await.unwrap();
        assert!(outcome.is_success());
        match &outcome {
            GrantOutcome::Chapter {
                chapter_newly_enrolled,
                courses,
                membership_error,
                ..
            } => {
                assert!(*chapter_newly_enrolled);
                assert!(courses.is_empty());
                assert!(membership_error.as_deref().unwrap().contains("injected fault"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(outcome.message().contains("could not be read"));
        assert_eq!(store.chapter_enrollments_for("u1").await.len(), 1);
        assert!(store.enrollments_for("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_wallet_items_are_unsupported() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EnrollmentResolver::new(store.clone());

        for item_type in [ItemType::Credits, ItemType::AiMinutes] {
            let outcome = resolver.grant_entitlement("u1", "pack", item_type).await.unwrap();
            assert_eq!(outcome, GrantOutcome::Unsupported { item_type });
            assert!(!outcome.is_success());
        }
        assert_eq!(store.enrollment_ops(), 0);
    }

    #[tokio::test]
    async fn test_self_service_requires_free_published_course() {
        let store = Arc::new(MemoryStore::new());
        store.add_course("free", None, true, 0).await;
        store.add_course("paid", None, true, 1999).await;
        store.add_course("draft", None, false, 0).await;
        let resolver = EnrollmentResolver::new(store.clone());

        let grant = resolver.enroll_self("u1", "free").await.unwrap();
        assert_eq!(grant.status, CourseGrantStatus::Enrolled);
        assert_eq!(
            store.enrollments_for("u1").await[0].source,
            EnrollmentSource::SelfService
        );

        assert!(matches!(
            resolver.enroll_self("u1", "paid").await,
            Err(LmsError::Authorization(_))
        ));
        assert!(matches!(
            resolver.enroll_self("u1", "draft").await,
            Err(LmsError::NotFound(_))
        ));
    }
}
