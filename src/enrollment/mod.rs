/// Enrollment system
///
/// Turns paid items into course and chapter enrollments. A chapter grant
/// cascades to every published member course, one independent attempt each.

pub mod resolver;

pub use resolver::EnrollmentResolver;

use crate::{error::LmsResult, store::ItemType};
use serde::{Deserialize, Serialize};

/// Outcome of enrolling a learner into one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CourseGrantStatus {
    Enrolled,
    AlreadyEnrolled,
    Failed { error: String },
}

impl CourseGrantStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, CourseGrantStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CourseGrantStatus::Enrolled => "enrolled",
            CourseGrantStatus::AlreadyEnrolled => "already_enrolled",
            CourseGrantStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseGrant {
    pub course_id: String,
    #[serde(flatten)]
    pub status: CourseGrantStatus,
}

impl CourseGrant {
    pub fn new(course_id: &str, status: CourseGrantStatus) -> Self {
        Self {
            course_id: course_id.to_string(),
            status,
        }
    }
}

/// Typed result of an entitlement grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantOutcome {
    /// Course, lesson or quiz grant (lessons and quizzes resolve to their course)
    Course(CourseGrant),
    /// Chapter grant with one entry per member course
    Chapter {
        chapter_id: String,
        chapter_newly_enrolled: bool,
        courses: Vec<CourseGrant>,
        /// Set when the member list could not be read after the chapter row was written
        #[serde(default, skip_serializing_if = "Option::is_none")]
        membership_error: Option<String>,
    },
    /// Item type that is not an enrollment (wallet top-ups)
    Unsupported { item_type: ItemType },
}

impl GrantOutcome {
    /// A chapter grant succeeds once the chapter row exists, whatever its members did.
    pub fn is_success(&self) -> bool {
        !matches!(self, GrantOutcome::Unsupported { .. })
    }

    /// Member courses that could not be enrolled
    pub fn failed_courses(&self) -> Vec<&CourseGrant> {
        match self {
            GrantOutcome::Chapter { courses, .. } => {
                courses.iter().filter(|c| c.status.is_failed()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            GrantOutcome::Course(grant) => match &grant.status {
                CourseGrantStatus::Enrolled => format!("Enrolled in course {}", grant.course_id),
                CourseGrantStatus::AlreadyEnrolled => {
                    format!("Already enrolled in course {}", grant.course_id)
                }
                CourseGrantStatus::Failed { error } => {
                    format!("Failed to enroll in course {}: {}", grant.course_id, error)
                }
            },
            GrantOutcome::Chapter {
                chapter_id,
                membership_error: Some(error),
                ..
            } => format!(
                "Enrolled in chapter {}; member courses could not be read: {}",
                chapter_id, error
            ),
            GrantOutcome::Chapter {
                chapter_id,
                courses,
                ..
            } => {
                let failed = self.failed_courses().len();
                if failed == 0 {
                    format!(
                        "Enrolled in chapter {} and its {} courses",
                        chapter_id,
                        courses.len()
                    )
                } else {
                    format!(
                        "Enrolled in chapter {}; {} of {} courses failed",
                        chapter_id,
                        failed,
                        courses.len()
                    )
                }
            }
            GrantOutcome::Unsupported { item_type } => {
                format!("Item type {} does not grant an enrollment", item_type.as_str())
            }
        }
    }
}

/// Wire projection of a grant: success flag, message and optional error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GrantOutcome>,
}

impl From<LmsResult<GrantOutcome>> for EnrollmentResult {
    fn from(result: LmsResult<GrantOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: outcome.is_success(),
                message: outcome.message(),
                error: None,
                outcome: Some(outcome),
            },
            Err(e) => Self {
                success: false,
                message: "Enrollment failed".to_string(),
                error: Some(e.to_string()),
                outcome: None,
            },
        }
    }
}
