use sqlx::SqliteConnection;
use tracing::{info, instrument};

use crate::db;
use crate::error::AppError;
use crate::models::{EnrollmentRef, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentCandidate {
    pub id: i64,
    pub term: Term,
}

/// Picks the enrollment in the most recent term.
///
/// Two enrollments sharing that term for the same student and course break
/// the uniqueness invariant, so that is reported instead of guessed.
pub fn pick_latest(candidates: &[EnrollmentCandidate]) -> Result<i64, AppError> {
    let not_found =
        || AppError::NotFound("No enrollment found for this student and course".to_string());

    let latest = candidates
        .iter()
        .map(|candidate| candidate.term)
        .max()
        .ok_or_else(not_found)?;

    let mut in_latest_term = candidates.iter().filter(|c| c.term == latest);
    match (in_latest_term.next(), in_latest_term.next()) {
        (Some(only), None) => Ok(only.id),
        (Some(first), Some(second)) => Err(AppError::Conflict(format!(
            "Enrollments {} and {} both cover {}/{}",
            first.id, second.id, latest.year, latest.semester
        ))),
        (None, _) => Err(not_found()),
    }
}

/// Resolves the enrollment a new grade attaches to.
#[instrument(skip(conn))]
pub async fn resolve_enrollment(
    conn: &mut SqliteConnection,
    reference: &EnrollmentRef,
) -> Result<i64, AppError> {
    match *reference {
        EnrollmentRef::ById { enrollment_id } => {
            let enrollment = db::get_enrollment(conn, enrollment_id).await?;
            Ok(enrollment.id)
        }
        EnrollmentRef::ByStudentCourse {
            student_id,
            course_id,
        } => {
            let candidates = db::get_enrollment_candidates(conn, student_id, course_id).await?;
            let enrollment_id = pick_latest(&candidates).map_err(|err| match err {
                AppError::NotFound(_) => AppError::NotFound(format!(
                    "No enrollment found for student {} in course {}",
                    student_id, course_id
                )),
                other => other,
            })?;
            info!(enrollment_id, "Resolved enrollment from student and course");
            Ok(enrollment_id)
        }
    }
}
