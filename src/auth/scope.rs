//! Decides whose records a caller may read.

use super::{Caller, Permission};
use crate::error::AppError;
use crate::models::{Course, CourseFilter, GradeFilter};

/// Resolves the student a report card may be assembled for.
///
/// Staff may read any student but must name one. Students only ever get
/// their own linked profile, whether or not they pass its id.
pub fn report_card_target(caller: &Caller, requested: Option<i64>) -> Result<i64, AppError> {
    if caller.has_permission(Permission::ViewAnyReportCard) {
        return requested.ok_or_else(|| {
            AppError::Validation(format!(
                "A student id is required for {} report-card requests",
                caller.role
            ))
        });
    }

    caller.require_permission(Permission::ViewOwnReportCard)?;
    let own = own_student_id(caller)?;

    match requested {
        Some(id) if id != own => {
            tracing::warn!(
                account_id = %caller.account_id,
                requested_student = %id,
                "Student requested another student's report card"
            );
            Err(AppError::Forbidden(
                "Students may only view their own report card".to_string(),
            ))
        }
        _ => Ok(own),
    }
}

/// Narrows a grade listing to what the caller may see.
pub fn grade_listing_scope(caller: &Caller, filter: GradeFilter) -> Result<GradeFilter, AppError> {
    if caller.has_permission(Permission::ViewAllGrades) {
        return Ok(filter);
    }

    caller.require_permission(Permission::ViewOwnGrades)?;
    let own = own_student_id(caller)?;

    match filter.student_id {
        Some(id) if id != own => Err(AppError::Forbidden(
            "Students may only list their own grades".to_string(),
        )),
        _ => Ok(GradeFilter {
            student_id: Some(own),
            ..filter
        }),
    }
}

/// Checks a single record owned by `owner_student_id` is visible to the caller.
pub fn ensure_can_view_student(caller: &Caller, owner_student_id: i64) -> Result<(), AppError> {
    if caller.has_permission(Permission::ViewAllGrades) {
        return Ok(());
    }

    caller.require_permission(Permission::ViewOwnGrades)?;
    if own_student_id(caller)? == owner_student_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Students may only view their own records".to_string(),
        ))
    }
}

/// Lets a caller limited to their own records see a missing id the same way
/// as another student's, so lookups cannot tell which ids exist.
pub fn conceal_missing(caller: &Caller, error: AppError) -> AppError {
    match error {
        AppError::NotFound(_) if !caller.has_permission(Permission::ViewAllGrades) => {
            AppError::Forbidden("Students may only view their own records".to_string())
        }
        other => other,
    }
}

/// Teachers who do not manage courses only list the courses they teach.
pub fn course_listing_scope(
    caller: &Caller,
    filter: CourseFilter,
) -> Result<CourseFilter, AppError> {
    caller.require_permission(Permission::ViewCourses)?;
    if caller.has_permission(Permission::ManageCourses) {
        return Ok(filter);
    }

    match caller.teacher_id {
        Some(own) => Ok(CourseFilter {
            teacher_id: Some(own),
            ..filter
        }),
        None => Ok(filter),
    }
}

/// Course-bound announcements from teachers must target a course they teach.
pub fn ensure_can_announce_to(caller: &Caller, course: &Course) -> Result<(), AppError> {
    if caller.has_permission(Permission::ManageCourses) {
        return Ok(());
    }

    match (caller.teacher_id, course.teacher_id) {
        (Some(own), Some(assigned)) if own == assigned => Ok(()),
        _ => {
            tracing::warn!(
                account_id = %caller.account_id,
                course_id = %course.id,
                "Announcement for a course the caller does not teach"
            );
            Err(AppError::Forbidden(format!(
                "You do not teach course {}",
                course.code
            )))
        }
    }
}

fn own_student_id(caller: &Caller) -> Result<i64, AppError> {
    caller.student_id.ok_or_else(|| {
        AppError::NotFound(format!(
            "No student profile linked to account {}",
            caller.account_id
        ))
    })
}
