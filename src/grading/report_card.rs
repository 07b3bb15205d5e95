use std::collections::HashMap;

use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument};

use super::{Situation, final_average};
use crate::db;
use crate::error::AppError;
use crate::models::{GradeEntry, ReportCard, ReportCardLine};

/// Builds the report card for one student: every enrollment, newest term
/// first and then by course name, with its grades and derived average.
/// All reads share one transaction.
#[instrument(skip(pool))]
pub async fn assemble_report_card(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<ReportCard, AppError> {
    info!("Assembling report card");
    let mut tx = pool.begin().await?;
    let student = db::get_student_snapshot(&mut *tx, student_id).await?;
    let rows = db::get_report_card_rows(&mut *tx, student_id).await?;
    let all_grades = db::get_grades_for_student(&mut *tx, student_id).await?;
    tx.commit().await?;

    let mut by_enrollment: HashMap<i64, Vec<GradeEntry>> = HashMap::new();
    for grade in all_grades {
        by_enrollment
            .entry(grade.enrollment_id)
            .or_default()
            .push(grade);
    }

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let (enrollment, course) = row.split();
        let grades = by_enrollment.remove(&enrollment.id).unwrap_or_default();
        let final_average = final_average(&grades);
        let situation = Situation::from_average(final_average);

        debug!(
            enrollment_id = enrollment.id,
            course = %course.code,
            grade_count = grades.len(),
            final_average,
            situation = situation.as_str(),
            "Computed report card line"
        );

        lines.push(ReportCardLine {
            enrollment,
            course,
            grades,
            final_average,
            situation,
        });
    }

    Ok(ReportCard { student, lines })
}
