use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::auth::{
    Caller, Permission, conceal_missing, ensure_can_view_student, grade_listing_scope,
    report_card_target,
};
use crate::db;
use crate::error::AppError;
use crate::grading::{assemble_report_card, resolve_enrollment};
use crate::models::{EnrollmentRef, GradeEntry, GradeFilter, GradeUpdate, NewGrade, ReportCard};
use crate::validation::{ValidateExt, ensure_hundredths};

/// Grade and report-card operations, each run on behalf of a [`Caller`].
#[derive(Clone)]
pub struct Scholar {
    pool: SqlitePool,
}

impl Scholar {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Looks up the caller behind an account. Inactive accounts load fine but
    /// hold no permissions.
    #[instrument(skip(self))]
    pub async fn load_caller(&self, account_id: i64) -> Result<Caller, AppError> {
        let caller = db::get_caller(&self.pool, account_id).await?;
        if !caller.active {
            tracing::warn!(account_id, "Loaded inactive account");
        }
        Ok(caller)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id, role = %caller.role))]
    pub async fn compute_report_card(
        &self,
        caller: &Caller,
        student_id: Option<i64>,
    ) -> Result<ReportCard, AppError> {
        let target = report_card_target(caller, student_id)?;
        let report_card = assemble_report_card(&self.pool, target).await?;
        info!(
            student_id = target,
            lines = report_card.lines.len(),
            "Report card computed"
        );
        Ok(report_card)
    }

    #[instrument(skip(self, caller, grade), fields(account_id = caller.account_id))]
    pub async fn record_grade(
        &self,
        caller: &Caller,
        reference: EnrollmentRef,
        grade: NewGrade,
    ) -> Result<GradeEntry, AppError> {
        caller.require_permission(Permission::RecordGrades)?;
        let grade = grade.validated()?;
        ensure_hundredths("score", Some(grade.score))?;
        ensure_hundredths("weight", grade.weight)?;

        let mut tx = self.pool.begin().await?;
        let enrollment_id = resolve_enrollment(&mut *tx, &reference).await?;
        let entry = db::insert_grade(&mut *tx, enrollment_id, &grade).await?;
        tx.commit().await?;

        info!(grade_id = entry.id, enrollment_id, "Grade recorded");
        Ok(entry)
    }

    #[instrument(skip(self, caller, update), fields(account_id = caller.account_id))]
    pub async fn update_grade(
        &self,
        caller: &Caller,
        grade_id: i64,
        update: GradeUpdate,
    ) -> Result<GradeEntry, AppError> {
        caller.require_permission(Permission::EditGrades)?;
        let update = update.validated()?;
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }
        ensure_hundredths("score", update.score)?;
        ensure_hundredths("weight", update.weight)?;

        let mut tx = self.pool.begin().await?;
        db::get_grade(&mut *tx, grade_id).await?;
        db::apply_grade_update(&mut *tx, grade_id, &update).await?;
        let entry = db::get_grade(&mut *tx, grade_id).await?;
        tx.commit().await?;

        info!(grade_id, "Grade updated");
        Ok(entry)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn delete_grade(&self, caller: &Caller, grade_id: i64) -> Result<(), AppError> {
        caller.require_permission(Permission::DeleteGrades)?;

        let mut tx = self.pool.begin().await?;
        db::delete_grade(&mut *tx, grade_id).await?;
        tx.commit().await?;

        info!(grade_id, "Grade deleted");
        Ok(())
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn get_grade(&self, caller: &Caller, grade_id: i64) -> Result<GradeEntry, AppError> {
        let owner = db::get_grade_owner(&self.pool, grade_id)
            .await
            .map_err(|e| conceal_missing(caller, e))?;
        ensure_can_view_student(caller, owner)?;
        db::get_grade(&self.pool, grade_id).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_grades(
        &self,
        caller: &Caller,
        filter: GradeFilter,
    ) -> Result<Vec<GradeEntry>, AppError> {
        let filter = grade_listing_scope(caller, filter)?;
        db::list_grades(&self.pool, &filter).await
    }
}
