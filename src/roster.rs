//! Administrative upkeep of students, teachers, courses and enrollments.

use tracing::{info, instrument};

use crate::api::Scholar;
use crate::auth::{
    Caller, Permission, Role, conceal_missing, course_listing_scope, ensure_can_view_student,
};
use crate::db;
use crate::error::AppError;
use crate::models::{
    Course, CourseFilter, CourseUpdate, Enrollment, EnrollmentDetail, EnrollmentFilter,
    EnrollmentStatus, NewCourse, NewEnrollment, NewStudent, NewTeacher, StudentFilter,
    StudentProfile, StudentUpdate, TeacherFilter, TeacherProfile, TeacherUpdate,
};
use crate::validation::ValidateExt;

impl Scholar {
    /// Creates an admin account without a calling identity. Used to seed an
    /// empty database from the command line.
    #[instrument(skip(self, password_hash))]
    pub async fn bootstrap_admin(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Caller, AppError> {
        if email.trim().is_empty() || password_hash.is_empty() {
            return Err(AppError::Validation(
                "email and password hash are required".to_string(),
            ));
        }

        let mut tx = self.pool().begin().await?;
        let account_id = db::insert_account(&mut *tx, email, password_hash, Role::Admin).await?;
        tx.commit().await?;

        info!(account_id, "Admin account created");
        self.load_caller(account_id).await
    }

    #[instrument(skip(self, caller, student), fields(account_id = caller.account_id))]
    pub async fn create_student(
        &self,
        caller: &Caller,
        student: NewStudent,
    ) -> Result<StudentProfile, AppError> {
        caller.require_permission(Permission::ManageStudents)?;
        let student = student.validated()?;

        let mut tx = self.pool().begin().await?;
        let account_id =
            db::insert_account(&mut *tx, &student.email, &student.password_hash, Role::Student)
                .await?;
        let student_id = db::insert_student(&mut *tx, account_id, &student).await?;
        let profile = db::get_student_profile(&mut *tx, student_id).await?;
        tx.commit().await?;

        info!(student_id, "Student created");
        Ok(profile)
    }

    #[instrument(skip(self, caller, update), fields(account_id = caller.account_id))]
    pub async fn update_student(
        &self,
        caller: &Caller,
        student_id: i64,
        update: StudentUpdate,
    ) -> Result<StudentProfile, AppError> {
        caller.require_permission(Permission::ManageStudents)?;
        let update = update.validated()?;
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        let mut tx = self.pool().begin().await?;
        let existing = db::get_student_profile(&mut *tx, student_id).await?;
        db::apply_account_update(
            &mut *tx,
            existing.account_id,
            update.email.as_deref(),
            update.password_hash.as_deref(),
            update.active,
        )
        .await?;
        db::apply_student_update(&mut *tx, student_id, &update).await?;
        let profile = db::get_student_profile(&mut *tx, student_id).await?;
        tx.commit().await?;

        info!(student_id, "Student updated");
        Ok(profile)
    }

    /// Staff read any profile; students only their own.
    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn get_student(
        &self,
        caller: &Caller,
        student_id: i64,
    ) -> Result<StudentProfile, AppError> {
        ensure_can_view_student(caller, student_id)?;
        db::get_student_profile(self.pool(), student_id).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_students(
        &self,
        caller: &Caller,
        filter: StudentFilter,
    ) -> Result<Vec<StudentProfile>, AppError> {
        caller.require_permission(Permission::ViewRoster)?;
        db::list_students(self.pool(), &filter).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn deactivate_student(
        &self,
        caller: &Caller,
        student_id: i64,
    ) -> Result<(), AppError> {
        caller.require_permission(Permission::ManageStudents)?;

        let mut tx = self.pool().begin().await?;
        let profile = db::get_student_profile(&mut *tx, student_id).await?;
        db::set_account_active(&mut *tx, profile.account_id, false).await?;
        tx.commit().await?;

        info!(student_id, "Student deactivated");
        Ok(())
    }

    #[instrument(skip(self, caller, teacher), fields(account_id = caller.account_id))]
    pub async fn create_teacher(
        &self,
        caller: &Caller,
        teacher: NewTeacher,
    ) -> Result<TeacherProfile, AppError> {
        caller.require_permission(Permission::ManageTeachers)?;
        let teacher = teacher.validated()?;

        let mut tx = self.pool().begin().await?;
        let account_id =
            db::insert_account(&mut *tx, &teacher.email, &teacher.password_hash, Role::Teacher)
                .await?;
        let teacher_id = db::insert_teacher(&mut *tx, account_id, &teacher).await?;
        let profile = db::get_teacher_profile(&mut *tx, teacher_id).await?;
        tx.commit().await?;

        info!(teacher_id, "Teacher created");
        Ok(profile)
    }

    #[instrument(skip(self, caller, update), fields(account_id = caller.account_id))]
    pub async fn update_teacher(
        &self,
        caller: &Caller,
        teacher_id: i64,
        update: TeacherUpdate,
    ) -> Result<TeacherProfile, AppError> {
        caller.require_permission(Permission::ManageTeachers)?;
        let update = update.validated()?;
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }
        if let Some(Some(years)) = update.years_teaching {
            if years < 0 {
                return Err(AppError::Validation(
                    "years_teaching: years teaching cannot be negative".to_string(),
                ));
            }
        }

        let mut tx = self.pool().begin().await?;
        let existing = db::get_teacher_profile(&mut *tx, teacher_id).await?;
        db::apply_account_update(
            &mut *tx,
            existing.account_id,
            update.email.as_deref(),
            update.password_hash.as_deref(),
            update.active,
        )
        .await?;
        db::apply_teacher_update(&mut *tx, teacher_id, &update).await?;
        let profile = db::get_teacher_profile(&mut *tx, teacher_id).await?;
        tx.commit().await?;

        info!(teacher_id, "Teacher updated");
        Ok(profile)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn get_teacher(
        &self,
        caller: &Caller,
        teacher_id: i64,
    ) -> Result<TeacherProfile, AppError> {
        caller.require_permission(Permission::ViewRoster)?;
        db::get_teacher_profile(self.pool(), teacher_id).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_teachers(
        &self,
        caller: &Caller,
        filter: TeacherFilter,
    ) -> Result<Vec<TeacherProfile>, AppError> {
        caller.require_permission(Permission::ViewRoster)?;
        db::list_teachers(self.pool(), &filter).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn deactivate_teacher(
        &self,
        caller: &Caller,
        teacher_id: i64,
    ) -> Result<(), AppError> {
        caller.require_permission(Permission::ManageTeachers)?;

        let mut tx = self.pool().begin().await?;
        let profile = db::get_teacher_profile(&mut *tx, teacher_id).await?;
        db::set_account_active(&mut *tx, profile.account_id, false).await?;
        tx.commit().await?;

        info!(teacher_id, "Teacher deactivated");
        Ok(())
    }

    #[instrument(skip(self, caller, course), fields(account_id = caller.account_id))]
    pub async fn create_course(
        &self,
        caller: &Caller,
        course: NewCourse,
    ) -> Result<Course, AppError> {
        caller.require_permission(Permission::ManageCourses)?;
        let course = course.validated()?;

        let mut tx = self.pool().begin().await?;
        let course_id = db::insert_course(&mut *tx, &course).await?;
        let created = db::get_course(&mut *tx, course_id).await?;
        tx.commit().await?;

        info!(course_id, code = %created.code, "Course created");
        Ok(created)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn get_course(&self, caller: &Caller, course_id: i64) -> Result<Course, AppError> {
        caller.require_permission(Permission::ViewCourses)?;
        db::get_course(self.pool(), course_id).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_courses(
        &self,
        caller: &Caller,
        filter: CourseFilter,
    ) -> Result<Vec<Course>, AppError> {
        let filter = course_listing_scope(caller, filter)?;
        db::list_courses(self.pool(), &filter).await
    }

    #[instrument(skip(self, caller, update), fields(account_id = caller.account_id))]
    pub async fn update_course(
        &self,
        caller: &Caller,
        course_id: i64,
        update: CourseUpdate,
    ) -> Result<Course, AppError> {
        caller.require_permission(Permission::ManageCourses)?;
        let update = update.validated()?;
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }
        if let Some(Some(semester)) = update.semester {
            if !(1..=2).contains(&semester) {
                return Err(AppError::Validation(
                    "semester: semester must be 1 or 2".to_string(),
                ));
            }
        }

        let mut tx = self.pool().begin().await?;
        db::get_course(&mut *tx, course_id).await?;
        db::apply_course_update(&mut *tx, course_id, &update).await?;
        let updated = db::get_course(&mut *tx, course_id).await?;
        tx.commit().await?;

        info!(course_id, "Course updated");
        Ok(updated)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn deactivate_course(&self, caller: &Caller, course_id: i64) -> Result<(), AppError> {
        caller.require_permission(Permission::ManageCourses)?;
        db::set_course_active(self.pool(), course_id, false).await?;

        info!(course_id, "Course deactivated");
        Ok(())
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn create_enrollment(
        &self,
        caller: &Caller,
        enrollment: NewEnrollment,
    ) -> Result<Enrollment, AppError> {
        caller.require_permission(Permission::ManageEnrollments)?;
        let enrollment = enrollment.validated()?;

        let mut tx = self.pool().begin().await?;
        let enrollment_id = db::insert_enrollment(&mut *tx, &enrollment).await?;
        let created = db::get_enrollment(&mut *tx, enrollment_id).await?;
        tx.commit().await?;

        info!(enrollment_id, "Enrollment created");
        Ok(created)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn get_enrollment(
        &self,
        caller: &Caller,
        enrollment_id: i64,
    ) -> Result<Enrollment, AppError> {
        let enrollment = db::get_enrollment(self.pool(), enrollment_id)
            .await
            .map_err(|e| conceal_missing(caller, e))?;
        ensure_can_view_student(caller, enrollment.student_id)?;
        Ok(enrollment)
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn list_enrollments(
        &self,
        caller: &Caller,
        filter: EnrollmentFilter,
    ) -> Result<Vec<EnrollmentDetail>, AppError> {
        caller.require_permission(Permission::ViewRoster)?;
        db::list_enrollments(self.pool(), &filter).await
    }

    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn update_enrollment_status(
        &self,
        caller: &Caller,
        enrollment_id: i64,
        status: EnrollmentStatus,
    ) -> Result<Enrollment, AppError> {
        caller.require_permission(Permission::UpdateEnrollmentStatus)?;

        let mut tx = self.pool().begin().await?;
        db::update_enrollment_status(&mut *tx, enrollment_id, status).await?;
        let updated = db::get_enrollment(&mut *tx, enrollment_id).await?;
        tx.commit().await?;

        info!(enrollment_id, status = ?status, "Enrollment status updated");
        Ok(updated)
    }

    /// Removes an enrollment together with its grades.
    #[instrument(skip(self, caller), fields(account_id = caller.account_id))]
    pub async fn delete_enrollment(
        &self,
        caller: &Caller,
        enrollment_id: i64,
    ) -> Result<(), AppError> {
        caller.require_permission(Permission::ManageEnrollments)?;
        db::delete_enrollment(self.pool(), enrollment_id).await?;

        info!(enrollment_id, "Enrollment deleted");
        Ok(())
    }
}
