use sqlx::{Executor, Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{Caller, DbCaller, Role};
use crate::error::AppError;
use crate::grading::EnrollmentCandidate;
use crate::models::{
    Announcement, Course, CourseFilter, CourseUpdate, DbAnnouncement, DbEnrollment,
    DbEnrollmentDetail, DbGradeEntry, DbReportCardRow, Enrollment, EnrollmentDetail,
    EnrollmentFilter, EnrollmentStatus, GradeEntry, GradeFilter, GradeUpdate, NewAnnouncement,
    NewCourse, NewEnrollment, NewGrade, NewStudent, NewTeacher, StudentFilter, StudentProfile,
    StudentSnapshot, StudentUpdate, TeacherFilter, TeacherProfile, TeacherUpdate, Term,
    to_hundredths,
};

const STUDENT_PROFILE_SELECT: &str = "s.id, s.account_id, s.name, s.student_number, \
     s.course_of_study, s.birth_date, s.address, a.email, a.active \
     FROM students s INNER JOIN accounts a ON s.account_id = a.id";

const TEACHER_PROFILE_SELECT: &str = "t.id, t.account_id, t.name, t.title, t.years_teaching, \
     t.specialization, a.email, a.active \
     FROM teachers t INNER JOIN accounts a ON t.account_id = a.id";

const COURSE_COLUMNS: &str =
    "c.id, c.name, c.code, c.weekly_hours, c.semester, c.teacher_id, c.description, c.active";

// Same shape as DbReportCardRow, with the student columns listings add.
const ENROLLMENT_DETAIL_SELECT: &str = "e.id AS enrollment_id, e.student_id, e.course_id, \
     e.semester, e.year, e.status, c.name AS course_name, c.code AS course_code, \
     c.weekly_hours, c.semester AS course_semester, t.name AS teacher_name, \
     s.name AS student_name, s.student_number \
     FROM enrollments e \
     INNER JOIN students s ON e.student_id = s.id \
     INNER JOIN courses c ON e.course_id = c.id \
     LEFT JOIN teachers t ON c.teacher_id = t.id";

const ANNOUNCEMENT_SELECT: &str = "n.id, n.title, n.content, n.kind, \
     CASE \
         WHEN a.role = 'admin' THEN 'Administration' \
         WHEN a.role = 'teacher' THEN COALESCE(t.name, 'System') \
         ELSE 'System' \
     END AS author_name, \
     n.course_id, c.name AS course_name, n.published_at, n.event_date \
     FROM announcements n \
     LEFT JOIN accounts a ON n.author_account_id = a.id \
     LEFT JOIN teachers t ON t.account_id = a.id \
     LEFT JOIN courses c ON n.course_id = c.id";

const GRADE_COLUMNS: &str = "g.id, g.enrollment_id, g.assessment_type, g.score_hundredths, \
     g.weight_hundredths, g.assessment_date, g.notes, g.created_at, g.updated_at";

// ---------------------------------------------------------------------------
// Accounts

#[instrument(skip(pool))]
pub async fn get_caller(pool: &Pool<Sqlite>, account_id: i64) -> Result<Caller, AppError> {
    info!("Fetching caller by account ID");
    let row = sqlx::query_as::<_, DbCaller>(
        "SELECT a.id, a.email, a.role, a.active,
                s.id AS student_id, t.id AS teacher_id
         FROM accounts a
         LEFT JOIN students s ON s.account_id = a.id
         LEFT JOIN teachers t ON t.account_id = a.id
         WHERE a.id = ?",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(caller) => Ok(Caller::from(caller)),
        _ => Err(AppError::NotFound(format!(
            "Account with id {} not found in database",
            account_id
        ))),
    }
}

#[instrument(skip(conn, password_hash))]
pub async fn insert_account(
    conn: &mut SqliteConnection,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<i64, AppError> {
    info!("Creating account");
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let res = sqlx::query("INSERT INTO accounts (email, password_hash, role) VALUES (?, ?, ?)")
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .execute(&mut *conn)
        .await?;

    Ok(res.last_insert_rowid())
}

/// Applies the account-level fields of a profile edit one column at a time.
#[instrument(skip(conn, password_hash))]
pub async fn apply_account_update(
    conn: &mut SqliteConnection,
    account_id: i64,
    email: Option<&str>,
    password_hash: Option<&str>,
    active: Option<bool>,
) -> Result<(), AppError> {
    if let Some(email) = email {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM accounts WHERE email = ? AND id != ?",
        )
        .bind(email)
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        if taken.is_some() {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        sqlx::query("UPDATE accounts SET email = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(email)
            .bind(account_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(password_hash) = password_hash {
        sqlx::query(
            "UPDATE accounts SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(password_hash)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(active) = active {
        set_account_active(&mut *conn, account_id, active).await?;
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn set_account_active<'e, E>(
    executor: E,
    account_id: i64,
    active: bool,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Setting account active flag");
    sqlx::query("UPDATE accounts SET active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(active)
        .bind(account_id)
        .execute(executor)
        .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Students

#[instrument(skip(conn))]
pub async fn insert_student(
    conn: &mut SqliteConnection,
    account_id: i64,
    student: &NewStudent,
) -> Result<i64, AppError> {
    info!("Creating student profile");
    ensure_student_number_free(&mut *conn, &student.student_number, None).await?;

    let res = sqlx::query(
        "INSERT INTO students
         (account_id, name, student_number, course_of_study, birth_date, address)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(&student.name)
    .bind(&student.student_number)
    .bind(&student.course_of_study)
    .bind(student.birth_date)
    .bind(&student.address)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

async fn ensure_student_number_free(
    conn: &mut SqliteConnection,
    student_number: &str,
    except_id: Option<i64>,
) -> Result<(), AppError> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM students WHERE student_number = ? AND id != ?",
    )
    .bind(student_number)
    .bind(except_id.unwrap_or(-1))
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(_) => Err(AppError::Conflict(format!(
            "Student number '{}' is already registered",
            student_number
        ))),
        None => Ok(()),
    }
}

#[instrument(skip(executor))]
pub async fn get_student_profile<'e, E>(
    executor: E,
    student_id: i64,
) -> Result<StudentProfile, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching student profile");
    let query = format!("SELECT {} WHERE s.id = ?", STUDENT_PROFILE_SELECT);
    sqlx::query_as::<_, StudentProfile>(&query)
        .bind(student_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", student_id)))
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &Pool<Sqlite>,
    filter: &StudentFilter,
) -> Result<Vec<StudentProfile>, AppError> {
    info!("Listing students");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} WHERE 1=1",
        STUDENT_PROFILE_SELECT
    ));

    if let Some(search) = non_blank(&filter.search) {
        let pattern = like_pattern(search);
        query
            .push(" AND (s.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR s.student_number LIKE ")
            .push_bind(pattern.clone())
            .push(" OR a.email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(course_of_study) = non_blank(&filter.course_of_study) {
        query
            .push(" AND s.course_of_study LIKE ")
            .push_bind(like_pattern(course_of_study));
    }
    if let Some(active) = filter.active {
        query.push(" AND a.active = ").push_bind(active);
    }
    query.push(" ORDER BY s.name ASC, s.id ASC");

    let rows = query
        .build_query_as::<StudentProfile>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[instrument(skip(executor))]
pub async fn get_student_snapshot<'e, E>(
    executor: E,
    student_id: i64,
) -> Result<StudentSnapshot, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching student snapshot");
    sqlx::query_as::<_, StudentSnapshot>(
        "SELECT s.id AS student_id, s.name, s.student_number, s.course_of_study, a.email
         FROM students s
         INNER JOIN accounts a ON s.account_id = a.id
         WHERE s.id = ?",
    )
    .bind(student_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", student_id)))
}

#[instrument(skip(conn))]
pub async fn apply_student_update(
    conn: &mut SqliteConnection,
    student_id: i64,
    update: &StudentUpdate,
) -> Result<(), AppError> {
    info!("Updating student profile");
    if let Some(name) = &update.name {
        sqlx::query("UPDATE students SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(name)
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(student_number) = &update.student_number {
        ensure_student_number_free(&mut *conn, student_number, Some(student_id)).await?;
        sqlx::query(
            "UPDATE students SET student_number = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(student_number)
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(course_of_study) = &update.course_of_study {
        sqlx::query(
            "UPDATE students SET course_of_study = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(course_of_study)
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(birth_date) = &update.birth_date {
        sqlx::query(
            "UPDATE students SET birth_date = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(*birth_date)
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(address) = &update.address {
        sqlx::query("UPDATE students SET address = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(address.as_deref())
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Teachers

#[instrument(skip(conn))]
pub async fn insert_teacher(
    conn: &mut SqliteConnection,
    account_id: i64,
    teacher: &NewTeacher,
) -> Result<i64, AppError> {
    info!("Creating teacher profile");
    let res = sqlx::query(
        "INSERT INTO teachers (account_id, name, title, years_teaching, specialization)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(&teacher.name)
    .bind(&teacher.title)
    .bind(teacher.years_teaching)
    .bind(&teacher.specialization)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor))]
pub async fn get_teacher_profile<'e, E>(
    executor: E,
    teacher_id: i64,
) -> Result<TeacherProfile, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching teacher profile");
    let query = format!("SELECT {} WHERE t.id = ?", TEACHER_PROFILE_SELECT);
    sqlx::query_as::<_, TeacherProfile>(&query)
        .bind(teacher_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Teacher with id {} not found", teacher_id)))
}

#[instrument(skip(pool))]
pub async fn list_teachers(
    pool: &Pool<Sqlite>,
    filter: &TeacherFilter,
) -> Result<Vec<TeacherProfile>, AppError> {
    info!("Listing teachers");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} WHERE 1=1",
        TEACHER_PROFILE_SELECT
    ));

    if let Some(search) = non_blank(&filter.search) {
        let pattern = like_pattern(search);
        query
            .push(" AND (t.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR a.email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(title) = non_blank(&filter.title) {
        query.push(" AND t.title LIKE ").push_bind(like_pattern(title));
    }
    if let Some(active) = filter.active {
        query.push(" AND a.active = ").push_bind(active);
    }
    query.push(" ORDER BY t.name ASC, t.id ASC");

    let rows = query
        .build_query_as::<TeacherProfile>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn apply_teacher_update(
    conn: &mut SqliteConnection,
    teacher_id: i64,
    update: &TeacherUpdate,
) -> Result<(), AppError> {
    info!("Updating teacher profile");
    if let Some(name) = &update.name {
        sqlx::query("UPDATE teachers SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(name)
            .bind(teacher_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(title) = &update.title {
        sqlx::query("UPDATE teachers SET title = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(title)
            .bind(teacher_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(years_teaching) = &update.years_teaching {
        sqlx::query(
            "UPDATE teachers SET years_teaching = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(*years_teaching)
        .bind(teacher_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(specialization) = &update.specialization {
        sqlx::query(
            "UPDATE teachers SET specialization = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(specialization.as_deref())
        .bind(teacher_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Courses

#[instrument(skip(conn))]
pub async fn insert_course(
    conn: &mut SqliteConnection,
    course: &NewCourse,
) -> Result<i64, AppError> {
    info!("Creating course");
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM courses WHERE code = ?")
        .bind(&course.code)
        .fetch_optional(&mut *conn)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Course code '{}' is already registered",
            course.code
        )));
    }

    if let Some(teacher_id) = course.teacher_id {
        get_teacher_profile(&mut *conn, teacher_id).await?;
    }

    let res = sqlx::query(
        "INSERT INTO courses (name, code, weekly_hours, semester, teacher_id, description)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&course.name)
    .bind(&course.code)
    .bind(course.weekly_hours)
    .bind(course.semester)
    .bind(course.teacher_id)
    .bind(&course.description)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor))]
pub async fn get_course<'e, E>(executor: E, course_id: i64) -> Result<Course, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching course");
    let query = format!("SELECT {} FROM courses c WHERE c.id = ?", COURSE_COLUMNS);
    sqlx::query_as::<_, Course>(&query)
        .bind(course_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course with id {} not found", course_id)))
}

#[instrument(skip(pool))]
pub async fn list_courses(
    pool: &Pool<Sqlite>,
    filter: &CourseFilter,
) -> Result<Vec<Course>, AppError> {
    info!("Listing courses");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM courses c WHERE 1=1",
        COURSE_COLUMNS
    ));

    if let Some(search) = non_blank(&filter.search) {
        let pattern = like_pattern(search);
        query
            .push(" AND (c.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.code LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(teacher_id) = filter.teacher_id {
        query.push(" AND c.teacher_id = ").push_bind(teacher_id);
    }
    if let Some(semester) = filter.semester {
        query.push(" AND c.semester = ").push_bind(semester);
    }
    if let Some(active) = filter.active {
        query.push(" AND c.active = ").push_bind(active);
    }
    query.push(" ORDER BY c.semester ASC, c.name ASC, c.id ASC");

    let rows = query.build_query_as::<Course>().fetch_all(pool).await?;

    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn apply_course_update(
    conn: &mut SqliteConnection,
    course_id: i64,
    update: &CourseUpdate,
) -> Result<(), AppError> {
    info!("Updating course");
    if let Some(code) = &update.code {
        let existing =
            sqlx::query_scalar::<_, i64>("SELECT id FROM courses WHERE code = ? AND id != ?")
                .bind(code)
                .bind(course_id)
                .fetch_optional(&mut *conn)
                .await?;

        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Course code '{}' is already registered",
                code
            )));
        }

        sqlx::query("UPDATE courses SET code = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(code)
            .bind(course_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(name) = &update.name {
        sqlx::query("UPDATE courses SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(name)
            .bind(course_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(weekly_hours) = update.weekly_hours {
        sqlx::query(
            "UPDATE courses SET weekly_hours = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(weekly_hours)
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(semester) = update.semester {
        sqlx::query("UPDATE courses SET semester = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(semester)
            .bind(course_id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(teacher_id) = update.teacher_id {
        if let Some(teacher_id) = teacher_id {
            get_teacher_profile(&mut *conn, teacher_id).await?;
        }
        sqlx::query(
            "UPDATE courses SET teacher_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(teacher_id)
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(description) = &update.description {
        sqlx::query(
            "UPDATE courses SET description = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(description.as_deref())
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(active) = update.active {
        set_course_active(&mut *conn, course_id, active).await?;
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn set_course_active<'e, E>(
    executor: E,
    course_id: i64,
    active: bool,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Setting course active flag");
    let res =
        sqlx::query("UPDATE courses SET active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(active)
            .bind(course_id)
            .execute(executor)
            .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found",
            course_id
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Enrollments

#[instrument(skip(conn))]
pub async fn insert_enrollment(
    conn: &mut SqliteConnection,
    enrollment: &NewEnrollment,
) -> Result<i64, AppError> {
    info!("Creating enrollment");
    get_student_profile(&mut *conn, enrollment.student_id).await?;
    get_course(&mut *conn, enrollment.course_id).await?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM enrollments
         WHERE student_id = ? AND course_id = ? AND semester = ? AND year = ?",
    )
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(enrollment.semester)
    .bind(enrollment.year)
    .fetch_optional(&mut *conn)
    .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Student {} is already enrolled in course {} for {}/{}",
            enrollment.student_id, enrollment.course_id, enrollment.year, enrollment.semester
        )));
    }

    let res = sqlx::query(
        "INSERT INTO enrollments (student_id, course_id, semester, year) VALUES (?, ?, ?, ?)",
    )
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(enrollment.semester)
    .bind(enrollment.year)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor))]
pub async fn get_enrollment<'e, E>(executor: E, enrollment_id: i64) -> Result<Enrollment, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching enrollment");
    sqlx::query_as::<_, DbEnrollment>(
        "SELECT id, student_id, course_id, semester, year, status
         FROM enrollments WHERE id = ?",
    )
    .bind(enrollment_id)
    .fetch_optional(executor)
    .await?
    .map(Enrollment::from)
    .ok_or_else(|| AppError::NotFound(format!("Enrollment with id {} not found", enrollment_id)))
}

#[instrument(skip(pool))]
pub async fn list_enrollments(
    pool: &Pool<Sqlite>,
    filter: &EnrollmentFilter,
) -> Result<Vec<EnrollmentDetail>, AppError> {
    info!("Listing enrollments");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} WHERE 1=1",
        ENROLLMENT_DETAIL_SELECT
    ));

    if let Some(student_id) = filter.student_id {
        query.push(" AND e.student_id = ").push_bind(student_id);
    }
    if let Some(course_id) = filter.course_id {
        query.push(" AND e.course_id = ").push_bind(course_id);
    }
    if let Some(status) = filter.status {
        query.push(" AND e.status = ").push_bind(status);
    }
    if let Some(semester) = filter.semester {
        query.push(" AND e.semester = ").push_bind(semester);
    }
    if let Some(year) = filter.year {
        query.push(" AND e.year = ").push_bind(year);
    }
    query.push(" ORDER BY e.year DESC, e.semester DESC, s.name ASC, c.name ASC");

    let rows = query
        .build_query_as::<DbEnrollmentDetail>()
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(EnrollmentDetail::from).collect())
}

#[instrument(skip(executor))]
pub async fn get_enrollment_candidates<'e, E>(
    executor: E,
    student_id: i64,
    course_id: i64,
) -> Result<Vec<EnrollmentCandidate>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching enrollment candidates");
    #[derive(sqlx::FromRow)]
    struct CandidateRow {
        id: i64,
        semester: i64,
        year: i64,
    }

    let rows = sqlx::query_as::<_, CandidateRow>(
        "SELECT id, semester, year FROM enrollments
         WHERE student_id = ? AND course_id = ?
         ORDER BY year DESC, semester DESC",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EnrollmentCandidate {
            id: row.id,
            term: Term {
                year: row.year,
                semester: row.semester,
            },
        })
        .collect())
}

#[instrument(skip(executor))]
pub async fn update_enrollment_status<'e, E>(
    executor: E,
    enrollment_id: i64,
    status: EnrollmentStatus,
) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Updating enrollment status");
    let res = sqlx::query(
        "UPDATE enrollments SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status)
    .bind(enrollment_id)
    .execute(executor)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Enrollment with id {} not found",
            enrollment_id
        )));
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn delete_enrollment<'e, E>(executor: E, enrollment_id: i64) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Deleting enrollment");
    let res = sqlx::query("DELETE FROM enrollments WHERE id = ?")
        .bind(enrollment_id)
        .execute(executor)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Enrollment with id {} not found",
            enrollment_id
        )));
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn get_report_card_rows<'e, E>(
    executor: E,
    student_id: i64,
) -> Result<Vec<DbReportCardRow>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching report card rows");
    let rows = sqlx::query_as::<_, DbReportCardRow>(
        "SELECT e.id AS enrollment_id, e.student_id, e.course_id, e.semester, e.year, e.status,
                c.name AS course_name, c.code AS course_code, c.weekly_hours,
                c.semester AS course_semester, t.name AS teacher_name
         FROM enrollments e
         INNER JOIN courses c ON e.course_id = c.id
         LEFT JOIN teachers t ON c.teacher_id = t.id
         WHERE e.student_id = ?
         ORDER BY e.year DESC, e.semester DESC, c.name ASC",
    )
    .bind(student_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Grades

#[instrument(skip(conn))]
pub async fn insert_grade(
    conn: &mut SqliteConnection,
    enrollment_id: i64,
    grade: &NewGrade,
) -> Result<GradeEntry, AppError> {
    info!("Recording grade");
    let res = sqlx::query(
        "INSERT INTO grades
         (enrollment_id, assessment_type, score_hundredths, weight_hundredths,
          assessment_date, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(enrollment_id)
    .bind(&grade.assessment_type)
    .bind(to_hundredths(grade.score))
    .bind(to_hundredths(grade.effective_weight()))
    .bind(grade.assessment_date)
    .bind(&grade.notes)
    .execute(&mut *conn)
    .await?;

    get_grade(&mut *conn, res.last_insert_rowid()).await
}

#[instrument(skip(executor))]
pub async fn get_grade<'e, E>(executor: E, grade_id: i64) -> Result<GradeEntry, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching grade");
    let query = format!("SELECT {} FROM grades g WHERE g.id = ?", GRADE_COLUMNS);
    sqlx::query_as::<_, DbGradeEntry>(&query)
        .bind(grade_id)
        .fetch_optional(executor)
        .await?
        .map(GradeEntry::from)
        .ok_or_else(|| AppError::NotFound(format!("Grade with id {} not found", grade_id)))
}

/// Student who owns the enrollment a grade belongs to.
#[instrument(skip(executor))]
pub async fn get_grade_owner<'e, E>(executor: E, grade_id: i64) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        "SELECT e.student_id FROM grades g
         INNER JOIN enrollments e ON g.enrollment_id = e.id
         WHERE g.id = ?",
    )
    .bind(grade_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Grade with id {} not found", grade_id)))
}

/// Every grade of a student across enrollments, oldest assessment first.
#[instrument(skip(executor))]
pub async fn get_grades_for_student<'e, E>(
    executor: E,
    student_id: i64,
) -> Result<Vec<GradeEntry>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching grades for student");
    let query = format!(
        "SELECT {} FROM grades g
         INNER JOIN enrollments e ON g.enrollment_id = e.id
         WHERE e.student_id = ?
         ORDER BY g.assessment_date ASC, g.id ASC",
        GRADE_COLUMNS
    );
    let rows = sqlx::query_as::<_, DbGradeEntry>(&query)
        .bind(student_id)
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(GradeEntry::from).collect())
}

#[instrument(skip(pool))]
pub async fn list_grades(
    pool: &Pool<Sqlite>,
    filter: &GradeFilter,
) -> Result<Vec<GradeEntry>, AppError> {
    info!("Listing grades");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM grades g
         INNER JOIN enrollments e ON g.enrollment_id = e.id
         WHERE 1=1",
        GRADE_COLUMNS
    ));

    if let Some(enrollment_id) = filter.enrollment_id {
        query.push(" AND g.enrollment_id = ").push_bind(enrollment_id);
    }
    if let Some(student_id) = filter.student_id {
        query.push(" AND e.student_id = ").push_bind(student_id);
    }
    if let Some(course_id) = filter.course_id {
        query.push(" AND e.course_id = ").push_bind(course_id);
    }
    query.push(" ORDER BY g.assessment_date DESC, g.id DESC");

    let rows = query
        .build_query_as::<DbGradeEntry>()
        .fetch_all(pool)
        .await?;

    // No error when nothing matches
    Ok(rows.into_iter().map(GradeEntry::from).collect())
}

#[instrument(skip(conn))]
pub async fn apply_grade_update(
    conn: &mut SqliteConnection,
    grade_id: i64,
    update: &GradeUpdate,
) -> Result<(), AppError> {
    info!("Updating grade");
    if let Some(assessment_type) = &update.assessment_type {
        sqlx::query(
            "UPDATE grades SET assessment_type = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(assessment_type)
        .bind(grade_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(score) = update.score {
        sqlx::query(
            "UPDATE grades SET score_hundredths = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(to_hundredths(score))
        .bind(grade_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(weight) = update.weight {
        sqlx::query(
            "UPDATE grades SET weight_hundredths = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(to_hundredths(weight))
        .bind(grade_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(assessment_date) = update.assessment_date {
        sqlx::query(
            "UPDATE grades SET assessment_date = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(assessment_date)
        .bind(grade_id)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(notes) = &update.notes {
        sqlx::query("UPDATE grades SET notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(notes.as_deref())
            .bind(grade_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[instrument(skip(executor))]
pub async fn delete_grade<'e, E>(executor: E, grade_id: i64) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Deleting grade");
    let res = sqlx::query("DELETE FROM grades WHERE id = ?")
        .bind(grade_id)
        .execute(executor)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Grade with id {} not found",
            grade_id
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Announcements

#[instrument(skip(conn, announcement))]
pub async fn insert_announcement(
    conn: &mut SqliteConnection,
    author_account_id: i64,
    announcement: &NewAnnouncement,
) -> Result<Announcement, AppError> {
    info!("Publishing announcement");
    let res = sqlx::query(
        "INSERT INTO announcements
         (title, content, kind, author_account_id, course_id, event_date)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&announcement.title)
    .bind(&announcement.content)
    .bind(announcement.kind)
    .bind(author_account_id)
    .bind(announcement.course_id)
    .bind(announcement.event_date)
    .execute(&mut *conn)
    .await?;

    get_announcement(&mut *conn, res.last_insert_rowid()).await
}

#[instrument(skip(executor))]
pub async fn get_announcement<'e, E>(
    executor: E,
    announcement_id: i64,
) -> Result<Announcement, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let query = format!("SELECT {} WHERE n.id = ?", ANNOUNCEMENT_SELECT);
    sqlx::query_as::<_, DbAnnouncement>(&query)
        .bind(announcement_id)
        .fetch_optional(executor)
        .await?
        .map(Announcement::from)
        .ok_or_else(|| {
            AppError::NotFound(format!("Announcement with id {} not found", announcement_id))
        })
}

/// Active announcements, most recently published first.
#[instrument(skip(pool))]
pub async fn list_active_announcements(
    pool: &Pool<Sqlite>,
) -> Result<Vec<Announcement>, AppError> {
    info!("Listing announcements");
    let query = format!(
        "SELECT {} WHERE n.active = TRUE ORDER BY n.published_at DESC, n.id DESC",
        ANNOUNCEMENT_SELECT
    );
    let rows = sqlx::query_as::<_, DbAnnouncement>(&query)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Announcement::from).collect())
}

// ---------------------------------------------------------------------------
// Helpers

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// SQLite LIKE is case-insensitive for ASCII.
fn like_pattern(term: &str) -> String {
    format!("%{}%", term)
}
