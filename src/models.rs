use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::grading::Situation;

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

// Distinguishes an absent field (outer None) from an explicit null (Some(None)).
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Academic period. Field order makes the derived ordering (year, semester).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub year: i64,
    pub semester: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    InProgress,
    Passed,
    Failed,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub id: i64,
    pub enrollment_id: i64,
    pub assessment_type: String,
    pub score: f64,
    pub weight: f64,
    pub assessment_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored form of a score or weight: whole hundredths.
pub fn to_hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub fn from_hundredths(value: i64) -> f64 {
    value as f64 / 100.0
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbGradeEntry {
    pub id: i64,
    pub enrollment_id: i64,
    pub assessment_type: String,
    pub score_hundredths: i64,
    pub weight_hundredths: i64,
    pub assessment_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<DbGradeEntry> for GradeEntry {
    fn from(db: DbGradeEntry) -> Self {
        Self {
            id: db.id,
            enrollment_id: db.enrollment_id,
            assessment_type: db.assessment_type,
            score: from_hundredths(db.score_hundredths),
            weight: from_hundredths(db.weight_hundredths),
            assessment_date: db.assessment_date,
            notes: db.notes,
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub term: Term,
    pub status: EnrollmentStatus,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbEnrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub semester: i64,
    pub year: i64,
    pub status: EnrollmentStatus,
}

impl From<DbEnrollment> for Enrollment {
    fn from(db: DbEnrollment) -> Self {
        Self {
            id: db.id,
            student_id: db.student_id,
            course_id: db.course_id,
            term: Term {
                year: db.year,
                semester: db.semester,
            },
            status: db.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub weekly_hours: i64,
    pub semester: Option<i64>,
    pub teacher_id: Option<i64>,
    pub description: Option<String>,
    pub active: bool,
}

/// Course details shown on a report-card line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub weekly_hours: i64,
    pub semester: Option<i64>,
    pub teacher_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentSnapshot {
    pub student_id: i64,
    pub name: String,
    pub student_number: String,
    pub course_of_study: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCardLine {
    pub enrollment: Enrollment,
    pub course: CourseSummary,
    pub grades: Vec<GradeEntry>,
    pub final_average: f64,
    pub situation: Situation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCard {
    pub student: StudentSnapshot,
    pub lines: Vec<ReportCardLine>,
}

/// Joined enrollment + course row the report card is built from.
#[derive(sqlx::FromRow, Clone)]
pub struct DbReportCardRow {
    pub enrollment_id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub semester: i64,
    pub year: i64,
    pub status: EnrollmentStatus,
    pub course_name: String,
    pub course_code: String,
    pub weekly_hours: i64,
    pub course_semester: Option<i64>,
    pub teacher_name: Option<String>,
}

impl DbReportCardRow {
    pub fn split(self) -> (Enrollment, CourseSummary) {
        let enrollment = Enrollment {
            id: self.enrollment_id,
            student_id: self.student_id,
            course_id: self.course_id,
            term: Term {
                year: self.year,
                semester: self.semester,
            },
            status: self.status,
        };
        let course = CourseSummary {
            id: self.course_id,
            name: self.course_name,
            code: self.course_code,
            weekly_hours: self.weekly_hours,
            semester: self.course_semester,
            teacher_name: self.teacher_name,
        };
        (enrollment, course)
    }
}

/// Enrollment listing row: the enrollment plus who and what it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentDetail {
    pub enrollment: Enrollment,
    pub student_name: String,
    pub student_number: String,
    pub course: CourseSummary,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbEnrollmentDetail {
    #[sqlx(flatten)]
    pub line: DbReportCardRow,
    pub student_name: String,
    pub student_number: String,
}

impl From<DbEnrollmentDetail> for EnrollmentDetail {
    fn from(db: DbEnrollmentDetail) -> Self {
        let (enrollment, course) = db.line.split();
        Self {
            enrollment,
            student_name: db.student_name,
            student_number: db.student_number,
            course,
        }
    }
}

/// Student profile with its login email and account state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentProfile {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub student_number: String,
    pub course_of_study: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeacherProfile {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub title: String,
    pub years_teaching: Option<i64>,
    pub specialization: Option<String>,
    pub email: String,
    pub active: bool,
}

/// How a new grade finds its enrollment: directly, or by the latest
/// enrollment of a student in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnrollmentRef {
    ById { enrollment_id: i64 },
    ByStudentCourse { student_id: i64, course_id: i64 },
}

pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewGrade {
    #[validate(length(min = 1, message = "assessment type is required"))]
    pub assessment_type: String,
    #[validate(range(min = 0.0, max = 10.0, message = "score must be between 0 and 10"))]
    pub score: f64,
    #[validate(range(
        exclusive_min = 0.0,
        max = 99.99,
        message = "weight must be greater than 0 and at most 99.99"
    ))]
    pub weight: Option<f64>,
    pub assessment_date: NaiveDate,
    pub notes: Option<String>,
}

impl NewGrade {
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(DEFAULT_WEIGHT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct GradeUpdate {
    #[validate(length(min = 1, message = "assessment type is required"))]
    pub assessment_type: Option<String>,
    #[validate(range(min = 0.0, max = 10.0, message = "score must be between 0 and 10"))]
    pub score: Option<f64>,
    #[validate(range(
        exclusive_min = 0.0,
        max = 99.99,
        message = "weight must be greater than 0 and at most 99.99"
    ))]
    pub weight: Option<f64>,
    pub assessment_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
}

impl GradeUpdate {
    pub fn is_empty(&self) -> bool {
        self.assessment_type.is_none()
            && self.score.is_none()
            && self.weight.is_none()
            && self.assessment_date.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeFilter {
    pub enrollment_id: Option<i64>,
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewStudent {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password hash is required"))]
    pub password_hash: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "student number is required"))]
    pub student_number: String,
    #[validate(length(min = 1, message = "course of study is required"))]
    pub course_of_study: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct StudentUpdate {
    #[validate(email(message = "a valid email is required"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "password hash is required"))]
    pub password_hash: Option<String>,
    pub active: Option<bool>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "student number is required"))]
    pub student_number: Option<String>,
    #[validate(length(min = 1, message = "course of study is required"))]
    pub course_of_study: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub address: Option<Option<String>>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.active.is_none()
            && self.name.is_none()
            && self.student_number.is_none()
            && self.course_of_study.is_none()
            && self.birth_date.is_none()
            && self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewTeacher {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password hash is required"))]
    pub password_hash: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[validate(range(min = 0, message = "years teaching cannot be negative"))]
    pub years_teaching: Option<i64>,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct TeacherUpdate {
    #[validate(email(message = "a valid email is required"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "password hash is required"))]
    pub password_hash: Option<String>,
    pub active: Option<bool>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub years_teaching: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub specialization: Option<Option<String>>,
}

impl TeacherUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.active.is_none()
            && self.name.is_none()
            && self.title.is_none()
            && self.years_teaching.is_none()
            && self.specialization.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewCourse {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
    #[validate(range(min = 1, message = "weekly hours must be positive"))]
    pub weekly_hours: i64,
    #[validate(range(min = 1, max = 2, message = "semester must be 1 or 2"))]
    pub semester: Option<i64>,
    pub teacher_id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct CourseUpdate {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "code is required"))]
    pub code: Option<String>,
    #[validate(range(min = 1, message = "weekly hours must be positive"))]
    pub weekly_hours: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub semester: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub teacher_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub active: Option<bool>,
}

impl CourseUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.code.is_none()
            && self.weekly_hours.is_none()
            && self.semester.is_none()
            && self.teacher_id.is_none()
            && self.description.is_none()
            && self.active.is_none()
    }
}

/// Case-insensitive substring filters for student listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentFilter {
    /// Matches name, student number or email.
    pub search: Option<String>,
    pub course_of_study: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherFilter {
    /// Matches name or email.
    pub search: Option<String>,
    pub title: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseFilter {
    /// Matches name or code.
    pub search: Option<String>,
    pub teacher_id: Option<i64>,
    pub semester: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentFilter {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub status: Option<EnrollmentStatus>,
    pub semester: Option<i64>,
    pub year: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewEnrollment {
    pub student_id: i64,
    pub course_id: i64,
    #[validate(range(min = 1, max = 2, message = "semester must be 1 or 2"))]
    pub semester: i64,
    #[validate(range(min = 1, message = "year must be positive"))]
    pub year: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AnnouncementKind {
    Institutional,
    Reminder,
    Notice,
    Exam,
}

impl AnnouncementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementKind::Institutional => "institutional",
            AnnouncementKind::Reminder => "reminder",
            AnnouncementKind::Notice => "notice",
            AnnouncementKind::Exam => "exam",
        }
    }
}

impl FromStr for AnnouncementKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "institutional" => Ok(AnnouncementKind::Institutional),
            "reminder" => Ok(AnnouncementKind::Reminder),
            "notice" => Ok(AnnouncementKind::Notice),
            "exam" => Ok(AnnouncementKind::Exam),
            _ => Err(AppError::Validation(format!(
                "kind: must be one of institutional, reminder, notice, exam (got '{}')",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub kind: AnnouncementKind,
    /// "Administration" for admins, the teacher's name for teachers,
    /// "System" when the author is gone.
    pub author_name: String,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub event_date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAnnouncement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub kind: AnnouncementKind,
    pub author_name: String,
    pub course_id: Option<i64>,
    pub course_name: Option<String>,
    pub published_at: NaiveDateTime,
    pub event_date: Option<NaiveDate>,
}

impl From<DbAnnouncement> for Announcement {
    fn from(db: DbAnnouncement) -> Self {
        Self {
            id: db.id,
            title: db.title,
            content: db.content,
            kind: db.kind,
            author_name: db.author_name,
            course_id: db.course_id,
            course_name: db.course_name,
            published_at: to_utc(db.published_at),
            event_date: db.event_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct NewAnnouncement {
    #[validate(length(min = 1, max = 255, message = "title must be 1 to 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
    pub kind: AnnouncementKind,
    pub course_id: Option<i64>,
    pub event_date: Option<NaiveDate>,
}
