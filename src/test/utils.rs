#[cfg(test)]
pub mod test_db {
    use crate::api::Scholar;
    use crate::auth::{Caller, Role};
    use crate::db::{
        insert_account, insert_course, insert_enrollment, insert_grade, insert_student,
        insert_teacher,
    };
    use crate::error::AppError;
    use crate::models::{NewCourse, NewEnrollment, NewGrade, NewStudent, NewTeacher};
    use chrono::NaiveDate;
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    static STANDARD_PASSWORD_HASH: &str = "$2b$12$standardtesthash";

    #[derive(Default)]
    pub struct TestDbBuilder {
        admins: Vec<String>,
        teachers: Vec<TestTeacher>,
        students: Vec<TestStudent>,
        courses: Vec<TestCourse>,
        enrollments: Vec<TestEnrollment>,
        grades: Vec<TestGrade>,
    }

    pub struct TestTeacher {
        pub email: String,
        pub name: String,
    }

    pub struct TestStudent {
        pub email: String,
        pub name: String,
        pub student_number: String,
    }

    pub struct TestCourse {
        pub code: String,
        pub name: String,
        pub teacher_email: Option<String>,
    }

    pub struct TestEnrollment {
        pub label: String,
        pub student_email: String,
        pub course_code: String,
        pub year: i64,
        pub semester: i64,
    }

    pub struct TestGrade {
        pub enrollment_label: String,
        pub assessment_type: String,
        pub score: f64,
        pub weight: f64,
        pub assessment_date: NaiveDate,
    }

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("Invalid test date")
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, email: &str) -> Self {
            self.admins.push(email.to_string());
            self
        }

        pub fn teacher(mut self, email: &str, name: &str) -> Self {
            self.teachers.push(TestTeacher {
                email: email.to_string(),
                name: name.to_string(),
            });
            self
        }

        pub fn student(mut self, email: &str, name: &str, student_number: &str) -> Self {
            self.students.push(TestStudent {
                email: email.to_string(),
                name: name.to_string(),
                student_number: student_number.to_string(),
            });
            self
        }

        pub fn course(mut self, code: &str, name: &str, teacher_email: Option<&str>) -> Self {
            self.courses.push(TestCourse {
                code: code.to_string(),
                name: name.to_string(),
                teacher_email: teacher_email.map(String::from),
            });
            self
        }

        pub fn enrollment(
            mut self,
            label: &str,
            student_email: &str,
            course_code: &str,
            year: i64,
            semester: i64,
        ) -> Self {
            self.enrollments.push(TestEnrollment {
                label: label.to_string(),
                student_email: student_email.to_string(),
                course_code: course_code.to_string(),
                year,
                semester,
            });
            self
        }

        pub fn grade(
            mut self,
            enrollment_label: &str,
            assessment_type: &str,
            score: f64,
            weight: f64,
            assessment_date: NaiveDate,
        ) -> Self {
            self.grades.push(TestGrade {
                enrollment_label: enrollment_label.to_string(),
                assessment_type: assessment_type.to_string(),
                score,
                weight,
                assessment_date,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            // One connection so every query sees the same in-memory database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut account_id_map: HashMap<String, i64> = HashMap::new();
            let mut student_id_map: HashMap<String, i64> = HashMap::new();
            let mut teacher_id_map: HashMap<String, i64> = HashMap::new();
            let mut course_id_map: HashMap<String, i64> = HashMap::new();
            let mut enrollment_id_map: HashMap<String, i64> = HashMap::new();

            {
                let mut conn = pool.acquire().await?;

                for email in &self.admins {
                    let account_id =
                        insert_account(&mut conn, email, STANDARD_PASSWORD_HASH, Role::Admin)
                            .await?;
                    account_id_map.insert(email.clone(), account_id);
                }

                for teacher in &self.teachers {
                    let account_id = insert_account(
                        &mut conn,
                        &teacher.email,
                        STANDARD_PASSWORD_HASH,
                        Role::Teacher,
                    )
                    .await?;
                    let profile = NewTeacher {
                        email: teacher.email.clone(),
                        password_hash: STANDARD_PASSWORD_HASH.to_string(),
                        name: teacher.name.clone(),
                        title: "Professor".to_string(),
                        years_teaching: None,
                        specialization: None,
                    };
                    let teacher_id = insert_teacher(&mut conn, account_id, &profile).await?;

                    account_id_map.insert(teacher.email.clone(), account_id);
                    teacher_id_map.insert(teacher.email.clone(), teacher_id);
                }

                for student in &self.students {
                    let account_id = insert_account(
                        &mut conn,
                        &student.email,
                        STANDARD_PASSWORD_HASH,
                        Role::Student,
                    )
                    .await?;
                    let profile = NewStudent {
                        email: student.email.clone(),
                        password_hash: STANDARD_PASSWORD_HASH.to_string(),
                        name: student.name.clone(),
                        student_number: student.student_number.clone(),
                        course_of_study: "Computer Science".to_string(),
                        birth_date: None,
                        address: None,
                    };
                    let student_id = insert_student(&mut conn, account_id, &profile).await?;

                    account_id_map.insert(student.email.clone(), account_id);
                    student_id_map.insert(student.email.clone(), student_id);
                }

                for course in &self.courses {
                    let teacher_id = course
                        .teacher_email
                        .as_ref()
                        .and_then(|email| teacher_id_map.get(email).copied());
                    let new_course = NewCourse {
                        name: course.name.clone(),
                        code: course.code.clone(),
                        weekly_hours: 4,
                        semester: None,
                        teacher_id,
                        description: None,
                    };
                    let course_id = insert_course(&mut conn, &new_course).await?;
                    course_id_map.insert(course.code.clone(), course_id);
                }

                for enrollment in &self.enrollments {
                    let student_id = student_id_map
                        .get(&enrollment.student_email)
                        .copied()
                        .ok_or_else(|| {
                            AppError::NotFound(format!(
                                "Unknown test student {}",
                                enrollment.student_email
                            ))
                        })?;
                    let course_id = course_id_map
                        .get(&enrollment.course_code)
                        .copied()
                        .ok_or_else(|| {
                            AppError::NotFound(format!(
                                "Unknown test course {}",
                                enrollment.course_code
                            ))
                        })?;
                    let new_enrollment = NewEnrollment {
                        student_id,
                        course_id,
                        semester: enrollment.semester,
                        year: enrollment.year,
                    };
                    let enrollment_id = insert_enrollment(&mut conn, &new_enrollment).await?;
                    enrollment_id_map.insert(enrollment.label.clone(), enrollment_id);
                }

                for grade in &self.grades {
                    let enrollment_id = enrollment_id_map
                        .get(&grade.enrollment_label)
                        .copied()
                        .ok_or_else(|| {
                            AppError::NotFound(format!(
                                "Unknown test enrollment {}",
                                grade.enrollment_label
                            ))
                        })?;
                    let new_grade = NewGrade {
                        assessment_type: grade.assessment_type.clone(),
                        score: grade.score,
                        weight: Some(grade.weight),
                        assessment_date: grade.assessment_date,
                        notes: None,
                    };
                    insert_grade(&mut conn, enrollment_id, &new_grade).await?;
                }
            }

            Ok(TestDb {
                scholar: Scholar::new(pool.clone()),
                pool,
                account_id_map,
                student_id_map,
                teacher_id_map,
                course_id_map,
                enrollment_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub scholar: Scholar,
        pub account_id_map: HashMap<String, i64>,
        pub student_id_map: HashMap<String, i64>,
        pub teacher_id_map: HashMap<String, i64>,
        pub course_id_map: HashMap<String, i64>,
        pub enrollment_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn account_id(&self, email: &str) -> i64 {
            self.account_id_map[email]
        }

        pub fn student_id(&self, email: &str) -> i64 {
            self.student_id_map[email]
        }

        pub fn teacher_id(&self, email: &str) -> i64 {
            self.teacher_id_map[email]
        }

        pub fn course_id(&self, code: &str) -> i64 {
            self.course_id_map[code]
        }

        pub fn enrollment_id(&self, label: &str) -> i64 {
            self.enrollment_id_map[label]
        }

        pub async fn caller(&self, email: &str) -> Caller {
            self.scholar
                .load_caller(self.account_id(email))
                .await
                .expect("Failed to load caller")
        }

        pub async fn grade_count(&self) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM grades")
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count grades")
        }
    }

    /// Two students, one teacher, one admin and a pair of courses. The first
    /// student has scenario-style grades in Mathematics and none in History.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin@school.test")
            .teacher("teacher@school.test", "Marta Lima")
            .student("ana@school.test", "Ana Souza", "2024001")
            .student("bruno@school.test", "Bruno Alves", "2024002")
            .course("MAT101", "Mathematics", Some("teacher@school.test"))
            .course("HIS101", "History", None)
            .enrollment("ana-mat", "ana@school.test", "MAT101", 2024, 1)
            .enrollment("ana-his", "ana@school.test", "HIS101", 2024, 1)
            .enrollment("bruno-mat", "bruno@school.test", "MAT101", 2024, 1)
            .grade("ana-mat", "Exam", 8.0, 3.0, date(2024, 4, 10))
            .grade("ana-mat", "Quiz", 6.0, 1.0, date(2024, 3, 5))
            .grade("bruno-mat", "Exam", 4.0, 1.0, date(2024, 4, 10))
            .grade("bruno-mat", "Quiz", 4.5, 1.0, date(2024, 3, 5))
            .build()
            .await
            .expect("Failed to build standard test database")
    }
}
