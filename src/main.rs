use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use scholar::Scholar;
use scholar::env::{Config, load_environment};
use scholar::error::AppError;
use scholar::models::{
    AnnouncementKind, EnrollmentFilter, EnrollmentRef, GradeFilter, GradeUpdate, NewAnnouncement,
    NewGrade,
};
use scholar::telemetry::init_tracing;
use scholar::validation::ErrorResponse;

#[derive(Parser)]
#[command(name = "scholar")]
#[command(about = "Grade book and report cards for a school", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the bundled schema migrations
    Migrate,
    /// Create an admin account on an empty database
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password_hash: String,
    },
    /// Print a student's report card
    ReportCard {
        /// Account id of the caller
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        student: Option<i64>,
    },
    /// Record a grade against an enrollment, or a student's latest enrollment in a course
    #[command(group(
        ArgGroup::new("target")
            .args(["enrollment", "student"])
            .required(true)
            .multiple(false)
    ))]
    RecordGrade {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        enrollment: Option<i64>,
        #[arg(long, requires = "course")]
        student: Option<i64>,
        #[arg(long, requires = "student")]
        course: Option<i64>,
        #[arg(long)]
        assessment_type: String,
        #[arg(long)]
        score: f64,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change fields of an existing grade
    UpdateGrade {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        grade: i64,
        #[arg(long)]
        assessment_type: Option<String>,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
    },
    /// Remove a grade
    DeleteGrade {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        grade: i64,
    },
    /// List grades visible to the caller
    Grades {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        enrollment: Option<i64>,
        #[arg(long)]
        student: Option<i64>,
        #[arg(long)]
        course: Option<i64>,
    },
    /// List enrollments with student and course details
    Enrollments {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        student: Option<i64>,
        #[arg(long)]
        course: Option<i64>,
        #[arg(long)]
        year: Option<i64>,
        #[arg(long)]
        semester: Option<i64>,
    },
    /// List active announcements
    Announcements {
        #[arg(long = "as")]
        as_account: i64,
    },
    /// Publish an announcement
    Announce {
        #[arg(long = "as")]
        as_account: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// institutional, reminder, notice or exam
        #[arg(long)]
        kind: String,
        #[arg(long)]
        course: Option<i64>,
        #[arg(long)]
        event_date: Option<NaiveDate>,
    },
}

#[derive(Serialize)]
struct Done {
    ok: bool,
}

fn render<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn run(scholar: &Scholar, command: Commands) -> Result<String, AppError> {
    match command {
        Commands::Migrate => render(&Done { ok: true }),
        Commands::CreateAdmin {
            email,
            password_hash,
        } => render(&scholar.bootstrap_admin(&email, &password_hash).await?),
        Commands::ReportCard {
            as_account,
            student,
        } => {
            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.compute_report_card(&caller, student).await?)
        }
        Commands::RecordGrade {
            as_account,
            enrollment,
            student,
            course,
            assessment_type,
            score,
            weight,
            date,
            notes,
        } => {
            let reference = match (enrollment, student, course) {
                (Some(enrollment_id), _, _) => EnrollmentRef::ById { enrollment_id },
                (None, Some(student_id), Some(course_id)) => EnrollmentRef::ByStudentCourse {
                    student_id,
                    course_id,
                },
                _ => {
                    return Err(AppError::Validation(
                        "either --enrollment or both --student and --course are required"
                            .to_string(),
                    ));
                }
            };
            let grade = NewGrade {
                assessment_type,
                score,
                weight,
                assessment_date: date,
                notes,
            };

            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.record_grade(&caller, reference, grade).await?)
        }
        Commands::UpdateGrade {
            as_account,
            grade,
            assessment_type,
            score,
            weight,
            date,
            notes,
            clear_notes,
        } => {
            let update = GradeUpdate {
                assessment_type,
                score,
                weight,
                assessment_date: date,
                notes: if clear_notes { Some(None) } else { notes.map(Some) },
            };

            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.update_grade(&caller, grade, update).await?)
        }
        Commands::DeleteGrade { as_account, grade } => {
            let caller = scholar.load_caller(as_account).await?;
            scholar.delete_grade(&caller, grade).await?;
            render(&Done { ok: true })
        }
        Commands::Grades {
            as_account,
            enrollment,
            student,
            course,
        } => {
            let filter = GradeFilter {
                enrollment_id: enrollment,
                student_id: student,
                course_id: course,
            };

            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.list_grades(&caller, filter).await?)
        }
        Commands::Enrollments {
            as_account,
            student,
            course,
            year,
            semester,
        } => {
            let filter = EnrollmentFilter {
                student_id: student,
                course_id: course,
                year,
                semester,
                ..Default::default()
            };

            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.list_enrollments(&caller, filter).await?)
        }
        Commands::Announcements { as_account } => {
            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.list_announcements(&caller).await?)
        }
        Commands::Announce {
            as_account,
            title,
            content,
            kind,
            course,
            event_date,
        } => {
            let announcement = NewAnnouncement {
                title,
                content,
                kind: kind.parse::<AnnouncementKind>()?,
                course_id: course,
                event_date,
            };

            let caller = scholar.load_caller(as_account).await?;
            render(&scholar.create_announcement(&caller, announcement).await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_environment()?;
    let config = Config::from_env()?;
    let guard = init_tracing(&config)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to SQLite database")?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to apply migrations")?;
    info!("Migrations completed successfully");

    let scholar = Scholar::new(pool);
    match run(&scholar, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(err) => {
            err.log_and_record("scholar cli");
            let response = ErrorResponse::from(&err);
            eprintln!("{}", serde_json::to_string_pretty(&response)?);

            scholar.pool().close().await;
            drop(guard);
            std::process::exit(1);
        }
    }
}
