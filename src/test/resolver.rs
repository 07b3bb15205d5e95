#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::grading::{EnrollmentCandidate, pick_latest, resolve_enrollment};
    use crate::models::{EnrollmentRef, Term};
    use crate::test::utils::test_db::TestDbBuilder;

    fn candidate(id: i64, year: i64, semester: i64) -> EnrollmentCandidate {
        EnrollmentCandidate {
            id,
            term: Term { year, semester },
        }
    }

    #[test]
    fn test_pick_latest_prefers_year_then_semester() {
        let candidates = [
            candidate(1, 2023, 2),
            candidate(2, 2024, 1),
            candidate(3, 2022, 2),
        ];
        assert_eq!(pick_latest(&candidates).expect("Expected a pick"), 2);

        let candidates = [candidate(4, 2024, 1), candidate(5, 2024, 2)];
        assert_eq!(pick_latest(&candidates).expect("Expected a pick"), 5);
    }

    #[test]
    fn test_pick_latest_with_no_candidates() {
        assert!(matches!(pick_latest(&[]), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_pick_latest_refuses_to_guess_on_tie() {
        let candidates = [
            candidate(7, 2024, 1),
            candidate(8, 2023, 2),
            candidate(9, 2024, 1),
        ];

        match pick_latest(&candidates) {
            Err(AppError::Conflict(message)) => {
                assert!(message.contains('7') && message.contains('9'), "{}", message);
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_by_pair_uses_latest_term() {
        let test_db = TestDbBuilder::new()
            .student("ana@school.test", "Ana Souza", "2024001")
            .course("MAT101", "Mathematics", None)
            .enrollment("first-try", "ana@school.test", "MAT101", 2023, 2)
            .enrollment("retake", "ana@school.test", "MAT101", 2024, 1)
            .build()
            .await
            .expect("Failed to build test database");

        let mut conn = test_db
            .pool
            .acquire()
            .await
            .expect("Failed to acquire connection");

        let resolved = resolve_enrollment(
            &mut conn,
            &EnrollmentRef::ByStudentCourse {
                student_id: test_db.student_id("ana@school.test"),
                course_id: test_db.course_id("MAT101"),
            },
        )
        .await
        .expect("Failed to resolve enrollment");

        assert_eq!(resolved, test_db.enrollment_id("retake"));

        let missing = resolve_enrollment(
            &mut conn,
            &EnrollmentRef::ById {
                enrollment_id: 9999,
            },
        )
        .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_enrollment_ref_accepts_either_json_shape() {
        let by_id: EnrollmentRef =
            serde_json::from_str(r#"{"enrollment_id": 12}"#).expect("Failed to parse by id");
        assert_eq!(by_id, EnrollmentRef::ById { enrollment_id: 12 });

        let by_pair: EnrollmentRef = serde_json::from_str(r#"{"student_id": 3, "course_id": 4}"#)
            .expect("Failed to parse by pair");
        assert_eq!(
            by_pair,
            EnrollmentRef::ByStudentCourse {
                student_id: 3,
                course_id: 4
            }
        );
    }
}
