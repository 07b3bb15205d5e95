#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::grading::Situation;
    use crate::models::{EnrollmentRef, NewGrade};
    use crate::test::utils::test_db::{TestDbBuilder, create_standard_test_db, date};

    #[tokio::test]
    async fn test_weighted_scenario_is_approved() {
        let test_db = create_standard_test_db().await;
        let ana = test_db.caller("ana@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute report card");

        assert_eq!(report_card.student.name, "Ana Souza");
        assert_eq!(report_card.student.email, "ana@school.test");

        let math = report_card
            .lines
            .iter()
            .find(|line| line.course.code == "MAT101")
            .expect("Mathematics line missing");

        assert_eq!(math.final_average, 7.5);
        assert_eq!(math.situation, Situation::Approved);
        assert_eq!(
            math.course.teacher_name.as_deref(),
            Some("Marta Lima"),
            "Teacher name should be carried on the course summary"
        );
    }

    #[tokio::test]
    async fn test_equal_weight_scenario_fails() {
        let test_db = create_standard_test_db().await;
        let teacher = test_db.caller("teacher@school.test").await;
        let bruno_id = test_db.student_id("bruno@school.test");

        let report_card = test_db
            .scholar
            .compute_report_card(&teacher, Some(bruno_id))
            .await
            .expect("Failed to compute report card");

        assert_eq!(report_card.lines.len(), 1);
        assert_eq!(report_card.lines[0].final_average, 4.25);
        assert_eq!(report_card.lines[0].situation, Situation::Failed);
    }

    #[tokio::test]
    async fn test_enrollment_without_grades_shows_zero() {
        let test_db = create_standard_test_db().await;
        let ana = test_db.caller("ana@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute report card");

        let history = report_card
            .lines
            .iter()
            .find(|line| line.course.code == "HIS101")
            .expect("History line missing");

        assert!(history.grades.is_empty());
        assert_eq!(history.final_average, 0.0);
        assert_eq!(history.situation, Situation::Failed);
        assert_eq!(history.course.teacher_name, None);
    }

    #[tokio::test]
    async fn test_grades_ordered_by_assessment_date() {
        let test_db = create_standard_test_db().await;
        let ana = test_db.caller("ana@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute report card");

        let math = report_card
            .lines
            .iter()
            .find(|line| line.course.code == "MAT101")
            .expect("Mathematics line missing");

        let types: Vec<&str> = math
            .grades
            .iter()
            .map(|g| g.assessment_type.as_str())
            .collect();
        assert_eq!(types, vec!["Quiz", "Exam"], "Earliest assessment first");
    }

    #[tokio::test]
    async fn test_lines_ordered_newest_term_then_course_name() {
        let test_db = TestDbBuilder::new()
            .student("carla@school.test", "Carla Dias", "2023001")
            .course("PHY201", "Physics", None)
            .course("BIO201", "Biology", None)
            .course("CHE101", "Chemistry", None)
            .enrollment("old", "carla@school.test", "CHE101", 2023, 2)
            .enrollment("phy", "carla@school.test", "PHY201", 2024, 1)
            .enrollment("bio", "carla@school.test", "BIO201", 2024, 1)
            .enrollment("older", "carla@school.test", "PHY201", 2023, 1)
            .build()
            .await
            .expect("Failed to build test database");
        let carla = test_db.caller("carla@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&carla, None)
            .await
            .expect("Failed to compute report card");

        let order: Vec<(i64, i64, &str)> = report_card
            .lines
            .iter()
            .map(|line| {
                (
                    line.enrollment.term.year,
                    line.enrollment.term.semester,
                    line.course.name.as_str(),
                )
            })
            .collect();

        assert_eq!(
            order,
            vec![
                (2024, 1, "Biology"),
                (2024, 1, "Physics"),
                (2023, 2, "Chemistry"),
                (2023, 1, "Physics"),
            ]
        );
    }

    #[tokio::test]
    async fn test_report_card_is_stable_without_writes() {
        let test_db = create_standard_test_db().await;
        let ana = test_db.caller("ana@school.test").await;

        let first = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute first report card");
        let second = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute second report card");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_assemblies_agree() {
        let test_db = create_standard_test_db().await;
        let ana = test_db.caller("ana@school.test").await;
        let admin = test_db.caller("admin@school.test").await;
        let ana_id = test_db.student_id("ana@school.test");

        let (own, staff) = tokio::join!(
            test_db.scholar.compute_report_card(&ana, None),
            test_db.scholar.compute_report_card(&admin, Some(ana_id)),
        );

        assert_eq!(
            own.expect("Student view failed"),
            staff.expect("Admin view failed")
        );
    }

    #[tokio::test]
    async fn test_recorded_grade_appears_on_report_card() {
        let test_db = create_standard_test_db().await;
        let teacher = test_db.caller("teacher@school.test").await;
        let ana = test_db.caller("ana@school.test").await;

        let entry = test_db
            .scholar
            .record_grade(
                &teacher,
                EnrollmentRef::ById {
                    enrollment_id: test_db.enrollment_id("ana-his"),
                },
                NewGrade {
                    assessment_type: "Essay".to_string(),
                    score: 9.0,
                    weight: None,
                    assessment_date: date(2024, 5, 2),
                    notes: Some("Well argued".to_string()),
                },
            )
            .await
            .expect("Failed to record grade");

        let report_card = test_db
            .scholar
            .compute_report_card(&ana, None)
            .await
            .expect("Failed to compute report card");

        let history = report_card
            .lines
            .iter()
            .find(|line| line.course.code == "HIS101")
            .expect("History line missing");

        assert_eq!(history.grades, vec![entry]);
        assert_eq!(history.final_average, 9.0);
        assert_eq!(history.situation, Situation::Approved);
    }

    #[tokio::test]
    async fn test_unknown_student_is_not_found() {
        let test_db = create_standard_test_db().await;
        let admin = test_db.caller("admin@school.test").await;

        let result = test_db.scholar.compute_report_card(&admin, Some(9999)).await;

        assert!(
            matches!(result, Err(AppError::NotFound(_))),
            "Expected NotFound, got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_staff_must_name_a_student() {
        let test_db = create_standard_test_db().await;
        let teacher = test_db.caller("teacher@school.test").await;

        let result = test_db.scholar.compute_report_card(&teacher, None).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_grades_stay_on_their_own_line() {
        let test_db = TestDbBuilder::new()
            .student("carla@school.test", "Carla Dias", "2023001")
            .student("davi@school.test", "Davi Reis", "2023002")
            .course("PHY201", "Physics", None)
            .course("BIO201", "Biology", None)
            .enrollment("phy", "carla@school.test", "PHY201", 2024, 1)
            .enrollment("bio", "carla@school.test", "BIO201", 2024, 1)
            .enrollment("davi-phy", "davi@school.test", "PHY201", 2024, 1)
            .grade("phy", "Lab", 9.0, 1.0, date(2024, 5, 2))
            .grade("bio", "Exam", 5.5, 2.0, date(2024, 4, 1))
            .grade("phy", "Quiz", 7.0, 1.0, date(2024, 3, 15))
            .grade("davi-phy", "Exam", 1.0, 1.0, date(2024, 3, 1))
            .grade("bio", "Quiz", 8.0, 1.0, date(2024, 5, 20))
            .build()
            .await
            .expect("Failed to build test database");
        let carla = test_db.caller("carla@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&carla, None)
            .await
            .expect("Failed to compute report card");
        assert_eq!(report_card.lines.len(), 2);

        let biology = &report_card.lines[0];
        assert_eq!(biology.course.code, "BIO201");
        let types: Vec<&str> = biology
            .grades
            .iter()
            .map(|g| g.assessment_type.as_str())
            .collect();
        assert_eq!(types, vec!["Exam", "Quiz"]);
        assert!(biology.grades.iter().all(|g| g.enrollment_id == test_db.enrollment_id("bio")));
        // (5.5 * 2 + 8.0) / 3 = 6.333...
        assert_eq!(biology.final_average, 6.33);

        let physics = &report_card.lines[1];
        let types: Vec<&str> = physics
            .grades
            .iter()
            .map(|g| g.assessment_type.as_str())
            .collect();
        assert_eq!(types, vec!["Quiz", "Lab"], "Other students' grades must not leak in");
        assert_eq!(physics.final_average, 8.0);
    }

    #[tokio::test]
    async fn test_half_hundredth_average_rounds_up_to_approval() {
        let test_db = TestDbBuilder::new()
            .student("carla@school.test", "Carla Dias", "2023001")
            .course("PHY201", "Physics", None)
            .course("BIO201", "Biology", None)
            .enrollment("phy", "carla@school.test", "PHY201", 2024, 1)
            .enrollment("bio", "carla@school.test", "BIO201", 2024, 1)
            .grade("phy", "Exam", 5.04, 1.0, date(2024, 4, 1))
            .grade("phy", "Quiz", 8.95, 1.0, date(2024, 5, 1))
            .grade("bio", "Exam", 0.04, 1.0, date(2024, 4, 1))
            .grade("bio", "Quiz", 9.95, 1.0, date(2024, 5, 1))
            .build()
            .await
            .expect("Failed to build test database");
        let carla = test_db.caller("carla@school.test").await;

        let report_card = test_db
            .scholar
            .compute_report_card(&carla, None)
            .await
            .expect("Failed to compute report card");

        let biology = &report_card.lines[0];
        assert_eq!(biology.final_average, 5.0);
        assert_eq!(biology.situation, Situation::Recovery);

        let physics = &report_card.lines[1];
        assert_eq!(physics.final_average, 7.0);
        assert_eq!(physics.situation, Situation::Approved);
    }
}
