use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::GradeEntry;

pub const APPROVAL_THRESHOLD: f64 = 7.0;
pub const RECOVERY_THRESHOLD: f64 = 5.0;

/// Pass/recovery/fail label derived from a rounded final average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Situation {
    Approved,
    Recovery,
    Failed,
}

impl Situation {
    pub fn from_average(final_average: f64) -> Self {
        if final_average >= APPROVAL_THRESHOLD {
            Situation::Approved
        } else if final_average >= RECOVERY_THRESHOLD {
            Situation::Recovery
        } else {
            Situation::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Situation::Approved => "Approved",
            Situation::Recovery => "Recovery",
            Situation::Failed => "Failed",
        }
    }
}

pub trait Weighted {
    fn score(&self) -> f64;
    fn weight(&self) -> f64;
}

impl Weighted for GradeEntry {
    fn score(&self) -> f64 {
        self.score
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

impl Weighted for (f64, f64) {
    fn score(&self) -> f64 {
        self.0
    }

    fn weight(&self) -> f64 {
        self.1
    }
}

/// Scores and weights carry two decimals; anything finer is dropped here so
/// the mean is taken over exact hundredths.
fn as_decimal(value: f64) -> Decimal {
    Decimal::new((value * 100.0).round() as i64, 2)
}

/// Weighted mean of the entries rounded half-up to two decimals.
///
/// The sum and the division run in decimal arithmetic; a mean landing on a
/// half hundredth (6.995) rounds up.
/// An empty set, or one whose weights sum to zero, averages to 0 rather than
/// failing; report cards render that as a plain zero.
pub fn final_average<'a, T, I>(grades: I) -> f64
where
    T: Weighted + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let (weighted_sum, total_weight) = grades.into_iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weights), grade| {
            let weight = as_decimal(grade.weight());
            (sum + as_decimal(grade.score()) * weight, weights + weight)
        },
    );

    if total_weight <= Decimal::ZERO {
        return 0.0;
    }

    (weighted_sum / total_weight)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_mean_matches_hand_computation() {
        let grades = [(8.0, 3.0), (6.0, 1.0)];
        assert_eq!(final_average(&grades), 7.5);
        assert_eq!(Situation::from_average(7.5), Situation::Approved);
    }

    #[test]
    fn equal_weights_average_plainly() {
        let grades = [(4.0, 1.0), (4.5, 1.0)];
        assert_eq!(final_average(&grades), 4.25);
        assert_eq!(Situation::from_average(4.25), Situation::Failed);
    }

    #[test]
    fn empty_set_averages_to_zero_and_fails() {
        let grades: [(f64, f64); 0] = [];
        let average = final_average(&grades);
        assert_eq!(average, 0.0);
        assert_eq!(Situation::from_average(average), Situation::Failed);
    }

    #[test]
    fn zero_total_weight_averages_to_zero() {
        let grades = [(9.0, 0.0), (7.0, 0.0)];
        assert_eq!(final_average(&grades), 0.0);
    }

    #[test]
    fn rounds_half_away_from_zero_at_two_decimals() {
        // (7.25 * 1 + 7.0 * 1) / 2 = 7.125
        let grades = [(7.25, 1.0), (7.0, 1.0)];
        assert_eq!(final_average(&grades), 7.13);

        // 10 / 3 = 3.333...
        let grades = [(10.0, 1.0), (0.0, 2.0)];
        assert_eq!(final_average(&grades), 3.33);
    }

    #[test]
    fn half_hundredth_means_round_up_across_thresholds() {
        // (5.04 + 8.95) / 2 = 6.995
        let average = final_average(&[(5.04, 1.0), (8.95, 1.0)]);
        assert_eq!(average, 7.0);
        assert_eq!(Situation::from_average(average), Situation::Approved);

        // (0.04 + 9.95) / 2 = 4.995
        let average = final_average(&[(0.04, 1.0), (9.95, 1.0)]);
        assert_eq!(average, 5.0);
        assert_eq!(Situation::from_average(average), Situation::Recovery);

        // (1.01 + 1.0) / 2 = 1.005
        assert_eq!(final_average(&[(1.01, 1.0), (1.0, 1.0)]), 1.01);
    }

    #[test]
    fn fractional_weights_are_summed_exactly() {
        // (9.99 * 0.1 + 0.01 * 0.2) / 0.3 = 3.3366...
        assert_eq!(final_average(&[(9.99, 0.1), (0.01, 0.2)]), 3.34);
        // (2.5 * 0.35 + 7.5 * 0.15) / 0.5 = 4.0
        assert_eq!(final_average(&[(2.5, 0.35), (7.5, 0.15)]), 4.0);
    }

    #[test]
    fn order_of_entries_does_not_change_the_average() {
        let grades = vec![(9.5, 2.0), (3.25, 0.5), (7.0, 1.5), (10.0, 1.0), (0.0, 0.25)];
        let expected = final_average(&grades);

        let mut reversed = grades.clone();
        reversed.reverse();
        assert_eq!(final_average(&reversed), expected);

        for shift in 1..grades.len() {
            let mut rotated = grades.clone();
            rotated.rotate_left(shift);
            assert_eq!(final_average(&rotated), expected, "rotation by {}", shift);
        }
    }

    #[test]
    fn average_stays_within_score_bounds() {
        let scores = [0.0, 0.5, 2.75, 5.0, 6.99, 7.0, 9.25, 10.0];
        let weights = [0.1, 0.5, 1.0, 2.0, 3.5];

        for (i, &score_a) in scores.iter().enumerate() {
            for &score_b in &scores[i..] {
                for &weight_a in &weights {
                    for &weight_b in &weights {
                        let average = final_average(&[(score_a, weight_a), (score_b, weight_b)]);
                        assert!(
                            (0.0..=10.0).contains(&average),
                            "average {} out of bounds",
                            average
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn situation_thresholds_are_inclusive_lower_bounds() {
        assert_eq!(Situation::from_average(10.0), Situation::Approved);
        assert_eq!(Situation::from_average(7.0), Situation::Approved);
        assert_eq!(Situation::from_average(6.99), Situation::Recovery);
        assert_eq!(Situation::from_average(5.0), Situation::Recovery);
        assert_eq!(Situation::from_average(4.99), Situation::Failed);
        assert_eq!(Situation::from_average(0.0), Situation::Failed);
    }
}
