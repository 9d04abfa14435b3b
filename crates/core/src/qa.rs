use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::query::PlanIndex;
use crate::record::{relative_difference, BeamRecord};

pub const DEFAULT_PERCENT_LIMIT: f64 = 10.0;
pub const DEFAULT_MIN_PLANNED_MU: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QaThresholds {
    /// Limit on the absolute per-beam and cumulative difference, in percent.
    #[serde(default = "default_percent_limit")]
    pub percent_limit: f64,
    /// Beams planned below this many MU are not judged cumulatively.
    #[serde(default = "default_min_planned_mu")]
    pub min_planned_mu: f64,
}

fn default_percent_limit() -> f64 {
    DEFAULT_PERCENT_LIMIT
}

fn default_min_planned_mu() -> f64 {
    DEFAULT_MIN_PLANNED_MU
}

impl Default for QaThresholds {
    fn default() -> Self {
        Self {
            percent_limit: DEFAULT_PERCENT_LIMIT,
            min_planned_mu: DEFAULT_MIN_PLANNED_MU,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CumulativeStatus {
    NotEvaluated,
    Inside,
    Outside,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamAssessment {
    pub beam_number: usize,
    /// `<isocenter>.<node>`
    pub label: String,
    pub difference_percent: f64,
    pub is_flagged: bool,
    pub inside_threshold: bool,
    pub cumulative: CumulativeStatus,
    pub accepted_cumulative_difference_mu: f64,
    pub accepted_cumulative_difference_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub plan_name: String,
    pub date: NaiveDate,
    pub beams: usize,
    pub flagged: usize,
    pub outside_threshold: usize,
    pub cumulative_outside: usize,
    pub isocenters: u32,
    pub accepted_cumulative_difference_percent: f64,
}

/// Judges one day's beams in order. The accepted-cumulative sums only take
/// beams that are neither flagged nor outside the per-beam limit.
pub fn assess_beams(records: &[&BeamRecord], thresholds: &QaThresholds) -> Vec<BeamAssessment> {
    let mut accepted_delivered = 0.0;
    let mut accepted_imager = 0.0;
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let difference_percent = record.difference_percent();
            let inside_threshold = difference_percent.abs() < thresholds.percent_limit;
            if !record.is_flagged && inside_threshold {
                accepted_delivered += record.delivered_mu;
                accepted_imager += record.imager_mu;
            }
            BeamAssessment {
                beam_number: idx + 1,
                label: format!("{}.{}", record.isocenter, record.node),
                difference_percent,
                is_flagged: record.is_flagged,
                inside_threshold,
                cumulative: cumulative_status(record, thresholds),
                accepted_cumulative_difference_mu: accepted_imager - accepted_delivered,
                accepted_cumulative_difference_percent: relative_difference(
                    accepted_delivered,
                    accepted_imager,
                ),
            }
        })
        .collect()
}

fn cumulative_status(record: &BeamRecord, thresholds: &QaThresholds) -> CumulativeStatus {
    let percent = record.cumulative_difference_percent();
    if percent.is_nan() || record.planned_mu < thresholds.min_planned_mu {
        CumulativeStatus::NotEvaluated
    } else if percent.abs() >= thresholds.percent_limit {
        CumulativeStatus::Outside
    } else {
        CumulativeStatus::Inside
    }
}

/// Summary of one plan on one day, `None` when the day has no beams.
pub fn summarize_day(
    index: &PlanIndex,
    plan: &str,
    date: NaiveDate,
    thresholds: &QaThresholds,
) -> Option<DailySummary> {
    let records = index.entries_for_plan_and_date(plan, date);
    if records.is_empty() {
        return None;
    }
    let assessments = assess_beams(&records, thresholds);
    Some(DailySummary {
        plan_name: plan.to_string(),
        date,
        beams: records.len(),
        flagged: assessments.iter().filter(|a| a.is_flagged).count(),
        outside_threshold: assessments.iter().filter(|a| !a.inside_threshold).count(),
        cumulative_outside: assessments
            .iter()
            .filter(|a| a.cumulative == CumulativeStatus::Outside)
            .count(),
        isocenters: records.iter().map(|r| r.isocenter).max().unwrap_or(0),
        accepted_cumulative_difference_percent: assessments
            .last()
            .map(|a| a.accepted_cumulative_difference_percent)
            .unwrap_or(0.0),
    })
}

/// Daily summaries for every day of a plan, in first-seen day order.
pub fn summarize_plan(index: &PlanIndex, plan: &str, thresholds: &QaThresholds) -> Vec<DailySummary> {
    index
        .days_for_plan(plan)
        .into_iter()
        .filter_map(|day| summarize_day(index, plan, day, thresholds))
        .collect()
}
