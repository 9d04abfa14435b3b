use chrono::{Days, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::error::{MvDoseError, Result};
use crate::isocenter::assign_isocenters;
use crate::record::BeamRecord;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepted beam records grouped by plan name.
///
/// Plans keep first-seen order and records keep stream order. Read-only once
/// built.
#[derive(Debug, Clone, Default)]
pub struct PlanIndex {
    plans: IndexMap<String, Vec<BeamRecord>>,
}

impl PlanIndex {
    pub fn plan_names(&self) -> Vec<String> {
        self.plans.keys().cloned().collect()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    pub fn record_count(&self) -> usize {
        self.plans.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn records_for_plan(&self, plan: &str) -> &[BeamRecord] {
        self.plans.get(plan).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All records, plan by plan.
    pub fn records(&self) -> impl Iterator<Item = &BeamRecord> {
        self.plans.values().flatten()
    }

    /// Distinct calendar days (`YYYY-MM-DD`) of a plan in first-seen order.
    pub fn dates_for_plan(&self, plan: &str) -> Vec<String> {
        self.days_for_plan(plan)
            .into_iter()
            .map(|day| day.format(DATE_FORMAT).to_string())
            .collect()
    }

    pub fn days_for_plan(&self, plan: &str) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = Vec::new();
        if plan.is_empty() {
            return days;
        }
        for record in self.records_for_plan(plan) {
            let day = record.date();
            if !days.contains(&day) {
                days.push(day);
            }
        }
        days
    }

    /// Records of `plan` strictly after `date` 00:00:00.000 and strictly
    /// before the following midnight. A record stamped exactly at the opening
    /// midnight is not included.
    pub fn entries_for_plan_and_date(&self, plan: &str, date: NaiveDate) -> Vec<&BeamRecord> {
        let start = date.and_time(chrono::NaiveTime::MIN);
        let end = date
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(chrono::NaiveTime::MIN))
            .unwrap_or(NaiveDateTime::MAX);
        self.records_for_plan(plan)
            .iter()
            .filter(|record| record.timestamp > start && record.timestamp < end)
            .collect()
    }
}

/// Parses a `YYYY-MM-DD` day as produced by [`PlanIndex::dates_for_plan`].
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| MvDoseError::InvalidDate(raw.to_string()))
}

/// Accumulates one reconstruction run. A fresh builder starts every run.
#[derive(Debug, Default)]
pub(crate) struct PlanIndexBuilder {
    plans: IndexMap<String, Vec<BeamRecord>>,
    accepted: usize,
}

impl PlanIndexBuilder {
    /// Keeps the record only when it is a treatment beam.
    pub(crate) fn accept(&mut self, record: BeamRecord) -> bool {
        if !record.is_treatment {
            return false;
        }
        self.plans
            .entry(record.plan_name.clone())
            .or_default()
            .push(record);
        self.accepted += 1;
        true
    }

    pub(crate) fn plan_count(&self) -> usize {
        self.plans.len()
    }

    pub(crate) fn accepted(&self) -> usize {
        self.accepted
    }

    /// Runs the isocenter pass over each plan and freezes the index.
    pub(crate) fn finish(mut self) -> PlanIndex {
        for records in self.plans.values_mut() {
            assign_isocenters(records);
        }
        PlanIndex { plans: self.plans }
    }
}
