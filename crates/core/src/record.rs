use chrono::{NaiveDate, NaiveDateTime};
use mvdose_index::BeamRow;
use serde::Serialize;

use crate::grammar::{CumulativeDose, DoseCheck, LineEvent, MeasuredDose, SystemDelivery};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// One completed beam delivery.
///
/// The four difference values are computed on read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamRecord {
    pub timestamp: NaiveDateTime,
    pub plan_name: String,
    pub treatment_type: String,
    pub is_treatment: bool,
    pub collimator_size: f64,
    pub axial: f64,
    pub oblique: f64,
    /// Assigned by the isocenter pass; 0 until then.
    pub isocenter: u32,
    pub node: i32,
    pub intensity: f64,
    pub field_size_mm: f64,
    pub planned_mu: f64,
    pub delivered_mu: f64,
    pub imager_mu: f64,
    pub cumulative_delivered_mu: f64,
    pub cumulative_imager_mu: f64,
    pub is_valid: bool,
    pub is_flagged: bool,
}

impl BeamRecord {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn difference_mu(&self) -> f64 {
        self.imager_mu - self.delivered_mu
    }

    pub fn difference_percent(&self) -> f64 {
        relative_difference(self.delivered_mu, self.imager_mu)
    }

    pub fn cumulative_difference_mu(&self) -> f64 {
        self.cumulative_imager_mu - self.cumulative_delivered_mu
    }

    pub fn cumulative_difference_percent(&self) -> f64 {
        relative_difference(self.cumulative_delivered_mu, self.cumulative_imager_mu)
    }

    /// Export shape: every stored field plus the derived ones.
    pub fn to_row(&self) -> BeamRow {
        BeamRow {
            timestamp: self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            plan_name: self.plan_name.clone(),
            treatment_type: self.treatment_type.clone(),
            is_treatment: self.is_treatment,
            collimator_size: self.collimator_size,
            axial: self.axial,
            oblique: self.oblique,
            isocenter: self.isocenter,
            node: self.node,
            intensity: self.intensity,
            field_size_mm: self.field_size_mm,
            planned_mu: self.planned_mu,
            delivered_mu: self.delivered_mu,
            imager_mu: self.imager_mu,
            cumulative_delivered_mu: self.cumulative_delivered_mu,
            cumulative_imager_mu: self.cumulative_imager_mu,
            is_valid: self.is_valid,
            is_flagged: self.is_flagged,
            difference_mu: self.difference_mu(),
            difference_percent: self.difference_percent(),
            cumulative_difference_mu: self.cumulative_difference_mu(),
            cumulative_difference_percent: self.cumulative_difference_percent(),
        }
    }
}

/// `(measured - reference) / reference * 100`, or 0 when the reference is 0.
pub fn relative_difference(reference: f64, measured: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        (measured - reference) / reference * 100.0
    }
}

/// A beam block between its opening measured-dose line and its terminal line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingBeam {
    timestamp: NaiveDateTime,
    node: i32,
    intensity: f64,
    field_size_mm: f64,
    is_valid: bool,
    delivered_mu: f64,
    imager_mu: f64,
    is_flagged: bool,
    cumulative_delivered_mu: f64,
    cumulative_imager_mu: f64,
}

impl PendingBeam {
    pub(crate) fn open(measured: &MeasuredDose) -> Self {
        let mut pending = Self {
            timestamp: measured.timestamp,
            node: 0,
            intensity: 0.0,
            field_size_mm: 0.0,
            is_valid: false,
            delivered_mu: 0.0,
            imager_mu: 0.0,
            is_flagged: false,
            cumulative_delivered_mu: 0.0,
            cumulative_imager_mu: 0.0,
        };
        pending.apply_measured(measured);
        pending
    }

    /// Folds a non-terminal event into the block; later values overwrite earlier ones.
    pub(crate) fn apply(&mut self, event: &LineEvent) {
        match event {
            LineEvent::Measured(measured) => self.apply_measured(measured),
            LineEvent::DoseChecker(check) => self.apply_dose_check(check),
            LineEvent::Cumulative(cumulative) => self.apply_cumulative(cumulative),
            LineEvent::SystemData(_) | LineEvent::None => {}
        }
    }

    fn apply_measured(&mut self, measured: &MeasuredDose) {
        self.timestamp = measured.timestamp;
        self.intensity = measured.intensity;
        self.field_size_mm = measured.field_size_mm;
        self.node = measured.node;
        self.is_valid = measured.is_valid;
    }

    // The checker's own node number is not copied: the beam's node comes from
    // the measured-dose line.
    fn apply_dose_check(&mut self, check: &DoseCheck) {
        self.delivered_mu = check.delivered_mu;
        self.imager_mu = check.imager_mu;
        self.is_flagged = check.is_flagged;
    }

    fn apply_cumulative(&mut self, cumulative: &CumulativeDose) {
        self.cumulative_delivered_mu = cumulative.delivered_mu;
        self.cumulative_imager_mu = cumulative.imager_mu;
    }

    pub(crate) fn commit(self, system: &SystemDelivery) -> BeamRecord {
        BeamRecord {
            timestamp: self.timestamp,
            plan_name: system.plan_name.clone(),
            treatment_type: system.treatment_type.clone(),
            is_treatment: system.is_treatment,
            collimator_size: system.collimator_size,
            axial: system.axial,
            oblique: system.oblique,
            isocenter: 0,
            node: self.node,
            intensity: self.intensity,
            field_size_mm: self.field_size_mm,
            planned_mu: system.planned_mu,
            delivered_mu: self.delivered_mu,
            imager_mu: self.imager_mu,
            cumulative_delivered_mu: self.cumulative_delivered_mu,
            cumulative_imager_mu: self.cumulative_imager_mu,
            is_valid: self.is_valid,
            is_flagged: self.is_flagged,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(timestamp: &str, plan: &str, node: i32) -> BeamRecord {
    BeamRecord {
        timestamp: NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .expect("test timestamp"),
        plan_name: plan.to_string(),
        treatment_type: "Treatment".to_string(),
        is_treatment: true,
        collimator_size: 12.5,
        axial: 0.0,
        oblique: 0.0,
        isocenter: 0,
        node,
        intensity: 1.0,
        field_size_mm: 12.5,
        planned_mu: 100.0,
        delivered_mu: 100.0,
        imager_mu: 100.0,
        cumulative_delivered_mu: 100.0,
        cumulative_imager_mu: 100.0,
        is_valid: true,
        is_flagged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_percent_is_zero_without_delivered_dose() {
        let mut record = sample_record("2024-01-05T08:00:00.000", "PlanA", 1);
        record.delivered_mu = 0.0;
        record.imager_mu = 42.0;
        assert_eq!(record.difference_percent(), 0.0);
        assert_eq!(record.difference_mu(), 42.0);
        record.imager_mu = 0.0;
        assert_eq!(record.difference_percent(), 0.0);
    }

    #[test]
    fn difference_percent_is_relative_to_delivered() {
        let mut record = sample_record("2024-01-05T08:00:00.000", "PlanA", 1);
        record.delivered_mu = 200.0;
        record.imager_mu = 190.0;
        assert_eq!(record.difference_mu(), -10.0);
        assert_eq!(record.difference_percent(), -5.0);
    }

    #[test]
    fn cumulative_values_follow_the_same_formula() {
        let mut record = sample_record("2024-01-05T08:00:00.000", "PlanA", 1);
        record.cumulative_delivered_mu = 400.0;
        record.cumulative_imager_mu = 410.0;
        assert_eq!(record.cumulative_difference_mu(), 10.0);
        assert_eq!(record.cumulative_difference_percent(), 2.5);
        record.cumulative_delivered_mu = 0.0;
        assert_eq!(record.cumulative_difference_percent(), 0.0);
    }

    #[test]
    fn row_carries_derived_fields() {
        let mut record = sample_record("2024-01-05T08:00:00.001", "PlanA", 4);
        record.imager_mu = 110.0;
        record.isocenter = 2;
        let row = record.to_row();
        assert_eq!(row.timestamp, "2024-01-05T08:00:00.001");
        assert_eq!(row.isocenter, 2);
        assert_eq!(row.node, 4);
        assert_eq!(row.difference_mu, 10.0);
        assert_eq!(row.difference_percent, 10.0);
    }
}
