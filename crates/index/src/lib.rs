use std::io::Write;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Flat export shape of one beam delivery, fields in canonical column order.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BeamRow {
    pub timestamp: String,
    pub plan_name: String,
    pub treatment_type: String,
    pub is_treatment: bool,
    pub collimator_size: f64,
    pub axial: f64,
    pub oblique: f64,
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
    pub difference_mu: f64,
    pub difference_percent: f64,
    pub cumulative_difference_mu: f64,
    pub cumulative_difference_percent: f64,
}

impl BeamRow {
    pub const COLUMNS: [&'static str; 22] = [
        "timestamp",
        "plan_name",
        "treatment_type",
        "is_treatment",
        "collimator_size",
        "axial",
        "oblique",
        "isocenter",
        "node",
        "intensity",
        "field_size_mm",
        "planned_mu",
        "delivered_mu",
        "imager_mu",
        "cumulative_delivered_mu",
        "cumulative_imager_mu",
        "is_valid",
        "is_flagged",
        "difference_mu",
        "difference_percent",
        "cumulative_difference_mu",
        "cumulative_difference_percent",
    ];
}

pub struct JsonlWriter<W> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_row() -> BeamRow {
        BeamRow {
            timestamp: "2024-01-05T08:15:30.250".to_string(),
            plan_name: "PlanA".to_string(),
            treatment_type: "Treatment".to_string(),
            is_treatment: true,
            isocenter: 1,
            node: 12,
            delivered_mu: 100.0,
            imager_mu: 98.0,
            difference_mu: -2.0,
            difference_percent: -2.0,
            ..BeamRow::default()
        }
    }

    #[test]
    fn serialized_keys_follow_canonical_column_order() {
        let json = serde_json::to_string(&sample_row()).unwrap();
        let mut last = 0;
        for column in BeamRow::COLUMNS {
            let needle = format!("\"{column}\":");
            let pos = json
                .find(&needle)
                .unwrap_or_else(|| panic!("missing column {column}"));
            assert!(pos >= last, "column {column} out of order");
            last = pos;
        }
    }

    #[test]
    fn jsonl_writer_emits_one_line_per_record() {
        let mut writer = JsonlWriter::new(Vec::new());
        writer.write_record(&sample_row()).unwrap();
        writer.write_record(&sample_row()).unwrap();
        assert_eq!(writer.written(), 2);
        let buf = writer.finish().unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["plan_name"], "PlanA");
        assert_eq!(parsed["node"], 12);
    }
}
