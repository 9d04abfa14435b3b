use chrono::NaiveDate;

use crate::record::BeamRecord;

/// Numbers the isocenters of one plan's records, in their stored order.
///
/// Within a day node numbers rise while the machine stays at one isocenter, so
/// a drop in node number starts the next one. A new calendar day always starts
/// again at 1. The day check runs after the node check, so when both fire on
/// the same record the reset wins.
pub fn assign_isocenters(records: &mut [BeamRecord]) {
    let mut isocenter: u32 = 1;
    let mut last_node: Option<i32> = None;
    let mut last_date: Option<NaiveDate> = None;

    for record in records.iter_mut() {
        if last_node.is_some_and(|last| record.node < last) {
            isocenter += 1;
        }
        let date = record.date();
        if last_date != Some(date) {
            isocenter = 1;
            last_date = Some(date);
        }
        record.isocenter = isocenter;
        last_node = Some(record.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;

    fn isocenters(records: &[BeamRecord]) -> Vec<u32> {
        records.iter().map(|r| r.isocenter).collect()
    }

    #[test]
    fn node_drop_starts_a_new_isocenter() {
        let mut records = vec![
            sample_record("2024-01-05T08:00:00.000", "PlanA", 5),
            sample_record("2024-01-05T08:01:00.000", "PlanA", 3),
            sample_record("2024-01-05T08:02:00.000", "PlanA", 4),
        ];
        assign_isocenters(&mut records);
        assert_eq!(isocenters(&records), vec![1, 2, 2]);
    }

    #[test]
    fn day_change_overrides_the_node_drop() {
        let mut records = vec![
            sample_record("2024-01-05T08:00:00.000", "PlanA", 5),
            sample_record("2024-01-06T08:01:00.000", "PlanA", 3),
            sample_record("2024-01-06T08:02:00.000", "PlanA", 4),
        ];
        assign_isocenters(&mut records);
        assert_eq!(isocenters(&records), vec![1, 1, 1]);
    }

    #[test]
    fn repeated_drops_keep_counting() {
        let mut records = vec![
            sample_record("2024-01-05T08:00:00.000", "PlanA", 1),
            sample_record("2024-01-05T08:00:01.000", "PlanA", 2),
            sample_record("2024-01-05T08:00:02.000", "PlanA", 1),
            sample_record("2024-01-05T08:00:03.000", "PlanA", 1),
            sample_record("2024-01-05T08:00:04.000", "PlanA", 0),
        ];
        assign_isocenters(&mut records);
        assert_eq!(isocenters(&records), vec![1, 1, 2, 2, 3]);
    }

    #[test]
    fn negative_first_node_still_starts_at_one() {
        let mut records = vec![sample_record("2024-01-05T08:00:00.000", "PlanA", -4)];
        assign_isocenters(&mut records);
        assert_eq!(isocenters(&records), vec![1]);
    }
}
