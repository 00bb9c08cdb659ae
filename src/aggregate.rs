//! Generic multi-key aggregation over classified shipments.
//!
//! Groups are kept in a `BTreeMap` keyed by `(key, day)`, so buckets come
//! out sorted by dimension key and then by ascending day offset. That order
//! is what the sequential delivery-rate deltas are computed over.

use crate::types::{ShipmentCategory, ShipmentRecord};
use crate::util::percentage;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub total: usize,
    pub delivered: usize,
    pub rto: usize,
    pub damage_lost: usize,
    pub undelivered: usize,
    pub other: usize,
}

impl CategoryCounts {
    pub fn add(&mut self, category: ShipmentCategory) {
        self.total += 1;
        match category {
            ShipmentCategory::Delivered => self.delivered += 1,
            ShipmentCategory::Rto => self.rto += 1,
            ShipmentCategory::DamageOrLost => self.damage_lost += 1,
            ShipmentCategory::Undelivered => self.undelivered += 1,
            ShipmentCategory::Other => self.other += 1,
        }
    }

    /// Delivered shipments are the success indicator.
    pub fn successful(&self) -> usize {
        self.delivered
    }

    pub fn failed(&self) -> usize {
        self.total - self.delivered
    }

    pub fn delivery_percentage(&self) -> f64 {
        percentage(self.delivered, self.total)
    }

    pub fn rto_rate(&self) -> f64 {
        percentage(self.rto, self.total)
    }
}

/// One output row of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket<K> {
    pub key: K,
    /// `None` when the grouping did not include the day offset.
    pub day: Option<u32>,
    pub counts: CategoryCounts,
    pub delivery_percentage: f64,
    pub rto_rate: f64,
    /// Change against the previous bucket of the same key, in day order.
    /// `None` for the first bucket of a key and for dayless groupings.
    pub drop_in_delivery_percentage: Option<f64>,
}

/// Whether `days_after_breach` joins the grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayGrouping {
    ByDay,
    Overall,
}

/// Groups `records` by `key_fn` (plus the day offset for `ByDay`).
///
/// Only combinations present in the data produce a bucket. Deltas compare
/// with the previous *present* day, so a gap (days 1, 3) compares day 3
/// with day 1.
pub fn aggregate<K, F>(records: &[&ShipmentRecord], key_fn: F, grouping: DayGrouping) -> Vec<AggregateBucket<K>>
where
    K: Ord + Clone,
    F: Fn(&ShipmentRecord) -> K,
{
    let mut groups: BTreeMap<(K, Option<u32>), CategoryCounts> = BTreeMap::new();
    for r in records {
        let day = match grouping {
            DayGrouping::ByDay => r.days_after_breach,
            DayGrouping::Overall => None,
        };
        groups.entry((key_fn(r), day)).or_default().add(r.shipment_category);
    }

    let mut buckets = Vec::with_capacity(groups.len());
    let mut previous: Option<(K, f64)> = None;
    for ((key, day), counts) in groups {
        let delivery_percentage = counts.delivery_percentage();
        let drop_in_delivery_percentage = match (&previous, grouping) {
            (Some((prev_key, prev_pct)), DayGrouping::ByDay) if *prev_key == key => {
                Some(delivery_percentage - prev_pct)
            }
            _ => None,
        };
        if grouping == DayGrouping::ByDay {
            previous = Some((key.clone(), delivery_percentage));
        }
        buckets.push(AggregateBucket {
            key,
            day,
            counts,
            delivery_percentage,
            rto_rate: counts.rto_rate(),
            drop_in_delivery_percentage,
        });
    }
    buckets
}

/// Mean day offset per key over the records accepted by `filter`. Keys
/// with no accepted record are absent from the result.
pub fn mean_days_by<K, F, P>(records: &[&ShipmentRecord], key_fn: F, filter: P) -> BTreeMap<K, f64>
where
    K: Ord,
    F: Fn(&ShipmentRecord) -> K,
    P: Fn(&ShipmentRecord) -> bool,
{
    let mut sums: BTreeMap<K, (u64, usize)> = BTreeMap::new();
    for r in records.iter().filter(|r| filter(r)) {
        if let Some(days) = r.days_after_breach {
            let e = sums.entry(key_fn(r)).or_insert((0, 0));
            e.0 += u64::from(days);
            e.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(k, (sum, n))| (k, sum as f64 / n as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackingStatus;

    fn rec(courier: &str, day: u32, category: ShipmentCategory) -> ShipmentRecord {
        ShipmentRecord {
            first_attempt_date: None,
            courier_expected_delivery_date: None,
            fallback_expected_delivery_date: None,
            delivered_date: None,
            tracking_status: TrackingStatus::Other,
            payment_method: "COD".into(),
            applied_zone: "A".into(),
            pickup_state: "KA".into(),
            delivery_state: "MH".into(),
            parent_courier_name: courier.into(),
            effective_expected_delivery_date: None,
            shipment_category: category,
            tat_breach: true,
            days_after_breach: Some(day),
        }
    }

    use ShipmentCategory::*;

    #[test]
    fn delta_skips_missing_days_and_resets_per_key() {
        let data = vec![
            rec("Swift", 1, Delivered),
            rec("Swift", 1, Delivered),
            rec("Swift", 3, Delivered),
            rec("Swift", 3, Rto),
            rec("Swift", 4, Undelivered),
            rec("Blue", 2, Delivered),
        ];
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let buckets = aggregate(&refs, |r| r.parent_courier_name.clone(), DayGrouping::ByDay);

        let view: Vec<(&str, Option<u32>, Option<f64>)> = buckets
            .iter()
            .map(|b| (b.key.as_str(), b.day, b.drop_in_delivery_percentage))
            .collect();
        assert_eq!(
            view,
            vec![
                ("Blue", Some(2), None),
                ("Swift", Some(1), None),
                ("Swift", Some(3), Some(-50.0)),
                ("Swift", Some(4), Some(-50.0)),
            ]
        );
    }

    #[test]
    fn counts_sum_to_total_and_rates_stay_in_range() {
        let cats = [Delivered, Rto, DamageOrLost, Undelivered, Other];
        let data: Vec<ShipmentRecord> = (0..97)
            .map(|i| rec(["a", "b", "c"][i % 3], (i % 7) as u32 + 1, cats[(i * 7) % 5]))
            .collect();
        let refs: Vec<&ShipmentRecord> = data.iter().collect();

        let mut total = 0;
        for b in aggregate(&refs, |r| r.parent_courier_name.clone(), DayGrouping::ByDay) {
            let c = b.counts;
            assert_eq!(c.delivered + c.rto + c.damage_lost + c.undelivered + c.other, c.total);
            assert!(c.total > 0);
            assert!((0.0..=100.0).contains(&b.delivery_percentage));
            assert!((0.0..=100.0).contains(&b.rto_rate));
            total += c.total;
        }
        assert_eq!(total, 97);
    }

    #[test]
    fn overall_grouping_has_no_day_and_no_delta() {
        let data = vec![rec("a", 1, Delivered), rec("a", 5, Rto), rec("b", 2, Rto)];
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let buckets = aggregate(&refs, |r| r.parent_courier_name.clone(), DayGrouping::Overall);

        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|b| b.day.is_none() && b.drop_in_delivery_percentage.is_none()));
        assert_eq!(buckets[0].delivery_percentage, 50.0);
        assert_eq!(buckets[0].rto_rate, 50.0);
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let data = vec![
            rec("b", 2, Delivered),
            rec("a", 3, Rto),
            rec("a", 1, Delivered),
            rec("b", 1, Undelivered),
        ];
        let forward: Vec<&ShipmentRecord> = data.iter().collect();
        let backward: Vec<&ShipmentRecord> = data.iter().rev().collect();

        assert_eq!(
            aggregate(&forward, |r| r.parent_courier_name.clone(), DayGrouping::ByDay),
            aggregate(&backward, |r| r.parent_courier_name.clone(), DayGrouping::ByDay)
        );
    }

    #[test]
    fn zero_total_rates_are_zero() {
        let empty = CategoryCounts::default();
        assert_eq!(empty.delivery_percentage(), 0.0);
        assert_eq!(empty.rto_rate(), 0.0);
    }

    #[test]
    fn mean_days_only_counts_accepted_records() {
        let data = vec![rec("a", 2, Delivered), rec("a", 4, Delivered), rec("a", 30, Rto), rec("b", 9, Rto)];
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let means = mean_days_by(
            &refs,
            |r| r.parent_courier_name.clone(),
            |r| r.shipment_category == Delivered,
        );
        assert_eq!(means.get("a"), Some(&3.0));
        assert_eq!(means.get("b"), None);
    }
}
