use crate::aggregate::{aggregate, mean_days_by, AggregateBucket, DayGrouping};
use crate::classify::classify_all;
use crate::config::AnalysisConfig;
use crate::error::AnalysisResult;
use crate::loader::{load_table, RawTable};
use crate::types::{
    AnalysisOutcome, AnalysisReport, CourierRow, DaywiseRow, EarlyWindowRow, LoadDiagnostics,
    PaymentComparison, PaymentMethodRow, PerformanceCategory, RouteDayRow, RoutePerformanceRow,
    RouteSummaryRow, SegmentRate, ShipmentCategory, ShipmentRecord, SummaryStats, ZoneRow,
};
use crate::util::{average, percentage};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub type Route = (String, String);

/// Loads `path` and runs the whole analysis as of `as_of`.
#[tracing::instrument(skip_all, fields(path = %path.display(), as_of = %as_of))]
pub fn run_analysis(path: &Path, as_of: NaiveDate, cfg: &AnalysisConfig) -> AnalysisResult<AnalysisOutcome> {
    let table = load_table(path, cfg)?;
    Ok(analyze_table(table, as_of, cfg))
}

/// Classifies an already loaded table and builds every report from its
/// breach subset.
pub fn analyze_table(table: RawTable, as_of: NaiveDate, cfg: &AnalysisConfig) -> AnalysisOutcome {
    let RawTable { rows, stats } = table;
    let classified = classify_all(&rows, as_of, cfg.delivered_offset_basis);
    drop(rows);

    let breach = classified.breach_subset();
    let diagnostics = LoadDiagnostics {
        total_rows: stats.total_rows,
        malformed_rows: stats.malformed_rows,
        coerced_fields: classified.coerced_fields,
        missing_edd_rows: classified.missing_edd_rows,
        analyzed_rows: classified.records.len() - classified.missing_edd_rows,
        breach_cases: breach.len(),
        batches_read: stats.batches_read,
        compactions: stats.compactions,
    };

    if breach.is_empty() {
        warn!(analyzed_rows = diagnostics.analyzed_rows, "No TAT breach cases found");
        return AnalysisOutcome::NoBreachCases { diagnostics };
    }

    let rto_cases = breach
        .iter()
        .filter(|r| r.shipment_category == ShipmentCategory::Rto)
        .count();
    info!(
        breach_cases = breach.len(),
        rto_cases,
        rto_share = percentage(rto_cases, breach.len()),
        "Breach subset selected"
    );

    AnalysisOutcome::Report(Box::new(build_report(&breach, diagnostics, as_of, cfg)))
}

pub fn build_report(
    breach: &[&ShipmentRecord],
    diagnostics: LoadDiagnostics,
    as_of: NaiveDate,
    cfg: &AnalysisConfig,
) -> AnalysisReport {
    let window = cfg.early_window_days;

    let day_buckets = aggregate(breach, |_| (), DayGrouping::ByDay);
    let payment_buckets = aggregate(breach, |r| r.payment_method.clone(), DayGrouping::ByDay);
    let zone_buckets = aggregate(breach, |r| r.applied_zone.clone(), DayGrouping::ByDay);
    let route_buckets = aggregate(breach, ShipmentRecord::route, DayGrouping::ByDay);
    let courier_buckets = aggregate(breach, |r| r.parent_courier_name.clone(), DayGrouping::ByDay);

    let daywise_summary = early_window(&day_buckets, window, "overall", |_| "All".to_string());
    let payment_summary = early_window(&payment_buckets, window, "payment_method", String::clone);
    let zone_summary = early_window(&zone_buckets, window, "applied_zone", String::clone);
    let courier_summary = early_window(&courier_buckets, window, "parent_courier_name", String::clone);
    let route_summary = route_early_window(&route_buckets, window, cfg.route_summary_top_n);

    let summary = executive_summary(
        &day_buckets,
        &payment_summary,
        &zone_summary,
        &courier_summary,
        &diagnostics,
        as_of,
    );
    info!(
        days = day_buckets.len(),
        max_day = summary.max_days_after_breach,
        overall_delivery_rate = summary.overall_delivery_rate,
        "Reports built"
    );

    AnalysisReport {
        daywise: day_buckets.iter().map(daywise_row).collect(),
        payment_method: payment_buckets.iter().map(payment_row).collect(),
        zone: zone_buckets.iter().map(zone_row).collect(),
        route_daywise: route_buckets.iter().map(route_day_row).collect(),
        route_performance: route_performance_report(breach, cfg),
        courier: courier_buckets.iter().map(courier_row).collect(),
        daywise_summary,
        payment_summary,
        zone_summary,
        route_summary,
        courier_summary,
        summary,
        diagnostics,
    }
}

fn day_of<K>(b: &AggregateBucket<K>) -> u32 {
    b.day.unwrap_or_default()
}

fn daywise_row(b: &AggregateBucket<()>) -> DaywiseRow {
    DaywiseRow {
        days_after_breach: day_of(b),
        total_shipments: b.counts.total,
        successful_deliveries: b.counts.successful(),
        failed_deliveries: b.counts.failed(),
        delivered_count: b.counts.delivered,
        rto_count: b.counts.rto,
        damage_lost_count: b.counts.damage_lost,
        undelivered_count: b.counts.undelivered,
        other_count: b.counts.other,
        delivery_percentage: b.delivery_percentage,
        rto_rate: b.rto_rate,
        drop_in_delivery_percentage: b.drop_in_delivery_percentage,
    }
}

fn payment_row(b: &AggregateBucket<String>) -> PaymentMethodRow {
    PaymentMethodRow {
        payment_method: b.key.clone(),
        days_after_breach: day_of(b),
        total_shipments: b.counts.total,
        successful_deliveries: b.counts.successful(),
        delivered_count: b.counts.delivered,
        rto_count: b.counts.rto,
        damage_lost_count: b.counts.damage_lost,
        undelivered_count: b.counts.undelivered,
        other_count: b.counts.other,
        delivery_percentage: b.delivery_percentage,
        rto_rate: b.rto_rate,
        drop_in_delivery_percentage: b.drop_in_delivery_percentage,
    }
}

fn zone_row(b: &AggregateBucket<String>) -> ZoneRow {
    ZoneRow {
        applied_zone: b.key.clone(),
        days_after_breach: day_of(b),
        total_shipments: b.counts.total,
        successful_deliveries: b.counts.successful(),
        delivered_count: b.counts.delivered,
        rto_count: b.counts.rto,
        damage_lost_count: b.counts.damage_lost,
        undelivered_count: b.counts.undelivered,
        other_count: b.counts.other,
        delivery_percentage: b.delivery_percentage,
        rto_rate: b.rto_rate,
        drop_in_delivery_percentage: b.drop_in_delivery_percentage,
    }
}

fn courier_row(b: &AggregateBucket<String>) -> CourierRow {
    CourierRow {
        parent_courier_name: b.key.clone(),
        days_after_breach: day_of(b),
        total_shipments: b.counts.total,
        successful_deliveries: b.counts.successful(),
        delivered_count: b.counts.delivered,
        rto_count: b.counts.rto,
        damage_lost_count: b.counts.damage_lost,
        undelivered_count: b.counts.undelivered,
        other_count: b.counts.other,
        delivery_percentage: b.delivery_percentage,
        rto_rate: b.rto_rate,
        drop_in_delivery_percentage: b.drop_in_delivery_percentage,
    }
}

fn route_day_row(b: &AggregateBucket<Route>) -> RouteDayRow {
    RouteDayRow {
        pickup_state: b.key.0.clone(),
        delivery_state: b.key.1.clone(),
        days_after_breach: day_of(b),
        total_shipments: b.counts.total,
        successful_deliveries: b.counts.successful(),
        delivered_count: b.counts.delivered,
        rto_count: b.counts.rto,
        damage_lost_count: b.counts.damage_lost,
        undelivered_count: b.counts.undelivered,
        other_count: b.counts.other,
        delivery_percentage: b.delivery_percentage,
        rto_rate: b.rto_rate,
    }
}

/// Tier by delivery percentage: >=80 Excellent, >=60 Good, >=40 Average.
pub fn performance_category(delivery_percentage: f64) -> PerformanceCategory {
    match delivery_percentage {
        p if p >= 80.0 => PerformanceCategory::Excellent,
        p if p >= 60.0 => PerformanceCategory::Good,
        p if p >= 40.0 => PerformanceCategory::Average,
        _ => PerformanceCategory::Poor,
    }
}

/// Route-only report. Every route reaching `route_min_volume` is kept, and
/// so are the `route_top_n` busiest routes below that volume.
pub fn route_performance_report(breach: &[&ShipmentRecord], cfg: &AnalysisConfig) -> Vec<RoutePerformanceRow> {
    let mut buckets = aggregate(breach, ShipmentRecord::route, DayGrouping::Overall);
    let avg_days = mean_days_by(breach, ShipmentRecord::route, |r| {
        r.shipment_category == ShipmentCategory::Delivered
    });

    buckets.sort_by(|a, b| {
        b.counts
            .total
            .cmp(&a.counts.total)
            .then_with(|| a.key.cmp(&b.key))
    });
    let total_routes = buckets.len();

    let mut below_threshold_rank = 0usize;
    let rows: Vec<RoutePerformanceRow> = buckets
        .into_iter()
        .enumerate()
        .filter(|(_, b)| {
            if b.counts.total >= cfg.route_min_volume {
                return true;
            }
            below_threshold_rank += 1;
            below_threshold_rank <= cfg.route_top_n
        })
        .map(|(rank, b)| RoutePerformanceRow {
            volume_rank: rank + 1,
            avg_days_to_delivery: avg_days.get(&b.key).copied(),
            performance_category: performance_category(b.delivery_percentage),
            pickup_state: b.key.0,
            delivery_state: b.key.1,
            total_shipments: b.counts.total,
            delivered_count: b.counts.delivered,
            rto_count: b.counts.rto,
            damage_lost_count: b.counts.damage_lost,
            undelivered_count: b.counts.undelivered,
            other_count: b.counts.other,
            delivery_percentage: b.delivery_percentage,
            rto_rate: b.rto_rate,
        })
        .collect();
    info!(total_routes, retained = rows.len(), "Route performance filtered");
    rows
}

#[derive(Default)]
struct WindowAcc {
    total: usize,
    delivered: usize,
    rto: usize,
    delivery_rates: Vec<f64>,
    rto_rates: Vec<f64>,
}

/// Days `1..=max_day` of each key: counts are summed, rates are the
/// unweighted mean of the per-day rates.
fn window_totals<K: Ord + Clone>(buckets: &[AggregateBucket<K>], max_day: u32) -> BTreeMap<K, WindowAcc> {
    let mut map: BTreeMap<K, WindowAcc> = BTreeMap::new();
    for b in buckets {
        let Some(day) = b.day else { continue };
        if !(1..=max_day).contains(&day) {
            continue;
        }
        let e = map.entry(b.key.clone()).or_default();
        e.total += b.counts.total;
        e.delivered += b.counts.delivered;
        e.rto += b.counts.rto;
        e.delivery_rates.push(b.delivery_percentage);
        e.rto_rates.push(b.rto_rate);
    }
    map
}

/// One early-window row per key, labelled by `label`, in key order.
pub fn early_window<K, L>(
    buckets: &[AggregateBucket<K>],
    max_day: u32,
    dimension: &str,
    label: L,
) -> Vec<EarlyWindowRow>
where
    K: Ord + Clone,
    L: Fn(&K) -> String,
{
    window_totals(buckets, max_day)
        .into_iter()
        .map(|(key, acc)| EarlyWindowRow {
            dimension: dimension.to_string(),
            segment: label(&key),
            total_shipments: acc.total,
            total_delivered: acc.delivered,
            total_rto: acc.rto,
            avg_delivery_rate: average(&acc.delivery_rates),
            avg_rto_rate: average(&acc.rto_rates),
        })
        .collect()
}

/// Early window per route, busiest first (ties by pickup then delivery
/// state), cut to `top_n` routes.
pub fn route_early_window(buckets: &[AggregateBucket<Route>], max_day: u32, top_n: usize) -> Vec<RouteSummaryRow> {
    let mut rows: Vec<RouteSummaryRow> = window_totals(buckets, max_day)
        .into_iter()
        .map(|((pickup_state, delivery_state), acc)| RouteSummaryRow {
            pickup_state,
            delivery_state,
            total_shipments: acc.total,
            total_delivered: acc.delivered,
            total_rto: acc.rto,
            avg_delivery_rate: average(&acc.delivery_rates),
            avg_rto_rate: average(&acc.rto_rates),
        })
        .collect();
    // Stable sort over key-ordered rows keeps the state tie-break.
    rows.sort_by(|a, b| b.total_shipments.cmp(&a.total_shipments));
    rows.truncate(top_n);
    rows
}

fn segment_rate(row: &EarlyWindowRow) -> SegmentRate {
    SegmentRate {
        segment: row.segment.clone(),
        avg_delivery_rate: row.avg_delivery_rate,
        avg_rto_rate: row.avg_rto_rate,
    }
}

/// Highest and lowest average delivery rate; equal rates resolve to the
/// lexically smaller segment in both directions.
fn best_and_worst(rows: &[EarlyWindowRow]) -> (Option<SegmentRate>, Option<SegmentRate>) {
    let by_rate = |a: &&EarlyWindowRow, b: &&EarlyWindowRow| {
        a.avg_delivery_rate
            .partial_cmp(&b.avg_delivery_rate)
            .unwrap_or(Ordering::Equal)
    };
    let best = rows
        .iter()
        .max_by(|a, b| by_rate(a, b).then_with(|| b.segment.cmp(&a.segment)));
    let worst = rows
        .iter()
        .min_by(|a, b| by_rate(a, b).then_with(|| a.segment.cmp(&b.segment)));
    (best.map(segment_rate), worst.map(segment_rate))
}

fn payment_comparison(rows: &[EarlyWindowRow]) -> Option<PaymentComparison> {
    let find = |name: &str| rows.iter().find(|r| r.segment.eq_ignore_ascii_case(name));
    let cod = find("COD")?;
    let prepaid = find("PREPAID")?;
    Some(PaymentComparison {
        delivery_gap: (prepaid.avg_delivery_rate - cod.avg_delivery_rate).abs(),
        cod: segment_rate(cod),
        prepaid: segment_rate(prepaid),
    })
}

pub fn executive_summary(
    day_buckets: &[AggregateBucket<()>],
    payment_summary: &[EarlyWindowRow],
    zone_summary: &[EarlyWindowRow],
    courier_summary: &[EarlyWindowRow],
    diagnostics: &LoadDiagnostics,
    as_of: NaiveDate,
) -> SummaryStats {
    let breach_cases: usize = day_buckets.iter().map(|b| b.counts.total).sum();
    let delivered: usize = day_buckets.iter().map(|b| b.counts.delivered).sum();
    let total_rto: usize = day_buckets.iter().map(|b| b.counts.rto).sum();
    let max_days_after_breach = day_buckets.iter().filter_map(|b| b.day).max().unwrap_or(0);
    let (best_zone, worst_zone) = best_and_worst(zone_summary);
    let (best_courier, worst_courier) = best_and_worst(courier_summary);

    SummaryStats {
        processing_date: as_of,
        total_rows: diagnostics.total_rows,
        analyzed_rows: diagnostics.analyzed_rows,
        missing_edd_rows: diagnostics.missing_edd_rows,
        malformed_rows: diagnostics.malformed_rows,
        coerced_fields: diagnostics.coerced_fields,
        breach_cases,
        overall_delivery_rate: percentage(delivered, breach_cases),
        total_rto,
        overall_rto_rate: percentage(total_rto, breach_cases),
        max_days_after_breach,
        payment_comparison: payment_comparison(payment_summary),
        best_zone,
        worst_zone,
        best_courier,
        worst_courier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CategoryCounts;
    use crate::types::TrackingStatus;

    fn rec(pickup: &str, drop: &str, day: u32, category: ShipmentCategory) -> ShipmentRecord {
        ShipmentRecord {
            first_attempt_date: None,
            courier_expected_delivery_date: None,
            fallback_expected_delivery_date: None,
            delivered_date: None,
            tracking_status: TrackingStatus::Other,
            payment_method: "COD".into(),
            applied_zone: "A".into(),
            pickup_state: pickup.into(),
            delivery_state: drop.into(),
            parent_courier_name: "Swift".into(),
            effective_expected_delivery_date: None,
            shipment_category: category,
            tat_breach: true,
            days_after_breach: Some(day),
        }
    }

    fn bucket(key: &str, day: u32, delivered: usize, total: usize) -> AggregateBucket<String> {
        let counts = CategoryCounts {
            total,
            delivered,
            rto: total - delivered,
            ..CategoryCounts::default()
        };
        AggregateBucket {
            key: key.to_string(),
            day: Some(day),
            delivery_percentage: counts.delivery_percentage(),
            rto_rate: counts.rto_rate(),
            counts,
            drop_in_delivery_percentage: None,
        }
    }

    #[test]
    fn performance_tier_boundaries() {
        assert_eq!(performance_category(100.0), PerformanceCategory::Excellent);
        assert_eq!(performance_category(80.0), PerformanceCategory::Excellent);
        assert_eq!(performance_category(79.99), PerformanceCategory::Good);
        assert_eq!(performance_category(60.0), PerformanceCategory::Good);
        assert_eq!(performance_category(40.0), PerformanceCategory::Average);
        assert_eq!(performance_category(39.99), PerformanceCategory::Poor);
        assert_eq!(performance_category(0.0), PerformanceCategory::Poor);
    }

    #[test]
    fn route_kept_by_volume_or_rank() {
        let mut data = Vec::new();
        for i in 0..5 {
            for _ in 0..12 {
                data.push(rec(&format!("HV{i}"), "X", 1, ShipmentCategory::Delivered));
            }
        }
        for i in 0..20 {
            data.push(rec(&format!("LV{i:02}"), "X", 2, ShipmentCategory::Rto));
        }
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let rows = route_performance_report(&refs, &AnalysisConfig::default());
        assert_eq!(rows.len(), 25);

        // Beyond 20 low-volume routes only the busiest 20 of them survive.
        for i in 20..30 {
            data.push(rec(&format!("LV{i:02}"), "X", 2, ShipmentCategory::Rto));
        }
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let rows = route_performance_report(&refs, &AnalysisConfig::default());
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0].pickup_state, "HV0");
        assert_eq!(rows[0].volume_rank, 1);
        assert_eq!(rows[5].pickup_state, "LV00");
        assert_eq!(rows.last().map(|r| r.pickup_state.as_str()), Some("LV19"));
        assert_eq!(rows.last().map(|r| r.volume_rank), Some(25));
    }

    #[test]
    fn top_n_only_limits_low_volume_routes() {
        let cfg = AnalysisConfig {
            route_top_n: 1,
            ..AnalysisConfig::default()
        };
        let mut data = Vec::new();
        for _ in 0..15 {
            data.push(rec("KA", "MH", 1, ShipmentCategory::Delivered));
        }
        for _ in 0..10 {
            data.push(rec("DL", "UP", 1, ShipmentCategory::Rto));
        }
        data.push(rec("GJ", "RJ", 1, ShipmentCategory::Rto));
        data.push(rec("GJ", "RJ", 1, ShipmentCategory::Rto));
        data.push(rec("TN", "KL", 1, ShipmentCategory::Rto));
        let refs: Vec<&ShipmentRecord> = data.iter().collect();

        let rows = route_performance_report(&refs, &cfg);
        let kept: Vec<&str> = rows.iter().map(|r| r.pickup_state.as_str()).collect();
        assert_eq!(kept, vec!["KA", "DL", "GJ"]);
        assert_eq!(rows[0].performance_category, PerformanceCategory::Excellent);
        assert_eq!(rows[1].performance_category, PerformanceCategory::Poor);
    }

    #[test]
    fn avg_days_to_delivery_uses_delivered_only() {
        let data = vec![
            rec("KA", "MH", 2, ShipmentCategory::Delivered),
            rec("KA", "MH", 6, ShipmentCategory::Delivered),
            rec("KA", "MH", 40, ShipmentCategory::Rto),
            rec("DL", "UP", 3, ShipmentCategory::Undelivered),
        ];
        let refs: Vec<&ShipmentRecord> = data.iter().collect();
        let rows = route_performance_report(&refs, &AnalysisConfig::default());

        assert_eq!(rows[0].pickup_state, "KA");
        assert_eq!(rows[0].avg_days_to_delivery, Some(4.0));
        assert_eq!(rows[1].avg_days_to_delivery, None);
    }

    #[test]
    fn early_window_ignores_later_days_and_averages_rates() {
        let buckets = vec![
            bucket("COD", 1, 1, 2),
            bucket("COD", 5, 1, 1),
            bucket("COD", 6, 0, 50),
            bucket("PREPAID", 2, 3, 4),
        ];
        let rows = early_window(&buckets, 5, "payment_method", String::clone);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].segment, "COD");
        assert_eq!(rows[0].total_shipments, 3);
        assert_eq!(rows[0].total_delivered, 2);
        assert_eq!(rows[0].avg_delivery_rate, 75.0);
        assert_eq!(rows[1].avg_rto_rate, 25.0);
    }

    fn route_bucket(pickup: &str, drop: &str, day: u32, delivered: usize, total: usize) -> AggregateBucket<Route> {
        let b = bucket(pickup, day, delivered, total);
        AggregateBucket {
            key: (pickup.to_string(), drop.to_string()),
            day: b.day,
            counts: b.counts,
            delivery_percentage: b.delivery_percentage,
            rto_rate: b.rto_rate,
            drop_in_delivery_percentage: None,
        }
    }

    #[test]
    fn route_summary_keeps_state_columns_and_ranks_by_volume() {
        let buckets = vec![
            route_bucket("DL", "UP", 1, 1, 2),
            route_bucket("KA", "MH", 1, 2, 4),
            route_bucket("KA", "MH", 7, 0, 40),
            route_bucket("GJ", "RJ", 2, 1, 2),
            route_bucket("TN", "KL", 3, 1, 1),
        ];
        let rows = route_early_window(&buckets, 5, 3);

        let view: Vec<(&str, &str, usize)> = rows
            .iter()
            .map(|r| (r.pickup_state.as_str(), r.delivery_state.as_str(), r.total_shipments))
            .collect();
        assert_eq!(view, vec![("KA", "MH", 4), ("DL", "UP", 2), ("GJ", "RJ", 2)]);
        assert_eq!(rows[0].avg_delivery_rate, 50.0);
    }

    #[test]
    fn best_and_worst_break_ties_lexically() {
        let buckets = vec![
            bucket("North", 1, 1, 2),
            bucket("East", 1, 1, 2),
            bucket("South", 1, 2, 2),
        ];
        let rows = early_window(&buckets, 5, "applied_zone", String::clone);
        let (best, worst) = best_and_worst(&rows);
        assert_eq!(best.map(|s| s.segment), Some("South".to_string()));
        assert_eq!(worst.map(|s| s.segment), Some("East".to_string()));
    }

    #[test]
    fn payment_gap_needs_both_methods() {
        let both = early_window(
            &[bucket("COD", 1, 1, 2), bucket("Prepaid", 1, 4, 5)],
            5,
            "payment_method",
            String::clone,
        );
        let cmp = payment_comparison(&both).unwrap();
        assert!((cmp.delivery_gap - 30.0).abs() < 1e-9);

        let cod_only = early_window(&[bucket("COD", 1, 1, 2)], 5, "payment_method", String::clone);
        assert!(payment_comparison(&cod_only).is_none());
    }
}
