use crate::util::{display_delta, display_opt_days, display_pct};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Columns the input table must carry, in the order they are reported when
/// missing.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "first_attempt_date",
    "final_courier_edd",
    "rapidshyp_edd",
    "delivered_date",
    "tracking_status_group",
    "payment_method",
    "applied_zone",
    "pickup_state",
    "delivery_state",
    "parent_courier_name",
];

/// One input row, exactly as read. Every field stays textual until the
/// normalizer has looked at it; extra columns are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    pub first_attempt_date: Option<String>,
    #[serde(rename = "final_courier_edd")]
    pub courier_edd: Option<String>,
    #[serde(rename = "rapidshyp_edd")]
    pub fallback_edd: Option<String>,
    pub delivered_date: Option<String>,
    #[serde(rename = "tracking_status_group")]
    pub tracking_status: Option<String>,
    pub payment_method: Option<String>,
    pub applied_zone: Option<String>,
    pub pickup_state: Option<String>,
    pub delivery_state: Option<String>,
    pub parent_courier_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackingStatus {
    Delivered,
    Rto,
    DamageOrLost,
    Manifested,
    Other,
}

impl From<&str> for TrackingStatus {
    fn from(s: &str) -> Self {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "delivered" => TrackingStatus::Delivered,
            "rto" => TrackingStatus::Rto,
            "damagelost" | "damageorlost" | "damagedlost" => TrackingStatus::DamageOrLost,
            "manifested" => TrackingStatus::Manifested,
            _ => TrackingStatus::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShipmentCategory {
    Delivered,
    #[serde(rename = "RTO")]
    Rto,
    #[serde(rename = "Damage/Lost")]
    DamageOrLost,
    Undelivered,
    Other,
}

/// A normalized and classified shipment. Built once by
/// [`crate::classify::classify_row`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ShipmentRecord {
    pub first_attempt_date: Option<NaiveDate>,
    pub courier_expected_delivery_date: Option<NaiveDate>,
    pub fallback_expected_delivery_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub tracking_status: TrackingStatus,
    pub payment_method: String,
    pub applied_zone: String,
    pub pickup_state: String,
    pub delivery_state: String,
    pub parent_courier_name: String,

    pub effective_expected_delivery_date: Option<NaiveDate>,
    pub shipment_category: ShipmentCategory,
    pub tat_breach: bool,
    /// Present iff `tat_breach`; always >= 1.
    pub days_after_breach: Option<u32>,
}

impl ShipmentRecord {
    pub fn has_reference_date(&self) -> bool {
        self.effective_expected_delivery_date.is_some()
    }

    pub fn route(&self) -> (String, String) {
        (self.pickup_state.clone(), self.delivery_state.clone())
    }
}

/// Counters gathered while reading and normalizing the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadDiagnostics {
    pub total_rows: usize,
    pub malformed_rows: usize,
    pub coerced_fields: usize,
    pub missing_edd_rows: usize,
    pub analyzed_rows: usize,
    pub breach_cases: usize,
    pub batches_read: usize,
    pub compactions: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct DaywiseRow {
    #[tabled(rename = "Days After TAT")]
    pub days_after_breach: u32,
    #[tabled(rename = "Total Shipments")]
    pub total_shipments: usize,
    #[tabled(skip)]
    pub successful_deliveries: usize,
    #[tabled(skip)]
    pub failed_deliveries: usize,
    #[tabled(rename = "Delivered")]
    pub delivered_count: usize,
    #[tabled(rename = "RTO")]
    pub rto_count: usize,
    #[tabled(rename = "Damage/Lost")]
    pub damage_lost_count: usize,
    #[tabled(rename = "Undelivered")]
    pub undelivered_count: usize,
    #[tabled(skip)]
    pub other_count: usize,
    #[tabled(rename = "Delivery Rate", display_with = "display_pct")]
    pub delivery_percentage: f64,
    #[tabled(rename = "RTO Rate", display_with = "display_pct")]
    pub rto_rate: f64,
    #[tabled(rename = "Daily Change", display_with = "display_delta")]
    pub drop_in_delivery_percentage: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaymentMethodRow {
    pub payment_method: String,
    pub days_after_breach: u32,
    pub total_shipments: usize,
    pub successful_deliveries: usize,
    pub delivered_count: usize,
    pub rto_count: usize,
    pub damage_lost_count: usize,
    pub undelivered_count: usize,
    pub other_count: usize,
    pub delivery_percentage: f64,
    pub rto_rate: f64,
    pub drop_in_delivery_percentage: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ZoneRow {
    pub applied_zone: String,
    pub days_after_breach: u32,
    pub total_shipments: usize,
    pub successful_deliveries: usize,
    pub delivered_count: usize,
    pub rto_count: usize,
    pub damage_lost_count: usize,
    pub undelivered_count: usize,
    pub other_count: usize,
    pub delivery_percentage: f64,
    pub rto_rate: f64,
    pub drop_in_delivery_percentage: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CourierRow {
    pub parent_courier_name: String,
    pub days_after_breach: u32,
    pub total_shipments: usize,
    pub successful_deliveries: usize,
    pub delivered_count: usize,
    pub rto_count: usize,
    pub damage_lost_count: usize,
    pub undelivered_count: usize,
    pub other_count: usize,
    pub delivery_percentage: f64,
    pub rto_rate: f64,
    pub drop_in_delivery_percentage: Option<f64>,
}

/// Route x day bucket. No delta column: routes are compared by the
/// route-only performance report instead.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RouteDayRow {
    pub pickup_state: String,
    pub delivery_state: String,
    pub days_after_breach: u32,
    pub total_shipments: usize,
    pub successful_deliveries: usize,
    pub delivered_count: usize,
    pub rto_count: usize,
    pub damage_lost_count: usize,
    pub undelivered_count: usize,
    pub other_count: usize,
    pub delivery_percentage: f64,
    pub rto_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceCategory {
    Excellent,
    Good,
    Average,
    Poor,
}

impl std::fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PerformanceCategory::Excellent => "Excellent",
            PerformanceCategory::Good => "Good",
            PerformanceCategory::Average => "Average",
            PerformanceCategory::Poor => "Poor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct RoutePerformanceRow {
    #[tabled(rename = "Rank")]
    pub volume_rank: usize,
    #[tabled(rename = "Pickup State")]
    pub pickup_state: String,
    #[tabled(rename = "Delivery State")]
    pub delivery_state: String,
    #[tabled(rename = "Total Shipments")]
    pub total_shipments: usize,
    #[tabled(rename = "Delivered")]
    pub delivered_count: usize,
    #[tabled(rename = "RTO")]
    pub rto_count: usize,
    #[tabled(skip)]
    pub damage_lost_count: usize,
    #[tabled(skip)]
    pub undelivered_count: usize,
    #[tabled(skip)]
    pub other_count: usize,
    #[tabled(rename = "Delivery Rate", display_with = "display_pct")]
    pub delivery_percentage: f64,
    #[tabled(rename = "RTO Rate", display_with = "display_pct")]
    pub rto_rate: f64,
    #[tabled(rename = "Avg Days To Delivery", display_with = "display_opt_days")]
    pub avg_days_to_delivery: Option<f64>,
    #[tabled(rename = "Performance")]
    pub performance_category: PerformanceCategory,
}

/// Early-window roll-up of one segment of a day-keyed report.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct EarlyWindowRow {
    #[tabled(rename = "Dimension")]
    pub dimension: String,
    #[tabled(rename = "Segment")]
    pub segment: String,
    #[tabled(rename = "Total Shipments")]
    pub total_shipments: usize,
    #[tabled(rename = "Delivered")]
    pub total_delivered: usize,
    #[tabled(rename = "RTO")]
    pub total_rto: usize,
    #[tabled(rename = "Avg Delivery Rate", display_with = "display_pct")]
    pub avg_delivery_rate: f64,
    #[tabled(rename = "Avg RTO Rate", display_with = "display_pct")]
    pub avg_rto_rate: f64,
}

/// Early-window roll-up of one route, with the same state columns as the
/// other route tables.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct RouteSummaryRow {
    #[tabled(rename = "Pickup State")]
    pub pickup_state: String,
    #[tabled(rename = "Delivery State")]
    pub delivery_state: String,
    #[tabled(rename = "Total Shipments")]
    pub total_shipments: usize,
    #[tabled(rename = "Delivered")]
    pub total_delivered: usize,
    #[tabled(rename = "RTO")]
    pub total_rto: usize,
    #[tabled(rename = "Avg Delivery Rate", display_with = "display_pct")]
    pub avg_delivery_rate: f64,
    #[tabled(rename = "Avg RTO Rate", display_with = "display_pct")]
    pub avg_rto_rate: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SegmentRate {
    pub segment: String,
    pub avg_delivery_rate: f64,
    pub avg_rto_rate: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaymentComparison {
    pub cod: SegmentRate,
    pub prepaid: SegmentRate,
    pub delivery_gap: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SummaryStats {
    pub processing_date: NaiveDate,
    pub total_rows: usize,
    pub analyzed_rows: usize,
    pub missing_edd_rows: usize,
    pub malformed_rows: usize,
    pub coerced_fields: usize,
    pub breach_cases: usize,
    pub overall_delivery_rate: f64,
    pub total_rto: usize,
    pub overall_rto_rate: f64,
    pub max_days_after_breach: u32,
    pub payment_comparison: Option<PaymentComparison>,
    pub best_zone: Option<SegmentRate>,
    pub worst_zone: Option<SegmentRate>,
    pub best_courier: Option<SegmentRate>,
    pub worst_courier: Option<SegmentRate>,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub diagnostics: LoadDiagnostics,
    pub daywise: Vec<DaywiseRow>,
    pub payment_method: Vec<PaymentMethodRow>,
    pub zone: Vec<ZoneRow>,
    pub route_daywise: Vec<RouteDayRow>,
    pub route_performance: Vec<RoutePerformanceRow>,
    pub courier: Vec<CourierRow>,
    pub daywise_summary: Vec<EarlyWindowRow>,
    pub payment_summary: Vec<EarlyWindowRow>,
    pub zone_summary: Vec<EarlyWindowRow>,
    pub route_summary: Vec<RouteSummaryRow>,
    pub courier_summary: Vec<EarlyWindowRow>,
    pub summary: SummaryStats,
}

/// Result handed back to the caller. An input without a single breach is a
/// valid result, not an error.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    NoBreachCases { diagnostics: LoadDiagnostics },
    Report(Box<AnalysisReport>),
}

impl AnalysisOutcome {
    /// Load counters, present for either outcome.
    pub fn diagnostics(&self) -> &LoadDiagnostics {
        match self {
            AnalysisOutcome::NoBreachCases { diagnostics } => diagnostics,
            AnalysisOutcome::Report(report) => &report.diagnostics,
        }
    }
}
