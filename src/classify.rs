//! Field normalization, TAT-breach classification and day offsets.
//!
//! All rules funnel through [`assess`], a pure function of the tracking
//! status, the event dates, the effective EDD and the processing date.

use crate::config::DeliveredOffsetBasis;
use crate::types::{RawRow, ShipmentCategory, ShipmentRecord, TrackingStatus};
use crate::util::{days_diff, label_or, parse_date_field, DateField};
use chrono::NaiveDate;
use tracing::{debug, info};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDates {
    pub first_attempt: Option<NaiveDate>,
    pub delivered: Option<NaiveDate>,
}

/// Which event decided the breach check for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachEvent {
    /// Delivered shipment, judged by its delivery date.
    Delivered(NaiveDate),
    /// Judged by the first delivery attempt.
    FirstAttempt(NaiveDate),
    /// No attempt yet; judged by the processing date.
    Pending(NaiveDate),
}

impl BreachEvent {
    pub fn date(self) -> NaiveDate {
        match self {
            BreachEvent::Delivered(d) | BreachEvent::FirstAttempt(d) | BreachEvent::Pending(d) => d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreachAssessment {
    pub tat_breach: bool,
    pub days_after_breach: Option<u32>,
}

/// First matching rule wins:
/// 1. delivered with a delivery date
/// 2. RTO / damage-or-lost with a first attempt
/// 3. no delivery date but a first attempt
/// 4. no first attempt at all
/// Anything else has no deciding event.
pub fn breach_event(status: TrackingStatus, dates: EventDates, as_of: NaiveDate) -> Option<BreachEvent> {
    use TrackingStatus::*;
    match (status, dates.delivered, dates.first_attempt) {
        (Delivered, Some(d), _) => Some(BreachEvent::Delivered(d)),
        (Rto | DamageOrLost, _, Some(fa)) => Some(BreachEvent::FirstAttempt(fa)),
        (_, None, Some(fa)) => Some(BreachEvent::FirstAttempt(fa)),
        (_, _, None) => Some(BreachEvent::Pending(as_of)),
        _ => None,
    }
}

/// Terminal category, independent of breach status.
pub fn categorize(status: TrackingStatus, delivered: Option<NaiveDate>) -> ShipmentCategory {
    match status {
        TrackingStatus::Delivered => ShipmentCategory::Delivered,
        TrackingStatus::Rto => ShipmentCategory::Rto,
        TrackingStatus::DamageOrLost => ShipmentCategory::DamageOrLost,
        TrackingStatus::Manifested => ShipmentCategory::Undelivered,
        TrackingStatus::Other if delivered.is_none() => ShipmentCategory::Undelivered,
        TrackingStatus::Other => ShipmentCategory::Other,
    }
}

/// Breach flag and day offset for one record.
///
/// A breach needs a reference date and a deciding event strictly after it
/// (calendar days, so same-day is on time). The offset is measured from the
/// same event, except that `FirstAttempt` basis measures delivered
/// shipments from their first attempt when one exists. Offsets are clamped
/// to at least 1 and never capped.
pub fn assess(
    status: TrackingStatus,
    dates: EventDates,
    effective_edd: Option<NaiveDate>,
    as_of: NaiveDate,
    basis: DeliveredOffsetBasis,
) -> BreachAssessment {
    let Some(edd) = effective_edd else {
        return BreachAssessment::default();
    };
    let Some(event) = breach_event(status, dates, as_of) else {
        return BreachAssessment::default();
    };
    if event.date() <= edd {
        return BreachAssessment::default();
    }

    let measured_from = match (event, basis) {
        (BreachEvent::Delivered(d), DeliveredOffsetBasis::FirstAttempt) => {
            dates.first_attempt.unwrap_or(d)
        }
        (event, _) => event.date(),
    };
    let days = days_diff(edd, measured_from).max(1);
    BreachAssessment {
        tat_breach: true,
        days_after_breach: Some(u32::try_from(days).unwrap_or(u32::MAX)),
    }
}

/// Normalizes one raw row and classifies it. Unreadable date cells count
/// towards `coerced` and are treated as absent.
pub fn classify_row(
    raw: &RawRow,
    as_of: NaiveDate,
    basis: DeliveredOffsetBasis,
    coerced: &mut usize,
) -> ShipmentRecord {
    let mut date = |column: &str, value: &Option<String>| match parse_date_field(value.as_deref()) {
        DateField::Parsed(d) => Some(d),
        DateField::Missing => None,
        DateField::Invalid => {
            *coerced += 1;
            debug!(column, value = value.as_deref().unwrap_or(""), "Unparsable date treated as absent");
            None
        }
    };
    let first_attempt_date = date("first_attempt_date", &raw.first_attempt_date);
    let courier_edd = date("final_courier_edd", &raw.courier_edd);
    let fallback_edd = date("rapidshyp_edd", &raw.fallback_edd);
    let delivered_date = date("delivered_date", &raw.delivered_date);

    let tracking_status = TrackingStatus::from(raw.tracking_status.as_deref().unwrap_or(""));
    let effective = courier_edd.or(fallback_edd);
    let dates = EventDates {
        first_attempt: first_attempt_date,
        delivered: delivered_date,
    };
    let assessment = assess(tracking_status, dates, effective, as_of, basis);

    ShipmentRecord {
        first_attempt_date,
        courier_expected_delivery_date: courier_edd,
        fallback_expected_delivery_date: fallback_edd,
        delivered_date,
        tracking_status,
        payment_method: label_or(raw.payment_method.as_deref(), UNKNOWN),
        applied_zone: label_or(raw.applied_zone.as_deref(), UNKNOWN),
        pickup_state: label_or(raw.pickup_state.as_deref(), UNKNOWN),
        delivery_state: label_or(raw.delivery_state.as_deref(), UNKNOWN),
        parent_courier_name: label_or(raw.parent_courier_name.as_deref(), UNKNOWN),
        effective_expected_delivery_date: effective,
        shipment_category: categorize(tracking_status, delivered_date),
        tat_breach: assessment.tat_breach,
        days_after_breach: assessment.days_after_breach,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifiedTable {
    pub records: Vec<ShipmentRecord>,
    pub coerced_fields: usize,
    pub missing_edd_rows: usize,
}

impl ClassifiedTable {
    /// Records with a reference date and a breach, in input order.
    pub fn breach_subset(&self) -> Vec<&ShipmentRecord> {
        self.records.iter().filter(|r| r.tat_breach).collect()
    }
}

/// Classifies every row. Rows without any EDD are kept, tagged by their
/// missing reference date, and never breach.
pub fn classify_all(rows: &[RawRow], as_of: NaiveDate, basis: DeliveredOffsetBasis) -> ClassifiedTable {
    let mut coerced_fields = 0usize;
    let records: Vec<ShipmentRecord> = rows
        .iter()
        .map(|raw| classify_row(raw, as_of, basis, &mut coerced_fields))
        .collect();
    let missing_edd_rows = records.iter().filter(|r| !r.has_reference_date()).count();
    info!(
        rows = records.len(),
        missing_edd_rows,
        coerced_fields,
        %as_of,
        "Records classified"
    );
    ClassifiedTable {
        records,
        coerced_fields,
        missing_edd_rows,
    }
}
