//! Analysis configuration.
//!
//! Defaults are tuned for multi-million row exports. Every knob can be
//! overridden from the environment (`TAT_*`, optionally via a `.env` file)
//! and then again from the command line.

use std::str::FromStr;
use tracing::warn;

/// Which event a late delivery is measured against.
///
/// `DeliveredDate` counts days late relative to the actual delivery;
/// `FirstAttempt` uses the first delivery attempt when one was recorded
/// (falling back to the delivery date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveredOffsetBasis {
    #[default]
    DeliveredDate,
    FirstAttempt,
}

impl FromStr for DeliveredOffsetBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "delivered_date" | "delivered" => Ok(DeliveredOffsetBasis::DeliveredDate),
            "first_attempt" | "first_attempt_date" => Ok(DeliveredOffsetBasis::FirstAttempt),
            other => Err(format!("unknown delivered offset basis '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Rows per batch on the batched read path.
    pub batch_size: usize,
    /// Pending batches that trigger a compaction into the combined table.
    pub compaction_threshold: usize,
    /// Inputs smaller than this many bytes are read in a single pass.
    pub small_input_bytes: u64,
    pub route_min_volume: usize,
    pub route_top_n: usize,
    pub route_summary_top_n: usize,
    /// Last day offset (inclusive) of the early-window summaries.
    pub early_window_days: u32,
    pub preview_rows: usize,
    pub delivered_offset_basis: DeliveredOffsetBasis,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            compaction_threshold: 50,
            small_input_bytes: 8 * 1024 * 1024,
            route_min_volume: 10,
            route_top_n: 20,
            route_summary_top_n: 15,
            early_window_days: 5,
            preview_rows: 15,
            delivered_offset_basis: DeliveredOffsetBasis::DeliveredDate,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overlaid with whatever `TAT_*` variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        overlay(&lookup, "TAT_BATCH_SIZE", &mut cfg.batch_size);
        overlay(&lookup, "TAT_COMPACTION_THRESHOLD", &mut cfg.compaction_threshold);
        overlay(&lookup, "TAT_SMALL_INPUT_BYTES", &mut cfg.small_input_bytes);
        overlay(&lookup, "TAT_ROUTE_MIN_VOLUME", &mut cfg.route_min_volume);
        overlay(&lookup, "TAT_ROUTE_TOP_N", &mut cfg.route_top_n);
        overlay(&lookup, "TAT_ROUTE_SUMMARY_TOP_N", &mut cfg.route_summary_top_n);
        overlay(&lookup, "TAT_EARLY_WINDOW_DAYS", &mut cfg.early_window_days);
        overlay(&lookup, "TAT_PREVIEW_ROWS", &mut cfg.preview_rows);
        overlay(&lookup, "TAT_DELIVERED_OFFSET_BASIS", &mut cfg.delivered_offset_basis);
        cfg.sanitize()
    }

    /// Zero-sized batches or thresholds would stall the reader.
    pub fn sanitize(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.compaction_threshold = self.compaction_threshold.max(1);
        self
    }
}

fn overlay<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value = %raw, "Ignoring unparsable config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("TAT_BATCH_SIZE", "500"),
            ("TAT_ROUTE_MIN_VOLUME", "not-a-number"),
            ("TAT_DELIVERED_OFFSET_BASIS", "first-attempt"),
        ]
        .into_iter()
        .collect();
        let cfg = AnalysisConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.route_min_volume, 10);
        assert_eq!(cfg.delivered_offset_basis, DeliveredOffsetBasis::FirstAttempt);
    }

    #[test]
    fn sanitize_lifts_zero_sizes() {
        let cfg = AnalysisConfig {
            batch_size: 0,
            compaction_threshold: 0,
            ..AnalysisConfig::default()
        }
        .sanitize();
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.compaction_threshold, 1);
    }
}
