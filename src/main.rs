// Entry point and high-level CLI flow.
//
// One run loads the shipment export, prints the executive summary and
// markdown previews of the main tables, and writes the full bundle of CSV
// tables plus a JSON summary next to each other in the output directory.
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use tat_breach_report::output::{preview_table, write_bundle};
use tat_breach_report::types::{LoadDiagnostics, SummaryStats};
use tat_breach_report::util::{format_int, format_number};
use tat_breach_report::{run_analysis, AnalysisConfig, AnalysisOutcome, AnalysisReport, DeliveredOffsetBasis};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tat_breach_report")]
#[command(about = "Delivery performance report for shipments that breached their TAT", long_about = None)]
struct Cli {
    /// CSV export of shipment delivery events
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory the report bundle is written to
    #[arg(short, long, default_value = "downloads")]
    out_dir: PathBuf,

    /// Processing date (YYYY-MM-DD) used for shipments with no attempt yet; defaults to today
    #[arg(long, value_parser = parse_as_of)]
    as_of: Option<NaiveDate>,

    /// Rows per batch when reading large inputs
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pending batches that trigger a compaction
    #[arg(long)]
    compaction_threshold: Option<usize>,

    /// Minimum breach volume for a route to always be reported
    #[arg(long)]
    route_min_volume: Option<usize>,

    /// Low-volume routes kept by rank
    #[arg(long)]
    route_top_n: Option<usize>,

    /// Last day offset included in the early-window summaries
    #[arg(long)]
    early_window_days: Option<u32>,

    /// Event late deliveries are measured from: delivered-date or first-attempt
    #[arg(long)]
    delivered_offset_basis: Option<DeliveredOffsetBasis>,

    /// Rows shown per console preview (0 disables previews)
    #[arg(long)]
    preview_rows: Option<usize>,
}

impl Cli {
    fn apply(&self, mut cfg: AnalysisConfig) -> AnalysisConfig {
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.compaction_threshold {
            cfg.compaction_threshold = v;
        }
        if let Some(v) = self.route_min_volume {
            cfg.route_min_volume = v;
        }
        if let Some(v) = self.route_top_n {
            cfg.route_top_n = v;
        }
        if let Some(v) = self.early_window_days {
            cfg.early_window_days = v;
        }
        if let Some(v) = self.delivered_offset_basis {
            cfg.delivered_offset_basis = v;
        }
        if let Some(v) = self.preview_rows {
            cfg.preview_rows = v;
        }
        cfg.sanitize()
    }
}

fn parse_as_of(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn print_diagnostics(d: &LoadDiagnostics) {
    println!(
        "Processing dataset... ({} rows loaded, {} with a usable EDD)",
        format_int(d.total_rows),
        format_int(d.analyzed_rows)
    );
    if d.missing_edd_rows > 0 {
        println!("Note: {} rows have no EDD and were excluded.", format_int(d.missing_edd_rows));
    }
    if d.malformed_rows > 0 {
        println!("Note: {} malformed rows skipped.", format_int(d.malformed_rows));
    }
    if d.coerced_fields > 0 {
        println!("Note: {} unreadable date values treated as blank.", format_int(d.coerced_fields));
    }
    println!();
}

fn print_summary(s: &SummaryStats) {
    println!("TAT breach cases (Day 1+): {}", format_int(s.breach_cases));
    println!("Overall delivery rate: {}%", format_number(s.overall_delivery_rate, 2));
    println!(
        "Total RTO cases: {} ({}%)",
        format_int(s.total_rto),
        format_number(s.overall_rto_rate, 1)
    );
    println!("Analysis period: Day 1 to Day {}", s.max_days_after_breach);
    if let Some(p) = &s.payment_comparison {
        println!(
            "COD: {}% delivery, {}% RTO | PREPAID: {}% delivery, {}% RTO | gap {}%",
            format_number(p.cod.avg_delivery_rate, 2),
            format_number(p.cod.avg_rto_rate, 2),
            format_number(p.prepaid.avg_delivery_rate, 2),
            format_number(p.prepaid.avg_rto_rate, 2),
            format_number(p.delivery_gap, 2)
        );
    }
    for (label, seg) in [
        ("Best zone", &s.best_zone),
        ("Worst zone", &s.worst_zone),
        ("Best courier", &s.best_courier),
        ("Worst courier", &s.worst_courier),
    ] {
        if let Some(seg) = seg {
            println!("{}: {} ({}% delivery)", label, seg.segment, format_number(seg.avg_delivery_rate, 2));
        }
    }
    println!();
}

fn print_previews(report: &AnalysisReport, rows: usize, window: u32) {
    if rows == 0 {
        return;
    }
    let note = format!("Days 1-{} summary", window);
    preview_table("Day-wise analysis", Some("Days after TAT breach"), &report.daywise, rows);
    preview_table("Early-window overview", Some(note.as_str()), &report.daywise_summary, rows);
    preview_table("Payment method analysis", Some(note.as_str()), &report.payment_summary, rows);
    preview_table("Zone performance analysis", Some(note.as_str()), &report.zone_summary, rows);
    preview_table("Top route performance analysis", Some(note.as_str()), &report.route_summary, rows);
    preview_table("Route performance", Some("Retained routes by volume"), &report.route_performance, rows);
    preview_table("Parent courier analysis", Some(note.as_str()), &report.courier_summary, rows);
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.apply(AnalysisConfig::from_env());
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());
    info!(input = %cli.input.display(), %as_of, "Starting TAT breach analysis");

    let outcome = run_analysis(&cli.input, as_of, &cfg)
        .with_context(|| format!("analysis of {} failed", cli.input.display()))?;

    print_diagnostics(outcome.diagnostics());
    match outcome {
        AnalysisOutcome::NoBreachCases { .. } => {
            println!("No TAT breach cases found in the dataset.");
        }
        AnalysisOutcome::Report(report) => {
            print_summary(&report.summary);
            print_previews(&report, cfg.preview_rows, cfg.early_window_days);

            let base = cli
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("analysis");
            let files = write_bundle(&cli.out_dir, base, &report)
                .with_context(|| format!("writing report bundle to {}", cli.out_dir.display()))?;
            println!("Results saved to {}:", cli.out_dir.display());
            for f in &files {
                println!("- {}", f.display());
            }
        }
    }
    Ok(())
}
