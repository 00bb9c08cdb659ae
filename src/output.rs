use crate::error::{AnalysisError, AnalysisResult};
use crate::types::AnalysisReport;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::{debug, info};

fn output_error(path: &Path) -> impl FnOnce(std::io::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Output {
        path: path.display().to_string(),
        source,
    }
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> AnalysisResult<()> {
    let file = File::create(path).map_err(output_error(path))?;
    let mut wtr = csv::Writer::from_writer(file);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(output_error(path))?;
    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> AnalysisResult<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(output_error(path))?;
    Ok(())
}

/// Writes every table of `report` as `<base>_<table>.csv` plus
/// `<base>_summary.json` into `out_dir`, creating it if needed. Returns the
/// written paths in a fixed order.
pub fn write_bundle(out_dir: &Path, base: &str, report: &AnalysisReport) -> AnalysisResult<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir).map_err(output_error(out_dir))?;
    let mut written = Vec::new();
    macro_rules! table {
        ($name:expr, $rows:expr) => {{
            let path = out_dir.join(format!("{}_{}.csv", base, $name));
            write_csv(&path, $rows)?;
            written.push(path);
        }};
    }

    table!("daywise_analysis", &report.daywise);
    table!("payment_method_analysis", &report.payment_method);
    table!("zone_performance_analysis", &report.zone);
    table!("route_daywise_analysis", &report.route_daywise);
    table!("route_performance_analysis", &report.route_performance);
    table!("courier_performance_analysis", &report.courier);
    table!("daywise_summary", &report.daywise_summary);
    table!("payment_summary", &report.payment_summary);
    table!("zone_summary", &report.zone_summary);
    table!("route_summary", &report.route_summary);
    table!("courier_summary", &report.courier_summary);

    let summary_path = out_dir.join(format!("{}_summary.json", base));
    write_json(&summary_path, &report.summary)?;
    written.push(summary_path);

    info!(out_dir = %out_dir.display(), files = written.len(), "Report bundle written");
    Ok(written)
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
