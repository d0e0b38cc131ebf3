use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::EnsembleStrategy;
use crate::model::{BackendStats, ImageRow, ParsedFields, RunSummary, SamplerSummary};
use crate::util::round_to;

const SLOWEST_LIMIT: usize = 10;

const PER_BACKEND_COLUMNS: [&str; 7] = [
    "status",
    "latency_sec",
    "text_len",
    "origin_country",
    "materials",
    "co2_total_kg",
    "error",
];

const ENSEMBLE_COLUMNS: [&str; 8] = [
    "ensemble_strategy",
    "ensemble_status",
    "ensemble_latency_sec",
    "ensemble_source_backend",
    "ensemble_origin_country",
    "ensemble_materials",
    "ensemble_co2_total_kg",
    "ensemble_error",
];

pub fn per_item_header(backend_names: &[String]) -> Vec<String> {
    let mut header = vec!["filename".to_string()];
    for name in backend_names {
        header.extend(
            PER_BACKEND_COLUMNS
                .iter()
                .map(|column| format!("{name}_{column}")),
        );
    }
    header.extend(ENSEMBLE_COLUMNS.iter().map(|column| column.to_string()));
    header
}

fn co2_cell(fields: &ParsedFields) -> String {
    fields
        .co2_total_kg
        .map(|value| value.to_string())
        .unwrap_or_default()
}

pub fn write_per_item_csv(path: &Path, rows: &[ImageRow], backend_names: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer
        .write_record(per_item_header(backend_names))
        .with_context(|| format!("failed to write header to {}", path.display()))?;

    let missing = ParsedFields::default();
    for row in rows {
        let mut record = vec![row.filename.clone()];

        for name in backend_names {
            let fields = row.parsed.get(name).unwrap_or(&missing);
            match row.backend_results.get(name) {
                Some(result) => record.extend([
                    result.status.as_str().to_string(),
                    round_to(result.latency_seconds, 4).to_string(),
                    result.text.chars().count().to_string(),
                ]),
                None => record.extend([String::new(), "0".to_string(), "0".to_string()]),
            }
            record.extend([
                fields.origin_country.clone(),
                fields.materials.join(";"),
                co2_cell(fields),
                row.backend_results
                    .get(name)
                    .map(|result| result.error.clone())
                    .unwrap_or_default(),
            ]);
        }

        let ensemble = &row.ensemble;
        record.extend([
            ensemble.strategy.as_str().to_string(),
            ensemble.status.as_str().to_string(),
            round_to(ensemble.latency_seconds, 4).to_string(),
            ensemble.source_backend.clone(),
            ensemble.fields.origin_country.clone(),
            ensemble.fields.materials.join(";"),
            co2_cell(&ensemble.fields),
            ensemble.error.clone(),
        ]);

        writer
            .write_record(&record)
            .with_context(|| format!("failed to write row for {}", row.filename))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

/// Run-level facts the markdown report needs besides the rows and metrics.
pub struct ReportContext<'a> {
    pub run_id: &'a str,
    pub generated_at: String,
    pub run_dir: &'a Path,
    pub input_dir: &'a Path,
    pub backend_names: &'a [String],
    pub workers: usize,
    pub strategy: EnsembleStrategy,
    pub manifest_present: bool,
    pub credentials: Vec<(&'static str, bool)>,
}

pub fn write_report_md(
    path: &Path,
    ctx: &ReportContext<'_>,
    rows: &[ImageRow],
    summary: &RunSummary,
    system: &SamplerSummary,
) -> Result<()> {
    let body = render_report(ctx, rows, summary, system)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

pub fn render_report(
    ctx: &ReportContext<'_>,
    rows: &[ImageRow],
    summary: &RunSummary,
    system: &SamplerSummary,
) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "# Benchmark Report ({})", ctx.run_id)?;
    writeln!(out)?;
    writeln!(out, "## Environment")?;
    writeln!(out, "- Timestamp: {}", ctx.generated_at)?;
    writeln!(out, "- Engine: {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(
        out,
        "- Platform: {}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )?;
    for (key, present) in &ctx.credentials {
        writeln!(out, "- {key} set: {present}")?;
    }
    writeln!(out)?;

    writeln!(out, "## Dataset")?;
    writeln!(out, "- Input dir: `{}`", ctx.input_dir.display())?;
    writeln!(out, "- Images processed: {}", rows.len())?;
    writeln!(out, "- Manifest used: {}", ctx.manifest_present)?;
    writeln!(out)?;

    writeln!(out, "## Methodology")?;
    writeln!(out, "- Backends: {}", ctx.backend_names.join(", "))?;
    writeln!(
        out,
        "- Per-image backend concurrency: {}",
        super::coordinator::BACKEND_CONCURRENCY_PER_IMAGE
    )?;
    writeln!(out, "- Image-level workers: {}", ctx.workers)?;
    writeln!(out, "- Ensemble mode: {}", ctx.strategy.as_str())?;
    writeln!(out, "- Ensemble latency: max(backend latencies) per image")?;
    writeln!(out)?;

    writeln!(out, "## Results")?;
    writeln!(
        out,
        "| Backend | OCR Success % | Field Success % | Avg Latency (s) | P95 Latency (s) |"
    )?;
    writeln!(out, "|---|---:|---:|---:|---:|")?;
    for stats in &summary.by_backend {
        writeln!(
            out,
            "| {} | {:.2} | {:.2} | {:.4} | {:.4} |",
            stats.name,
            stats.ocr_success_rate,
            stats.field_success_rate,
            stats.avg_latency_sec,
            stats.p95_latency_sec
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "- Throughput: {:.4} items/sec",
        summary.throughput_items_per_sec
    )?;
    writeln!(out, "- Total wall time: {:.4} sec", summary.total_wall_time_sec)?;
    writeln!(out, "- CPU avg: {:.3}%", system.cpu_avg_percent)?;
    writeln!(out, "- Peak RSS: {:.3} MB", system.peak_rss_mb)?;
    writeln!(out)?;

    if summary.accuracy.enabled {
        writeln!(out, "### Accuracy")?;
        writeln!(
            out,
            "| Backend | N | Origin Exact % | Materials Exact-Set % | Doc-Correct % |"
        )?;
        writeln!(out, "|---|---:|---:|---:|---:|")?;
        for stats in &summary.accuracy.by_backend {
            writeln!(
                out,
                "| {} | {} | {:.2} | {:.2} | {:.2} |",
                stats.name,
                stats.n,
                stats.origin_exact_pct,
                stats.materials_exact_set_pct,
                stats.doc_correct_pct
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Key Takeaways")?;
    if !rows.is_empty() {
        if let Some(fastest) = fastest_backend(&summary.by_backend) {
            writeln!(out, "- Fastest average latency: `{}`.", fastest.name)?;
        }
        if let Some(best) = best_field_backend(&summary.by_backend) {
            writeln!(out, "- Highest field-success rate: `{}`.", best.name)?;
        }
        writeln!(out, "- Outputs written to: `{}`", ctx.run_dir.display())?;
    }
    writeln!(out)?;

    writeln!(out, "## Failure Cases")?;
    writeln!(out, "### Slowest {SLOWEST_LIMIT} by Ensemble Latency")?;
    writeln!(out, "| Filename | Ensemble Latency (s) | Ensemble Status |")?;
    writeln!(out, "|---|---:|---|")?;
    for row in slowest_rows(rows, SLOWEST_LIMIT) {
        writeln!(
            out,
            "| {} | {:.4} | {} |",
            row.filename,
            row.ensemble.latency_seconds,
            row.ensemble.status.as_str()
        )?;
    }
    writeln!(out)?;

    writeln!(out, "### Backend Failures")?;
    writeln!(out, "| Filename | Backend | Status | Error |")?;
    writeln!(out, "|---|---|---|---|")?;
    for row in rows {
        for name in ctx.backend_names {
            let Some(result) = row.backend_results.get(name) else {
                continue;
            };
            if result.is_success() {
                continue;
            }
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                row.filename,
                name,
                result.status.as_str(),
                result.error.replace('|', " ")
            )?;
        }
    }

    Ok(out)
}

/// First entry wins ties, so backends are preferred over the ensemble row.
fn fastest_backend(stats: &[BackendStats]) -> Option<&BackendStats> {
    stats.iter().fold(None, |best, candidate| match best {
        Some(current) if current.avg_latency_sec <= candidate.avg_latency_sec => Some(current),
        _ => Some(candidate),
    })
}

fn best_field_backend(stats: &[BackendStats]) -> Option<&BackendStats> {
    stats.iter().fold(None, |best, candidate| match best {
        Some(current) if current.field_success_rate >= candidate.field_success_rate => {
            Some(current)
        }
        _ => Some(candidate),
    })
}

fn slowest_rows(rows: &[ImageRow], limit: usize) -> Vec<&ImageRow> {
    let mut ordered = rows.iter().collect::<Vec<&ImageRow>>();
    ordered.sort_by(|left, right| {
        right
            .ensemble
            .latency_seconds
            .total_cmp(&left.ensemble.latency_seconds)
    });
    ordered.truncate(limit);
    ordered
}
