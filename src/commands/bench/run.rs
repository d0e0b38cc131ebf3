use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use super::coordinator::BenchContext;
use super::ground_truth::GroundTruth;
use super::metrics::{compute_accuracy, compute_summary};
use super::orchestrator::{ImageJob, run_corpus};
use super::report::{ReportContext, write_per_item_csv, write_report_md};
use super::sampler::{DEFAULT_SAMPLE_INTERVAL, ResourceSampler};
use crate::backends::{BackendSettings, CREDENTIAL_KEYS, build_backends};
use crate::cli::BenchArgs;
use crate::commands::inventory::{discover_images, image_filename};
use crate::model::{DatasetInfo, RunArtifacts, RunConfigSnapshot, RunSummaryManifest};
use crate::util::{
    ensure_directory, now_utc_string, utc_compact_string, validate_run_id, write_json_pretty,
};

const SUMMARY_MANIFEST_VERSION: u32 = 1;

pub fn run(args: BenchArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_bench(args))
}

async fn run_bench(args: BenchArgs) -> Result<()> {
    let started_at = now_utc_string();
    let run_id = match args.run_id.clone() {
        Some(run_id) => validate_run_id(&run_id)?,
        None => format!("run-{}", utc_compact_string(Utc::now())),
    };

    if !args.input_dir.is_dir() {
        bail!("input directory not found: {}", args.input_dir.display());
    }

    let mut image_paths = discover_images(&args.input_dir)?;
    if let Some(limit) = args.limit {
        image_paths.truncate(limit);
    }
    if image_paths.is_empty() {
        bail!("no images found to process in {}", args.input_dir.display());
    }

    let images = image_paths
        .into_iter()
        .map(|path| {
            Ok(ImageJob {
                filename: image_filename(&path)?,
                path,
            })
        })
        .collect::<Result<Vec<ImageJob>>>()?;

    let run_dir = args.output_root.join(&run_id);
    ensure_directory(&run_dir)?;

    let ground_truth = GroundTruth::load(&args.manifest_path)?;
    let settings = BackendSettings::from_env();
    let backends = build_backends(&args.backends, &settings)?;
    let ctx = Arc::new(BenchContext::new(backends, args.ensemble)?);
    let backend_names = ctx.backend_order();
    let workers = args.workers.max(1);

    info!(
        run_id = %run_id,
        input_dir = %args.input_dir.display(),
        images = images.len(),
        backends = %backend_names.join(","),
        workers,
        ensemble = args.ensemble.as_str(),
        "starting benchmark"
    );

    let mut sampler = ResourceSampler::new(DEFAULT_SAMPLE_INTERVAL);
    let clock = Instant::now();
    sampler.start();
    let rows = run_corpus(Arc::clone(&ctx), images, workers).await;
    sampler.stop().await;
    let total_wall_sec = clock.elapsed().as_secs_f64();

    let accuracy = compute_accuracy(&rows, &ground_truth, &backend_names);
    let metrics = compute_summary(&rows, &backend_names, total_wall_sec, accuracy);
    let system = sampler.summary();

    let per_item_path = run_dir.join("per_item.csv");
    let summary_path = run_dir.join("summary.json");
    let report_path = run_dir.join("report.md");

    write_per_item_csv(&per_item_path, &rows, &backend_names)?;

    let manifest_present = args.manifest_path.exists();
    let summary = RunSummaryManifest {
        manifest_version: SUMMARY_MANIFEST_VERSION,
        run_id: run_id.clone(),
        started_at,
        completed_at: now_utc_string(),
        config: RunConfigSnapshot {
            input_dir: args.input_dir.display().to_string(),
            limit: args.limit,
            backends: backend_names.clone(),
            workers,
            ensemble: args.ensemble,
        },
        dataset: DatasetInfo {
            images_processed: rows.len(),
            manifest_path: args.manifest_path.display().to_string(),
            manifest_present,
            manifest_rows_loaded: ground_truth.len(),
        },
        metrics,
        system,
        artifacts: RunArtifacts {
            per_item_csv: per_item_path.display().to_string(),
            summary_json: summary_path.display().to_string(),
            report_md: report_path.display().to_string(),
        },
    };
    write_json_pretty(&summary_path, &summary)?;

    let report_ctx = ReportContext {
        run_id: &run_id,
        generated_at: now_utc_string(),
        run_dir: &run_dir,
        input_dir: &args.input_dir,
        backend_names: &backend_names,
        workers,
        strategy: args.ensemble,
        manifest_present,
        credentials: CREDENTIAL_KEYS
            .iter()
            .map(|key| (*key, settings.get(key).is_some()))
            .collect(),
    };
    write_report_md(&report_path, &report_ctx, &rows, &summary.metrics, &system)?;

    info!(
        run_id = %run_id,
        run_dir = %run_dir.display(),
        items = summary.metrics.total_items,
        wall_time_sec = summary.metrics.total_wall_time_sec,
        throughput = summary.metrics.throughput_items_per_sec,
        "benchmark complete"
    );

    Ok(())
}
