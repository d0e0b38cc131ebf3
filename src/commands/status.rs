use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::RunSummaryManifest;
use crate::util::validate_run_id;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(output_root = %args.output_root.display(), "status requested");

    let run_dir = match args.run_id.as_deref() {
        Some(run_id) => args.output_root.join(validate_run_id(run_id)?),
        None => match latest_run_dir(&args.output_root)? {
            Some(dir) => dir,
            None => {
                warn!(output_root = %args.output_root.display(), "no benchmark runs found");
                return Ok(());
            }
        },
    };

    let summary_path = run_dir.join("summary.json");
    if !summary_path.exists() {
        bail!("run summary missing: {}", summary_path.display());
    }

    let summary = load_summary(&summary_path)?;
    let metrics = &summary.metrics;

    info!(
        run_id = %summary.run_id,
        started_at = %summary.started_at,
        completed_at = %summary.completed_at,
        backends = %summary.config.backends.join(","),
        workers = summary.config.workers,
        ensemble = summary.config.ensemble.as_str(),
        items = metrics.total_items,
        wall_time_sec = metrics.total_wall_time_sec,
        throughput = metrics.throughput_items_per_sec,
        cpu_avg_percent = summary.system.cpu_avg_percent,
        peak_rss_mb = summary.system.peak_rss_mb,
        "loaded run summary"
    );

    for stats in &metrics.by_backend {
        info!(
            backend = %stats.name,
            n = stats.n,
            ocr_success_rate = stats.ocr_success_rate,
            field_success_rate = stats.field_success_rate,
            avg_latency_sec = stats.avg_latency_sec,
            p95_latency_sec = stats.p95_latency_sec,
            "backend metrics"
        );
    }

    if metrics.accuracy.enabled {
        for stats in &metrics.accuracy.by_backend {
            info!(
                backend = %stats.name,
                n = stats.n,
                origin_exact_pct = stats.origin_exact_pct,
                materials_exact_set_pct = stats.materials_exact_set_pct,
                doc_correct_pct = stats.doc_correct_pct,
                "backend accuracy"
            );
        }
    } else {
        warn!(
            manifest_path = %summary.dataset.manifest_path,
            "accuracy not evaluated for this run"
        );
    }

    Ok(())
}

pub fn load_summary(path: &Path) -> Result<RunSummaryManifest> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Most recently modified run directory that holds a `summary.json`.
pub fn latest_run_dir(output_root: &Path) -> Result<Option<PathBuf>> {
    if !output_root.is_dir() {
        return Ok(None);
    }

    let mut latest = None;
    for entry in fs::read_dir(output_root)
        .with_context(|| format!("failed to read {}", output_root.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let summary_path = path.join("summary.json");
        if !path.is_dir() || !summary_path.is_file() {
            continue;
        }

        let modified = fs::metadata(&summary_path)
            .and_then(|metadata| metadata.modified())
            .with_context(|| format!("failed to stat {}", summary_path.display()))?;

        let newer = match &latest {
            Some((current, current_path)) => (modified, &path) > (*current, current_path),
            None => true,
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn write_summary(dir: &Path) {
        fs::create_dir_all(dir).expect("create run dir");
        fs::write(dir.join("summary.json"), "{}").expect("write summary");
    }

    #[test]
    fn latest_run_dir_ignores_directories_without_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_summary(&temp.path().join("run-a"));
        std::thread::sleep(Duration::from_millis(20));
        write_summary(&temp.path().join("run-b"));
        fs::create_dir_all(temp.path().join("run-c")).expect("create empty run");

        let latest = latest_run_dir(temp.path())
            .expect("scan should succeed")
            .expect("a run should be found");
        assert_eq!(latest, temp.path().join("run-b"));
    }

    #[test]
    fn latest_run_dir_handles_missing_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let found = latest_run_dir(&temp.path().join("absent")).expect("missing root is fine");
        assert!(found.is_none());
    }

    #[test]
    fn run_id_cannot_escape_the_output_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("runs");
        write_summary(&temp.path().join("outside"));

        let err = run(StatusArgs {
            output_root: root,
            run_id: Some("../outside".to_string()),
        })
        .expect_err("escaping run id must be rejected");
        assert!(err.to_string().contains("single path segment"));
    }

    #[test]
    fn load_summary_rejects_malformed_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("summary.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(load_summary(&path).is_err());
    }
}
