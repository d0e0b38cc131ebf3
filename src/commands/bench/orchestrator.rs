use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use super::coordinator::{BenchContext, assemble_row, process_image};
use super::governor::MAX_ERROR_CHARS;
use crate::model::{BackendResult, BackendStatus, ImageRow};
use crate::util::truncate_chars;

#[derive(Debug, Clone)]
pub struct ImageJob {
    pub filename: String,
    pub path: PathBuf,
}

/// Processes the corpus. One worker runs images in corpus order; more
/// workers run a bounded pool and the rows are sorted by filename.
pub async fn run_corpus(
    ctx: Arc<BenchContext>,
    images: Vec<ImageJob>,
    workers: usize,
) -> Vec<ImageRow> {
    let total = images.len();
    let mut rows = Vec::<ImageRow>::with_capacity(total);

    if workers <= 1 {
        for job in images {
            let row = process_image(&ctx, &job.path, &job.filename).await;
            log_progress(rows.len() + 1, total, &row);
            rows.push(row);
        }
        return rows;
    }

    let mut pending = stream::iter(images)
        .map(|job| {
            let worker_ctx = Arc::clone(&ctx);
            let worker_job = job.clone();
            let handle = tokio::spawn(async move {
                process_image(&worker_ctx, &worker_job.path, &worker_job.filename).await
            });
            async move { (job, handle.await) }
        })
        .buffer_unordered(workers);

    while let Some((job, joined)) = pending.next().await {
        let row = match joined {
            Ok(row) => row,
            Err(err) => {
                error!(filename = %job.filename, error = %err, "image worker failed");
                failed_row(&ctx, &job, &format!("image worker failed: {err}"))
            }
        };
        log_progress(rows.len() + 1, total, &row);
        rows.push(row);
    }

    rows.sort_by(|left, right| left.filename.cmp(&right.filename));
    rows
}

/// Row for an image whose worker died: every backend is an `ERROR`.
fn failed_row(ctx: &BenchContext, job: &ImageJob, reason: &str) -> ImageRow {
    let error = truncate_chars(reason, MAX_ERROR_CHARS);
    let results = ctx
        .backend_order()
        .into_iter()
        .map(|name| {
            let result = BackendResult::failed(&name, BackendStatus::Error, 0.0, error.clone());
            (name, result)
        })
        .collect::<BTreeMap<String, BackendResult>>();

    assemble_row(ctx, &job.path, &job.filename, results)
}

fn log_progress(done: usize, total: usize, row: &ImageRow) {
    info!(
        progress = %format!("{done}/{total}"),
        filename = %row.filename,
        ensemble = row.ensemble.status.as_str(),
        latency_sec = row.ensemble.latency_seconds,
        "image processed"
    );
}
