use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use super::ensemble;
use super::governor;
use crate::backends::SharedBackend;
use crate::cli::EnsembleStrategy;
use crate::model::{BackendResult, BackendStatus, ImageRow};
use crate::tag::{TagParser, derive_fields, parse_record};

pub const BACKEND_CONCURRENCY_PER_IMAGE: usize = 2;

/// Everything one run needs, built once and shared by all workers.
pub struct BenchContext {
    pub backends: Vec<SharedBackend>,
    pub strategy: EnsembleStrategy,
    pub parser: TagParser,
}

impl BenchContext {
    pub fn new(backends: Vec<SharedBackend>, strategy: EnsembleStrategy) -> Result<Self> {
        Ok(Self {
            backends,
            strategy,
            parser: TagParser::new()?,
        })
    }

    pub fn backend_order(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|backend| backend.name().to_string())
            .collect()
    }
}

pub async fn process_image(ctx: &BenchContext, image_path: &Path, filename: &str) -> ImageRow {
    // Calls are created up front; none starts until the buffer polls it.
    let calls = ctx
        .backends
        .iter()
        .cloned()
        .map(|backend| governor::invoke(backend, image_path))
        .collect::<Vec<_>>();

    let results = stream::iter(calls)
        .buffer_unordered(BACKEND_CONCURRENCY_PER_IMAGE)
        .collect::<Vec<BackendResult>>()
        .await;

    let backend_results = results
        .into_iter()
        .map(|result| (result.backend_name.clone(), result))
        .collect::<BTreeMap<String, BackendResult>>();

    assemble_row(ctx, image_path, filename, backend_results)
}

/// Pure given the collected results.
pub fn assemble_row(
    ctx: &BenchContext,
    image_path: &Path,
    filename: &str,
    mut backend_results: BTreeMap<String, BackendResult>,
) -> ImageRow {
    let order = ctx.backend_order();
    let mut records = BTreeMap::new();
    let mut parsed = BTreeMap::new();

    for name in &order {
        let result = backend_results.entry(name.clone()).or_insert_with(|| {
            BackendResult::failed(
                name,
                BackendStatus::Error,
                0.0,
                "backend produced no result".to_string(),
            )
        });

        let record = parse_record(&ctx.parser, &result.text);
        parsed.insert(name.clone(), derive_fields(record.as_ref()));
        if let Some(record) = record {
            records.insert(name.clone(), record);
        }
    }

    let ensemble = ensemble::resolve(ctx.strategy, &order, &backend_results, &records);

    ImageRow {
        filename: filename.to_string(),
        image_path: image_path.display().to_string(),
        backend_results,
        parsed,
        ensemble,
    }
}
