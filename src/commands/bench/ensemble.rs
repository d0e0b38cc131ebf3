use std::collections::{BTreeMap, HashSet};

use crate::cli::EnsembleStrategy;
use crate::model::{
    BackendResult, BackendStatus, EnsembleResult, MaterialComponent, StructuredRecord,
};
use crate::tag::derive_fields;
use crate::util::round_to;

pub const FIELD_UNION_SOURCE: &str = "field_union";

/// Combines per-backend outcomes for one image. Every choice walks
/// `backend_order`; arrival order never matters.
pub fn resolve(
    strategy: EnsembleStrategy,
    backend_order: &[String],
    results: &BTreeMap<String, BackendResult>,
    records: &BTreeMap<String, StructuredRecord>,
) -> EnsembleResult {
    let latency_seconds = backend_order
        .iter()
        .filter_map(|name| results.get(name))
        .map(|result| result.latency_seconds)
        .fold(0.0_f64, f64::max);
    let latency_seconds = round_to(latency_seconds, 4);

    match strategy {
        EnsembleStrategy::FirstSuccess => {
            first_success(strategy, backend_order, results, records, latency_seconds)
        }
        EnsembleStrategy::FieldUnion => {
            field_union(strategy, backend_order, records, latency_seconds)
        }
    }
}

fn first_success(
    strategy: EnsembleStrategy,
    backend_order: &[String],
    results: &BTreeMap<String, BackendResult>,
    records: &BTreeMap<String, StructuredRecord>,
    latency_seconds: f64,
) -> EnsembleResult {
    let chosen = backend_order.iter().find(|name| {
        results
            .get(name.as_str())
            .is_some_and(|result| result.is_success() && !result.text.trim().is_empty())
    });

    match chosen {
        Some(name) => {
            let record = records.get(name).cloned();
            EnsembleResult {
                strategy,
                status: BackendStatus::Success,
                latency_seconds,
                fields: derive_fields(record.as_ref()),
                record,
                source_backend: name.clone(),
                error: String::new(),
            }
        }
        None => EnsembleResult {
            strategy,
            status: BackendStatus::OcrFail,
            latency_seconds,
            record: None,
            source_backend: String::new(),
            error: "No successful backend text".to_string(),
            fields: derive_fields(None),
        },
    }
}

fn field_union(
    strategy: EnsembleStrategy,
    backend_order: &[String],
    records: &BTreeMap<String, StructuredRecord>,
    latency_seconds: f64,
) -> EnsembleResult {
    let mut origin: Option<String> = None;
    let mut materials = Vec::<MaterialComponent>::new();
    let mut seen_fibers = HashSet::<String>::new();

    for record in backend_order.iter().filter_map(|name| records.get(name)) {
        if origin.is_none() {
            origin = record
                .origin_country
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned);
        }

        for material in &record.materials {
            let fiber = material.normalized_fiber();
            if fiber.is_empty() || !seen_fibers.insert(fiber) {
                continue;
            }
            materials.push(MaterialComponent::new(material.fiber.trim(), material.pct));
        }
    }

    if origin.is_none() && materials.is_empty() {
        return EnsembleResult {
            strategy,
            status: BackendStatus::OcrFail,
            latency_seconds,
            record: None,
            source_backend: FIELD_UNION_SOURCE.to_string(),
            error: "No fields to merge".to_string(),
            fields: derive_fields(None),
        };
    }

    let record = StructuredRecord {
        origin_country: origin,
        materials,
    };
    EnsembleResult {
        strategy,
        status: BackendStatus::Success,
        latency_seconds,
        fields: derive_fields(Some(&record)),
        record: Some(record),
        source_backend: FIELD_UNION_SOURCE.to_string(),
        error: String::new(),
    }
}
