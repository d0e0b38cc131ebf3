use super::ground_truth::GroundTruth;
use crate::model::{
    AccuracyReport, AccuracyStats, BackendResult, BackendStats, BackendStatus, ImageRow,
    ParsedFields, RunSummary,
};
use crate::util::round_to;

pub const ENSEMBLE_NAME: &str = "ensemble";

/// Linear-interpolation percentile; `p` is in 0..=100.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if values.len() == 1 {
        return values[0];
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));

    let rank = (sorted.len() - 1) as f64 * (p / 100.0);
    let low = rank.floor() as usize;
    let high = (low + 1).min(sorted.len() - 1);
    let frac = rank - low as f64;
    sorted[low] + (sorted[high] - sorted[low]) * frac
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn rate(count: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    round_to(100.0 * count as f64 / n as f64, 2)
}

struct Observation {
    status: BackendStatus,
    latency_seconds: f64,
    has_fields: bool,
}

fn stats_for(name: &str, observations: &[Observation]) -> BackendStats {
    let n = observations.len();
    let latencies = observations
        .iter()
        .map(|observation| observation.latency_seconds)
        .collect::<Vec<f64>>();
    let successes = observations
        .iter()
        .filter(|observation| observation.status == BackendStatus::Success)
        .count();
    let with_fields = observations
        .iter()
        .filter(|observation| observation.has_fields)
        .count();

    BackendStats {
        name: name.to_string(),
        n,
        ocr_success_rate: rate(successes, n),
        field_success_rate: rate(with_fields, n),
        avg_latency_sec: round_to(mean(&latencies), 4),
        p95_latency_sec: round_to(percentile(&latencies, 95.0), 4),
    }
}

fn backend_observations(rows: &[ImageRow], name: &str) -> Vec<Observation> {
    rows.iter()
        .map(|row| {
            let result: Option<&BackendResult> = row.backend_results.get(name);
            Observation {
                status: result.map(|value| value.status).unwrap_or(BackendStatus::Error),
                latency_seconds: result.map(|value| value.latency_seconds).unwrap_or(0.0),
                has_fields: row.parsed.get(name).is_some_and(|fields| fields.has_fields),
            }
        })
        .collect()
}

fn ensemble_observations(rows: &[ImageRow]) -> Vec<Observation> {
    rows.iter()
        .map(|row| Observation {
            status: row.ensemble.status,
            latency_seconds: row.ensemble.latency_seconds,
            has_fields: row.ensemble.fields.has_fields,
        })
        .collect()
}

pub fn compute_summary(
    rows: &[ImageRow],
    backend_names: &[String],
    total_wall_sec: f64,
    accuracy: AccuracyReport,
) -> RunSummary {
    let mut by_backend = backend_names
        .iter()
        .map(|name| stats_for(name, &backend_observations(rows, name)))
        .collect::<Vec<BackendStats>>();
    by_backend.push(stats_for(ENSEMBLE_NAME, &ensemble_observations(rows)));

    let throughput = if total_wall_sec > 0.0 {
        rows.len() as f64 / total_wall_sec
    } else {
        0.0
    };

    RunSummary {
        total_items: rows.len(),
        total_wall_time_sec: round_to(total_wall_sec, 4),
        throughput_items_per_sec: round_to(throughput, 4),
        by_backend,
        accuracy,
    }
}

#[derive(Default)]
struct AccuracyCounter {
    n: usize,
    origin_ok: usize,
    materials_ok: usize,
    doc_ok: usize,
}

impl AccuracyCounter {
    fn observe(&mut self, predicted: &ParsedFields, origin: &str, materials: &[String]) {
        let origin_ok = predicted.origin_country.trim().to_lowercase() == origin;
        let mut predicted_materials = predicted
            .materials
            .iter()
            .map(|fiber| fiber.trim().to_lowercase())
            .collect::<Vec<String>>();
        predicted_materials.sort();
        predicted_materials.dedup();
        let materials_ok = predicted_materials == materials;

        self.n += 1;
        self.origin_ok += usize::from(origin_ok);
        self.materials_ok += usize::from(materials_ok);
        self.doc_ok += usize::from(origin_ok && materials_ok);
    }

    fn into_stats(self, name: &str) -> AccuracyStats {
        AccuracyStats {
            name: name.to_string(),
            n: self.n,
            origin_exact_pct: rate(self.origin_ok, self.n),
            materials_exact_set_pct: rate(self.materials_ok, self.n),
            doc_correct_pct: rate(self.doc_ok, self.n),
        }
    }
}

/// Exact-match scoring against the manifest. Rows without an entry are left
/// out of every denominator.
pub fn compute_accuracy(
    rows: &[ImageRow],
    ground_truth: &GroundTruth,
    backend_names: &[String],
) -> AccuracyReport {
    if ground_truth.is_empty() {
        return AccuracyReport::default();
    }

    let mut counters = backend_names
        .iter()
        .map(|_| AccuracyCounter::default())
        .collect::<Vec<AccuracyCounter>>();
    let mut ensemble = AccuracyCounter::default();
    let missing = ParsedFields::default();

    for row in rows {
        let Some(expected) = ground_truth.get(&row.filename) else {
            continue;
        };

        for (name, counter) in backend_names.iter().zip(counters.iter_mut()) {
            let predicted = row.parsed.get(name).unwrap_or(&missing);
            counter.observe(predicted, &expected.origin_country, &expected.materials);
        }
        ensemble.observe(
            &row.ensemble.fields,
            &expected.origin_country,
            &expected.materials,
        );
    }

    let evaluated_items = ensemble.n;
    let mut by_backend = backend_names
        .iter()
        .zip(counters)
        .map(|(name, counter)| counter.into_stats(name))
        .collect::<Vec<AccuracyStats>>();
    by_backend.push(ensemble.into_stats(ENSEMBLE_NAME));

    AccuracyReport {
        enabled: true,
        evaluated_items,
        by_backend,
    }
}
