use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::EnsembleStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendStatus {
    Success,
    OcrFail,
    Timeout,
    Error,
    SkippedMissingCredential,
}

impl BackendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::OcrFail => "OCR_FAIL",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
            Self::SkippedMissingCredential => "SKIPPED_MISSING_CREDENTIAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResult {
    pub backend_name: String,
    pub status: BackendStatus,
    pub text: String,
    pub latency_seconds: f64,
    pub error: String,
}

impl BackendResult {
    pub fn extracted(backend_name: &str, text: String, latency_seconds: f64) -> Self {
        let text = text.trim().to_string();
        let status = if text.is_empty() {
            BackendStatus::OcrFail
        } else {
            BackendStatus::Success
        };

        Self {
            backend_name: backend_name.to_string(),
            status,
            text,
            latency_seconds,
            error: String::new(),
        }
    }

    pub fn failed(
        backend_name: &str,
        status: BackendStatus,
        latency_seconds: f64,
        error: String,
    ) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            status,
            text: String::new(),
            latency_seconds,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BackendStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialComponent {
    pub fiber: String,
    pub pct: f64,
}

impl MaterialComponent {
    pub fn new(fiber: impl Into<String>, pct: f64) -> Self {
        Self {
            fiber: fiber.into(),
            pct,
        }
    }

    pub fn normalized_fiber(&self) -> String {
        self.fiber.trim().to_lowercase()
    }
}

/// Parsed tag content. Casing is kept as read; comparisons go through the
/// `normalized_*` accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub origin_country: Option<String>,
    pub materials: Vec<MaterialComponent>,
}

impl StructuredRecord {
    pub fn normalized_origin(&self) -> String {
        normalize_origin(self.origin_country.as_deref())
    }

    pub fn normalized_materials(&self) -> Vec<String> {
        normalize_material_set(self.materials.iter().map(|material| material.fiber.as_str()))
    }

    pub fn has_fields(&self) -> bool {
        !self.normalized_origin().is_empty() || !self.normalized_materials().is_empty()
    }
}

pub fn normalize_origin(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_lowercase()
}

pub fn normalize_material_set<'a>(fibers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out = fibers
        .into_iter()
        .map(|fiber| fiber.trim().to_lowercase())
        .filter(|fiber| !fiber.is_empty())
        .collect::<Vec<String>>();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub origin_country: String,
    pub materials: Vec<String>,
    pub co2_total_kg: Option<f64>,
    pub has_fields: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub strategy: EnsembleStrategy,
    pub status: BackendStatus,
    pub latency_seconds: f64,
    pub record: Option<StructuredRecord>,
    pub source_backend: String,
    pub error: String,
    pub fields: ParsedFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRow {
    pub filename: String,
    pub image_path: String,
    pub backend_results: BTreeMap<String, BackendResult>,
    pub parsed: BTreeMap<String, ParsedFields>,
    pub ensemble: EnsembleResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub name: String,
    pub n: usize,
    pub ocr_success_rate: f64,
    pub field_success_rate: f64,
    pub avg_latency_sec: f64,
    pub p95_latency_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub name: String,
    pub n: usize,
    pub origin_exact_pct: f64,
    pub materials_exact_set_pct: f64,
    pub doc_correct_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub enabled: bool,
    pub evaluated_items: usize,
    pub by_backend: Vec<AccuracyStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_items: usize,
    pub total_wall_time_sec: f64,
    pub throughput_items_per_sec: f64,
    pub by_backend: Vec<BackendStats>,
    pub accuracy: AccuracyReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerSummary {
    pub cpu_avg_percent: f64,
    pub peak_rss_mb: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfigSnapshot {
    pub input_dir: String,
    pub limit: Option<usize>,
    pub backends: Vec<String>,
    pub workers: usize,
    pub ensemble: EnsembleStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub images_processed: usize,
    pub manifest_path: String,
    pub manifest_present: bool,
    pub manifest_rows_loaded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub per_item_csv: String,
    pub summary_json: String,
    pub report_md: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummaryManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub config: RunConfigSnapshot,
    pub dataset: DatasetInfo,
    pub metrics: RunSummary,
    pub system: SamplerSummary,
    pub artifacts: RunArtifacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    pub filename: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub image_count: usize,
    pub images: Vec<ImageEntry>,
}
