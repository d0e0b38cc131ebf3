use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "tagbench",
    version,
    about = "Benchmark OCR and vision backends on garment tag images"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Bench(BenchArgs),
    Inventory(InventoryArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum BackendKind {
    #[value(name = "gemini")]
    Gemini,
    #[value(name = "mistral_ocr2")]
    MistralOcr2,
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "tesseract")]
    Tesseract,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::MistralOcr2 => "mistral_ocr2",
            Self::OpenAi => "openai",
            Self::Tesseract => "tesseract",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleStrategy {
    #[value(name = "first_success", alias = "none")]
    FirstSuccess,
    #[value(name = "field_union")]
    FieldUnion,
}

impl EnsembleStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstSuccess => "first_success",
            Self::FieldUnion => "field_union",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    #[arg(long, default_value = "cropped_tags")]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "benchmarks/outputs")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(
        long = "backends",
        value_enum,
        value_delimiter = ',',
        default_values_t = [BackendKind::Gemini, BackendKind::MistralOcr2]
    )]
    pub backends: Vec<BackendKind>,

    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    #[arg(long, value_enum, default_value_t = EnsembleStrategy::FirstSuccess)]
    pub ensemble: EnsembleStrategy,

    #[arg(long, default_value = "benchmarks/inputs/manifest.csv")]
    pub manifest_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "cropped_tags")]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "benchmarks/outputs")]
    pub output_root: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,
}
