use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{normalize_material_set, normalize_origin};

#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthEntry {
    pub origin_country: String,
    pub materials: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestRow {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    gt_origin_country: Option<String>,
    #[serde(default)]
    gt_materials: Option<String>,
}

/// Expected origin and material set per image filename.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    entries: HashMap<String, GroundTruthEntry>,
}

impl GroundTruth {
    /// A missing manifest is not an error; accuracy scoring is just disabled.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "ground-truth manifest missing, accuracy disabled");
            return Ok(Self::default());
        }

        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let manifest = Self::from_reader(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), rows = manifest.len(), "loaded ground-truth manifest");
        Ok(manifest)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for row in csv_reader.deserialize::<ManifestRow>() {
            let row = row.context("failed to read manifest row")?;
            let filename = row.filename.unwrap_or_default().trim().to_string();
            if filename.is_empty() {
                continue;
            }

            let raw_materials = row.gt_materials.unwrap_or_default();
            entries.insert(
                filename,
                GroundTruthEntry {
                    origin_country: normalize_origin(row.gt_origin_country.as_deref()),
                    materials: normalize_material_set(raw_materials.split(';')),
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn get(&self, filename: &str) -> Option<&GroundTruthEntry> {
        self.entries.get(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
impl GroundTruth {
    pub fn from_entries(entries: &[(&str, &str, &[&str])]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(filename, origin, materials)| {
                    (
                        filename.to_string(),
                        GroundTruthEntry {
                            origin_country: normalize_origin(Some(origin)),
                            materials: normalize_material_set(materials.iter().copied()),
                        },
                    )
                })
                .collect(),
        }
    }
}
