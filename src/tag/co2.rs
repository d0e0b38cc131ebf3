use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::model::StructuredRecord;

pub const GARMENT_WEIGHT_KG: f64 = 0.5;
const MANUFACTURING_KGCO2E_PER_KG: f64 = 2.0;
const UNKNOWN_FIBER_KGCO2E_PER_KG: f64 = 6.0;

// kgCO2e per kg of fiber, cradle to gate.
const FIBER_FACTORS: &[(&str, f64)] = &[
    ("recycled polyester", 3.0),
    ("organic cotton", 3.8),
    ("cotton", 5.9),
    ("polyester", 5.5),
    ("polyamide", 7.3),
    ("nylon", 7.3),
    ("elastane", 8.6),
    ("spandex", 8.6),
    ("lycra", 8.6),
    ("polyurethane", 6.0),
    ("acrylic", 5.9),
    ("viscose", 4.0),
    ("rayon", 4.0),
    ("modal", 4.0),
    ("lyocell", 3.0),
    ("tencel", 3.0),
    ("bamboo", 4.0),
    ("acetate", 4.5),
    ("wool", 17.0),
    ("cashmere", 38.0),
    ("silk", 25.0),
    ("linen", 2.1),
    ("hemp", 2.1),
    ("leather", 17.0),
];

#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub total_kgco2e: f64,
    pub breakdown: BTreeMap<String, f64>,
}

pub fn estimate(record: &StructuredRecord) -> Result<Estimate> {
    let total_pct = record
        .materials
        .iter()
        .map(|material| material.pct.max(0.0))
        .sum::<f64>();
    if total_pct <= 0.0 {
        bail!("record has no material composition to estimate from");
    }

    let materials_kg = record
        .materials
        .iter()
        .filter(|material| material.pct > 0.0)
        .map(|material| {
            let share = material.pct / total_pct;
            share * GARMENT_WEIGHT_KG * fiber_factor(&material.normalized_fiber())
        })
        .sum::<f64>();
    let manufacturing_kg = GARMENT_WEIGHT_KG * MANUFACTURING_KGCO2E_PER_KG;

    let mut breakdown = BTreeMap::new();
    breakdown.insert("materials".to_string(), materials_kg);
    breakdown.insert("manufacturing".to_string(), manufacturing_kg);

    Ok(Estimate {
        total_kgco2e: materials_kg + manufacturing_kg,
        breakdown,
    })
}

fn fiber_factor(fiber: &str) -> f64 {
    FIBER_FACTORS
        .iter()
        .find(|(name, _)| *name == fiber)
        .map(|(_, factor)| *factor)
        .unwrap_or(UNKNOWN_FIBER_KGCO2E_PER_KG)
}
