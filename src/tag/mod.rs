mod co2;
mod parser;
#[cfg(test)]
mod tests;

pub use co2::estimate;
pub use parser::TagParser;

use crate::model::{ParsedFields, StructuredRecord};
use crate::util::round_to;

/// Best-effort parse: blank text or a parser failure both mean "no record".
pub fn parse_record(parser: &TagParser, text: &str) -> Option<StructuredRecord> {
    if text.trim().is_empty() {
        return None;
    }
    parser.parse(text).ok()
}

pub fn derive_fields(record: Option<&StructuredRecord>) -> ParsedFields {
    let Some(record) = record else {
        return ParsedFields::default();
    };

    ParsedFields {
        origin_country: record.normalized_origin(),
        materials: record.normalized_materials(),
        co2_total_kg: estimate(record)
            .ok()
            .map(|value| round_to(value.total_kgco2e, 4)),
        has_fields: record.has_fields(),
    }
}
