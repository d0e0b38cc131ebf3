use super::*;
use crate::model::MaterialComponent;

fn parser() -> TagParser {
    TagParser::new().expect("tag parser regexes should compile")
}

#[test]
fn parse_reads_percent_first_composition_and_origin() {
    let record = parser()
        .parse("MADE IN CHINA\n80% COTTON\n20% Polyester\nMACHINE WASH COLD")
        .expect("non-empty text should parse");

    assert_eq!(record.origin_country.as_deref(), Some("CHINA"));
    assert_eq!(
        record.materials,
        vec![
            MaterialComponent::new("COTTON", 80.0),
            MaterialComponent::new("Polyester", 20.0),
        ]
    );
}

#[test]
fn parse_reads_fiber_first_composition_with_decimal_commas() {
    let record = parser()
        .parse("Shell: cotton 95,5% elastane 4,5%")
        .expect("non-empty text should parse");

    assert!(record.origin_country.is_none());
    assert_eq!(record.normalized_materials(), vec!["cotton", "elastane"]);
    assert_eq!(record.materials[0].pct, 95.5);
}

#[test]
fn parse_keeps_first_occurrence_of_repeated_fiber() {
    let record = parser()
        .parse("SHELL 100% polyester LINING 60% polyester 40% cotton")
        .expect("non-empty text should parse");

    assert_eq!(record.materials.len(), 2);
    assert_eq!(record.materials[0].pct, 100.0);
    assert_eq!(record.materials[1].normalized_fiber(), "cotton");
}

#[test]
fn parse_origin_stops_at_composition_and_codes() {
    let parser = parser();

    let record = parser
        .parse("Made in Viet Nam 100% cotton")
        .expect("non-empty text should parse");
    assert_eq!(record.origin_country.as_deref(), Some("Viet Nam"));

    let record = parser
        .parse("HECHO EN MEXICO / MADE IN MEXICO RN 54867")
        .expect("non-empty text should parse");
    assert_eq!(record.origin_country.as_deref(), Some("MEXICO"));
}

#[test]
fn parse_rejects_blank_text() {
    assert!(parser().parse("   \n").is_err());
}

#[test]
fn parse_record_swallows_blank_text() {
    assert!(parse_record(&parser(), "").is_none());
}

#[test]
fn derive_fields_normalizes_and_estimates() {
    let record = StructuredRecord {
        origin_country: Some("  China ".to_string()),
        materials: vec![
            MaterialComponent::new("Cotton", 50.0),
            MaterialComponent::new("Polyester", 50.0),
        ],
    };

    let fields = derive_fields(Some(&record));
    assert_eq!(fields.origin_country, "china");
    assert_eq!(fields.materials, vec!["cotton", "polyester"]);
    assert!(fields.has_fields);
    // 0.5 kg * (0.5 * 5.9 + 0.5 * 5.5) + 0.5 kg * 2.0
    assert_eq!(fields.co2_total_kg, Some(3.85));
}

#[test]
fn derive_fields_without_materials_has_no_estimate() {
    let record = StructuredRecord {
        origin_country: Some("Portugal".to_string()),
        materials: Vec::new(),
    };

    let fields = derive_fields(Some(&record));
    assert!(fields.has_fields);
    assert!(fields.co2_total_kg.is_none());
    assert_eq!(derive_fields(None), ParsedFields::default());
}

#[test]
fn estimate_falls_back_for_unknown_fibers() {
    let record = StructuredRecord {
        origin_country: None,
        materials: vec![MaterialComponent::new("mystery", 100.0)],
    };

    let value = estimate(&record).expect("positive composition should estimate");
    assert!((value.total_kgco2e - 4.0).abs() < 1e-9);
    assert_eq!(value.breakdown.len(), 2);
}
