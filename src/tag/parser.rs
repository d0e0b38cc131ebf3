use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::model::{MaterialComponent, StructuredRecord};

const KNOWN_FIBERS: &[&str] = &[
    "recycled polyester",
    "organic cotton",
    "polyurethane",
    "polyester",
    "polyamide",
    "cotton",
    "elastane",
    "spandex",
    "lycra",
    "nylon",
    "viscose",
    "rayon",
    "acrylic",
    "modal",
    "lyocell",
    "tencel",
    "cashmere",
    "wool",
    "silk",
    "linen",
    "hemp",
    "bamboo",
    "acetate",
    "leather",
];

const ORIGIN_STOP_WORDS: &[&str] = &["rn", "ca", "style", "size", "wash", "machine", "do", "care"];

const MAX_ORIGIN_WORDS: usize = 3;

pub struct TagParser {
    pct_then_fiber: Regex,
    fiber_then_pct: Regex,
    origin_line: Regex,
}

impl TagParser {
    pub fn new() -> Result<Self> {
        let fibers = KNOWN_FIBERS
            .iter()
            .map(|fiber| fiber.replace(' ', r"\s+"))
            .collect::<Vec<String>>()
            .join("|");

        Ok(Self {
            pct_then_fiber: Regex::new(&format!(
                r"(?i)(\d{{1,3}}(?:[.,]\d+)?)\s*%\s*(?:of\s+)?({fibers})\b"
            ))
            .context("failed to compile percent-fiber regex")?,
            fiber_then_pct: Regex::new(&format!(
                r"(?i)\b({fibers})\s*[:\-]?\s*(\d{{1,3}}(?:[.,]\d+)?)\s*%"
            ))
            .context("failed to compile fiber-percent regex")?,
            origin_line: Regex::new(
                r"(?im)\b(?:made\s+in|product\s+of|hecho\s+en|fabricado\s+en|fabriqu[eé]\s+en)\s*[:\-]?\s*([^\r\n]+)",
            )
            .context("failed to compile origin regex")?,
        })
    }

    pub fn parse(&self, text: &str) -> Result<StructuredRecord> {
        if text.trim().is_empty() {
            bail!("tag text is empty");
        }

        Ok(StructuredRecord {
            origin_country: self.parse_origin(text),
            materials: self.parse_materials(text),
        })
    }

    fn parse_materials(&self, text: &str) -> Vec<MaterialComponent> {
        let pct_first = self
            .pct_then_fiber
            .captures_iter(text)
            .filter_map(|captures| {
                let pct = parse_pct(captures.get(1)?.as_str())?;
                Some(MaterialComponent::new(
                    collapse_whitespace(captures.get(2)?.as_str()),
                    pct,
                ))
            })
            .collect::<Vec<MaterialComponent>>();

        let fiber_first = self
            .fiber_then_pct
            .captures_iter(text)
            .filter_map(|captures| {
                let pct = parse_pct(captures.get(2)?.as_str())?;
                Some(MaterialComponent::new(
                    collapse_whitespace(captures.get(1)?.as_str()),
                    pct,
                ))
            })
            .collect::<Vec<MaterialComponent>>();

        // A layout read in the wrong direction pairs each percentage with the
        // neighbouring entry and loses one match, so the longer reading wins.
        let mut found = if fiber_first.len() > pct_first.len() {
            fiber_first
        } else {
            pct_first
        };

        let mut seen = Vec::<String>::new();
        found.retain(|material| {
            let key = material.normalized_fiber();
            if seen.contains(&key) {
                return false;
            }
            seen.push(key);
            true
        });
        found
    }

    fn parse_origin(&self, text: &str) -> Option<String> {
        self.origin_line.captures_iter(text).find_map(|captures| {
            let tail = captures.get(1)?.as_str();
            let segment = tail.split(['/', ',', '|', ';', '(']).next()?;

            let mut words = Vec::<&str>::new();
            for word in segment.split_whitespace() {
                let cleaned = word.trim_matches(|c: char| !c.is_alphabetic() && c != '\'');
                let lowered = cleaned.to_lowercase();
                if cleaned.is_empty()
                    || cleaned.chars().any(|c| c.is_ascii_digit())
                    || is_fiber_word(&lowered)
                    || ORIGIN_STOP_WORDS.contains(&lowered.as_str())
                {
                    break;
                }
                words.push(cleaned);
                if words.len() == MAX_ORIGIN_WORDS {
                    break;
                }
            }

            if words.is_empty() {
                None
            } else {
                Some(words.join(" "))
            }
        })
    }
}

fn parse_pct(raw: &str) -> Option<f64> {
    let pct = raw.replace(',', ".").parse::<f64>().ok()?;
    (pct > 0.0 && pct <= 100.0).then_some(pct)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn is_fiber_word(word: &str) -> bool {
    KNOWN_FIBERS
        .iter()
        .any(|fiber| fiber.split(' ').any(|part| part == word))
}
