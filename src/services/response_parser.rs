// src/services/response_parser.rs
//! Turns the labelled free-text sections the model is asked to produce into
//! typed results. Every function here is pure.
use crate::errors::AnalysisError;
use crate::models::{
    AnalysisKind, AnalysisOutcome, BiteAnalysis, HealingReport, IdentificationReport, Product,
    ReportSection,
};
use std::collections::HashMap;

/// Danger level used when the response carries no digits for it.
pub const DEFAULT_DANGER_LEVEL: u8 = 5;

const PRODUCTS_KEY: &str = "Recommended Products";
const VISUAL_CHANGES_KEY: &str = "Visual Changes";

/// Labelled sections in the order they appeared, plus the bulleted lists that
/// followed list-valued labels.
#[derive(Debug, Default)]
struct Sections {
    entries: Vec<ReportSection>,
    lists: HashMap<String, Vec<String>>,
}

impl Sections {
    fn split(raw: &str, list_keys: &[&str]) -> Self {
        let mut sections = Sections::default();
        let mut current: Option<String> = None;

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(list_key) = current
                .as_deref()
                .and_then(|key| list_keys.iter().find(|k| k.eq_ignore_ascii_case(key)))
            {
                if let Some(item) = bullet(line) {
                    if !item.is_empty() {
                        sections
                            .lists
                            .entry(list_key.to_string())
                            .or_default()
                            .push(item.to_string());
                    }
                    continue;
                }
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = clean_label(key);
                if key.is_empty() {
                    continue;
                }
                let value = clean_value(value);
                sections.entries.push(ReportSection {
                    label: key.to_string(),
                    value: value.to_string(),
                });
                current = Some(key.to_string());
            }
        }

        sections
    }

    /// Last value given for `key`; later sections override earlier ones.
    fn value(&self, key: &str) -> &str {
        self.entries
            .iter()
            .rev()
            .find(|section| section.label.eq_ignore_ascii_case(key))
            .map(|section| section.value.as_str())
            .unwrap_or("")
    }

    fn list(&mut self, key: &str) -> Vec<String> {
        self.lists.remove(key).unwrap_or_default()
    }
}

fn bullet(line: &str) -> Option<&str> {
    line.strip_prefix('-')
        .or_else(|| line.strip_prefix('•'))
        .map(str::trim)
}

fn clean_label(label: &str) -> &str {
    label.trim().trim_matches(|c: char| c == '*' || c == '#').trim()
}

fn clean_value(value: &str) -> &str {
    value.trim().trim_matches('*').trim()
}

fn rejection(kind: AnalysisKind, raw: &str) -> Option<AnalysisError> {
    raw.trim_start()
        .strip_prefix(kind.rejection_sentinel())
        .map(|explanation| AnalysisError::NotClaimedSubject {
            subject: kind.subject().to_lowercase(),
            explanation: explanation.trim().to_string(),
        })
}

/// First run of decimal digits in `value`, clamped to 1..=10. Falls back to
/// [`DEFAULT_DANGER_LEVEL`] when there are no digits.
pub fn danger_level(value: &str) -> u8 {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        return DEFAULT_DANGER_LEVEL;
    }

    // Overflowing digit runs are far above the ceiling anyway
    let level = digits.parse::<u64>().unwrap_or(u64::MAX);
    level.clamp(1, 10) as u8
}

/// Splits "Name – description (https://...)" into its parts.
pub fn parse_product(line: &str) -> Option<Product> {
    let text = line.trim();
    if text.is_empty() {
        return None;
    }

    let (name, description) = match split_product(text) {
        Some((name, description)) => (name, description),
        None => (text, ""),
    };
    let name = name.trim().trim_matches('*').trim();
    if name.is_empty() {
        return None;
    }

    Some(Product {
        name: name.to_string(),
        description: description.trim().to_string(),
        url: extract_url(text),
    })
}

fn split_product(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    text.char_indices()
        .find(|&(i, c)| match c {
            '–' | '—' => true,
            '-' => i > 0 && bytes[i - 1] == b' ' && bytes.get(i + 1) == Some(&b' '),
            _ => false,
        })
        .map(|(i, c)| (&text[..i], &text[i + c.len_utf8()..]))
}

fn extract_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_start_matches(['(', '[', '<'])
                .trim_end_matches([')', ']', '>', ',', '.', ';'])
        })
        .find(|token| {
            (token.starts_with("https://") || token.starts_with("http://"))
                && reqwest::Url::parse(token).is_ok()
        })
        .map(str::to_string)
}

pub fn parse_bite(raw: &str) -> Result<BiteAnalysis, AnalysisError> {
    if let Some(err) = rejection(AnalysisKind::Bite, raw) {
        return Err(err);
    }

    let mut sections = Sections::split(raw, &[PRODUCTS_KEY]);

    let insect_or_cause = sections.value("Insect or Cause").to_string();
    if insect_or_cause.is_empty() {
        return Err(AnalysisError::Parsing(
            "Could not find insect or cause in response".to_string(),
        ));
    }

    let recommended_products = sections
        .list(PRODUCTS_KEY)
        .iter()
        .filter_map(|line| parse_product(line))
        .collect();

    Ok(BiteAnalysis {
        insect_or_cause,
        pattern_description: sections.value("Pattern Description").to_string(),
        severity: sections.value("Severity").to_string(),
        recommended_care: sections.value("Recommended Care").to_string(),
        recommended_products,
        possible_risks: sections.value("Possible Risks").to_string(),
        medical_attention_signs: sections.value("When to Seek Medical Attention").to_string(),
        danger_level: danger_level(sections.value("Danger Level (1-10)")),
        confidence: sections.value("Confidence").to_string(),
        is_bug_bite: true,
        raw_response: raw.to_string(),
    })
}

pub fn parse_identification(
    kind: AnalysisKind,
    raw: &str,
) -> Result<IdentificationReport, AnalysisError> {
    if let Some(err) = rejection(kind, raw) {
        return Err(err);
    }

    let (description_key, risk_key) = match kind {
        AnalysisKind::Animal => ("Behavior Observed", "Risk to Humans"),
        _ => ("Appearance", "Toxicity"),
    };

    let sections = Sections::split(raw, &[]);
    let species = sections.value("Species").to_string();
    if species.is_empty() {
        return Err(AnalysisError::Parsing(
            "Could not find species in response".to_string(),
        ));
    }

    Ok(IdentificationReport {
        species,
        description: sections.value(description_key).to_string(),
        risk: sections.value(risk_key).to_string(),
        disclaimer: sections.value("Disclaimer").to_string(),
        confidence: sections.value("Confidence").to_string(),
        raw_response: raw.to_string(),
        sections: sections.entries,
    })
}

pub fn parse_healing(raw: &str) -> Result<HealingReport, AnalysisError> {
    if let Some(err) = rejection(AnalysisKind::HealingComparison, raw) {
        return Err(err);
    }

    let mut sections = Sections::split(raw, &[VISUAL_CHANGES_KEY]);
    let healing_status = sections.value("Healing Status").to_string();
    if healing_status.is_empty() {
        return Err(AnalysisError::Parsing(
            "Could not find healing status in response".to_string(),
        ));
    }

    Ok(HealingReport {
        healing_status,
        visual_changes: sections.list(VISUAL_CHANGES_KEY),
        treatment_recommendation: sections.value("Treatment Recommendation").to_string(),
        medical_care_signs: sections.value("When to Seek Medical Care").to_string(),
        confidence: sections.value("Confidence").to_string(),
        raw_response: raw.to_string(),
    })
}

pub fn parse(kind: AnalysisKind, raw: &str) -> Result<AnalysisOutcome, AnalysisError> {
    match kind {
        AnalysisKind::Bite => parse_bite(raw).map(AnalysisOutcome::Bite),
        AnalysisKind::Plant => parse_identification(kind, raw).map(AnalysisOutcome::Plant),
        AnalysisKind::Animal => parse_identification(kind, raw).map(AnalysisOutcome::Animal),
        AnalysisKind::HealingComparison => {
            parse_healing(raw).map(AnalysisOutcome::HealingComparison)
        }
    }
}
