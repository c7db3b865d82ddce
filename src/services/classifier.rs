// src/services/classifier.rs
//! Offline fallback used when the model endpoint cannot be reached.
use crate::models::{
    AnalysisKind, AnalysisOutcome, BiteAnalysis, HealingReport, IdentificationReport,
    OFFLINE_CONFIDENCE, Product, ReportSection,
};
use image::DynamicImage;

pub const OFFLINE_RAW_RESPONSE: &str = "Generated by offline mode";

const THUMBNAIL_EDGE: u32 = 64;
const SEVERE_REDNESS: f64 = 0.7;
const MODERATE_REDNESS: f64 = 0.4;

/// Share of pixels that read as inflamed skin, in `0.0..=1.0`.
pub fn redness_ratio(image: &DynamicImage) -> f64 {
    let thumb = image.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE).to_rgb8();
    let total = (thumb.width() * thumb.height()) as usize;
    if total == 0 {
        return 0.0;
    }

    let red = thumb
        .pixels()
        .filter(|pixel| {
            let [r, g, b] = pixel.0;
            let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
            r >= 96.0 && r > g * 1.3 && r > b * 1.3
        })
        .count();

    red as f64 / total as f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClassifier;

impl LocalClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, kind: AnalysisKind, image: &DynamicImage) -> AnalysisOutcome {
        match kind {
            AnalysisKind::Bite => AnalysisOutcome::Bite(self.classify_bite(image)),
            AnalysisKind::Plant => AnalysisOutcome::Plant(offline_identification(
                "Unidentified plant",
                "Plant identification needs a network connection.",
                "Unknown. Avoid touching or eating unidentified plants.",
            )),
            AnalysisKind::Animal => AnalysisOutcome::Animal(offline_identification(
                "Unidentified animal",
                "Animal identification needs a network connection.",
                "Unknown. Keep a safe distance from unfamiliar animals.",
            )),
            AnalysisKind::HealingComparison => AnalysisOutcome::HealingComparison(HealingReport {
                healing_status: "Unable to compare photos offline".to_string(),
                visual_changes: Vec::new(),
                treatment_recommendation:
                    "Keep the area clean and covered. Try the comparison again once online."
                        .to_string(),
                medical_care_signs: "Spreading redness, warmth, pus, or fever".to_string(),
                confidence: OFFLINE_CONFIDENCE.to_string(),
                raw_response: OFFLINE_RAW_RESPONSE.to_string(),
            }),
        }
    }

    pub fn classify_bite(&self, image: &DynamicImage) -> BiteAnalysis {
        let redness = redness_ratio(image);

        let (danger_level, cause, severity) = if redness > SEVERE_REDNESS {
            (7, "Possible severe reaction or fire ant", "Significant")
        } else if redness > MODERATE_REDNESS {
            (4, "Mosquito or common bug bite", "Moderate")
        } else {
            (2, "Minor irritation or mild insect bite", "Mild")
        };

        BiteAnalysis {
            insect_or_cause: cause.to_string(),
            pattern_description: "Redness and possible swelling".to_string(),
            severity: severity.to_string(),
            recommended_care: "Clean with soap and water. Apply ice to reduce swelling."
                .to_string(),
            recommended_products: ["Hydrocortisone cream", "Antihistamine"]
                .into_iter()
                .map(|name| Product {
                    name: name.to_string(),
                    description: String::new(),
                    url: None,
                })
                .collect(),
            possible_risks: "Infection if scratched excessively".to_string(),
            medical_attention_signs: "Spreading redness, fever, or difficulty breathing"
                .to_string(),
            danger_level,
            confidence: OFFLINE_CONFIDENCE.to_string(),
            is_bug_bite: true,
            raw_response: OFFLINE_RAW_RESPONSE.to_string(),
        }
    }
}

fn offline_identification(species: &str, description: &str, risk: &str) -> IdentificationReport {
    let disclaimer = "This is not a scientific identification or medical recommendation.";
    let sections = [
        ("Species", species),
        ("Description", description),
        ("Risk", risk),
        ("Confidence", OFFLINE_CONFIDENCE),
        ("Disclaimer", disclaimer),
    ]
    .into_iter()
    .map(|(label, value)| ReportSection {
        label: label.to_string(),
        value: value.to_string(),
    })
    .collect();

    IdentificationReport {
        species: species.to_string(),
        description: description.to_string(),
        risk: risk.to_string(),
        disclaimer: disclaimer.to_string(),
        confidence: OFFLINE_CONFIDENCE.to_string(),
        sections,
        raw_response: OFFLINE_RAW_RESPONSE.to_string(),
    }
}
