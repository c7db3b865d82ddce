// src/models.rs
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Confidence label attached to every result produced without the remote model.
pub const OFFLINE_CONFIDENCE: &str = "Low (offline mode)";

/// Bite results at or above this danger level are flagged as emergencies.
pub const EMERGENCY_DANGER_LEVEL: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Bite,
    Plant,
    Animal,
    HealingComparison,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Bite => "bite",
            AnalysisKind::Plant => "plant",
            AnalysisKind::Animal => "animal",
            AnalysisKind::HealingComparison => "healing_comparison",
        }
    }

    /// What the model is asked to confirm the photo shows.
    pub fn subject(&self) -> &'static str {
        match self {
            AnalysisKind::Bite => "Bug Bite",
            AnalysisKind::Plant => "Plant",
            AnalysisKind::Animal => "Animal",
            AnalysisKind::HealingComparison => "Wound",
        }
    }

    /// Leading line the model uses to reject a photo of the wrong subject.
    pub fn rejection_sentinel(&self) -> &'static str {
        match self {
            AnalysisKind::Bite => "Not a Bug Bite:",
            AnalysisKind::Plant => "Not a Plant:",
            AnalysisKind::Animal => "Not an Animal:",
            AnalysisKind::HealingComparison => "Not a Wound:",
        }
    }

    /// Total transport attempts allowed for this kind of call.
    pub fn max_attempts(&self) -> u32 {
        match self {
            AnalysisKind::Bite => 3,
            AnalysisKind::Plant | AnalysisKind::Animal | AnalysisKind::HealingComparison => 2,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown analysis kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for AnalysisKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bite" => Ok(AnalysisKind::Bite),
            "plant" => Ok(AnalysisKind::Plant),
            "animal" => Ok(AnalysisKind::Animal),
            "healing" | "healing_comparison" | "healing-comparison" => {
                Ok(AnalysisKind::HealingComparison)
            }
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub skin_color: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub medical_conditions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where and how the photo was taken. `location` is already-resolved text; when
/// it is absent but `coordinates` are present the service may reverse-geocode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentContext {
    pub coordinates: Option<Coordinates>,
    pub location: Option<String>,
    pub activity: Option<String>,
    pub setting: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealingBaseline {
    pub image: Bytes,
    pub days_since: u32,
}

/// One user action's worth of input. Built once, then moved into
/// `AnalysisService::analyze`.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    kind: AnalysisKind,
    image: Bytes,
    notes: Option<String>,
    profile: Option<UserProfile>,
    context: Option<EnvironmentContext>,
    baseline: Option<HealingBaseline>,
}

impl AnalysisRequest {
    fn new(kind: AnalysisKind, image: Bytes) -> Self {
        Self {
            kind,
            image,
            notes: None,
            profile: None,
            context: None,
            baseline: None,
        }
    }

    pub fn bite(image: impl Into<Bytes>) -> Self {
        Self::new(AnalysisKind::Bite, image.into())
    }

    pub fn plant(image: impl Into<Bytes>) -> Self {
        Self::new(AnalysisKind::Plant, image.into())
    }

    pub fn animal(image: impl Into<Bytes>) -> Self {
        Self::new(AnalysisKind::Animal, image.into())
    }

    /// Compares the latest photo of a bite against the day-one photo.
    pub fn healing_comparison(
        day_one: impl Into<Bytes>,
        latest: impl Into<Bytes>,
        days_since: u32,
    ) -> Self {
        let mut request = Self::new(AnalysisKind::HealingComparison, latest.into());
        request.baseline = Some(HealingBaseline {
            image: day_one.into(),
            days_since,
        });
        request
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_context(mut self, context: EnvironmentContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn context(&self) -> Option<&EnvironmentContext> {
        self.context.as_ref()
    }

    pub fn baseline(&self) -> Option<&HealingBaseline> {
        self.baseline.as_ref()
    }

    pub fn has_notes(&self) -> bool {
        self.notes.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiteAnalysis {
    pub insect_or_cause: String,
    pub pattern_description: String,
    pub severity: String,
    pub recommended_care: String,
    pub recommended_products: Vec<Product>,
    pub possible_risks: String,
    pub medical_attention_signs: String,
    pub danger_level: u8,
    pub confidence: String,
    pub is_bug_bite: bool,
    pub raw_response: String,
}

impl BiteAnalysis {
    pub fn is_emergency(&self) -> bool {
        self.danger_level >= EMERGENCY_DANGER_LEVEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub label: String,
    pub value: String,
}

/// Plant and animal identifications. The named fields are pulled from the
/// section map; everything the model returned is kept in `sections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationReport {
    pub species: String,
    pub description: String,
    pub risk: String,
    pub disclaimer: String,
    pub confidence: String,
    pub sections: Vec<ReportSection>,
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingReport {
    pub healing_status: String,
    pub visual_changes: Vec<String>,
    pub treatment_recommendation: String,
    pub medical_care_signs: String,
    pub confidence: String,
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Bite(BiteAnalysis),
    Plant(IdentificationReport),
    Animal(IdentificationReport),
    HealingComparison(HealingReport),
}

impl AnalysisOutcome {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisOutcome::Bite(_) => AnalysisKind::Bite,
            AnalysisOutcome::Plant(_) => AnalysisKind::Plant,
            AnalysisOutcome::Animal(_) => AnalysisKind::Animal,
            AnalysisOutcome::HealingComparison(_) => AnalysisKind::HealingComparison,
        }
    }

    pub fn confidence(&self) -> &str {
        match self {
            AnalysisOutcome::Bite(bite) => &bite.confidence,
            AnalysisOutcome::Plant(report) | AnalysisOutcome::Animal(report) => &report.confidence,
            AnalysisOutcome::HealingComparison(report) => &report.confidence,
        }
    }

    pub fn as_bite(&self) -> Option<&BiteAnalysis> {
        match self {
            AnalysisOutcome::Bite(bite) => Some(bite),
            _ => None,
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.as_bite().is_some_and(BiteAnalysis::is_emergency)
    }
}
