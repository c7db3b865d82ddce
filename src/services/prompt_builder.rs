// src/services/prompt_builder.rs
use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::context::{Season, TimeOfDay};
use crate::models::{AnalysisKind, AnalysisRequest, EnvironmentContext, UserProfile};
use crate::services::image_processor::PreparedImage;
use crate::services::llm_service::{ChatMessage, ChatRequest, ContentPart, ImageUrl};
use base64::{Engine as _, engine::general_purpose};
use chrono::NaiveDateTime;

pub const UNIVERSAL_INSTRUCTION: &str = "You are a helpful assistant. Provide concise, structured responses using labeled sections. Include disclaimers when necessary.";

pub const DEFAULT_SYMPTOMS: &str =
    "Red or irritated skin after outdoor exposure. Unknown cause. Slight swelling and itchiness.";

const BITE_GRAMMAR: &str = r#"**FIRST:** Determine if the image actually shows a bug bite, sting, or related skin reaction. If you're confident it is NOT a bug bite or sting (e.g., it's a random object, unrelated skin condition, or non-medical image), respond with ONLY:

Not a Bug Bite: [Brief explanation of what the image actually shows]

HOWEVER, if it appears to be a possible bug bite, sting, or related skin reaction, respond in this EXACT format:

Insect or Cause: [Most likely insect or cause]

Pattern Description: [Brief description of bite appearance]

Severity: [Brief assessment of severity]

Recommended Care: [1-3 concise treatment recommendations]

Recommended Products:
- [Product] – [Brief description]
- [Product] – [Brief description]

Possible Risks: [Brief mention of potential complications]

When to Seek Medical Attention: [1-2 clear indicators for medical care]

Danger Level (1-10): [Number between 1-10]

Confidence: [High/Medium/Low] - [Brief reason for confidence level]

Disclaimer: This is not a medical diagnosis and should not replace professional medical advice."#;

const PLANT_GRAMMAR: &str = r#"If the image does not show a plant, respond with ONLY:

Not a Plant: [Brief explanation of what the image actually shows]

Otherwise respond in this format:

Species: [Most likely plant name]

Appearance: [Brief description]

Toxicity: [Non-toxic/Mildly toxic/Moderately toxic/Highly toxic]

Common Uses (if any): [Brief description if applicable]

Region or Habitat: [Brief description]

Notes: [Any important additional information]

Confidence: [High/Medium/Low]

Disclaimer: This is not a scientific identification or medical recommendation."#;

const ANIMAL_GRAMMAR: &str = r#"If the image does not show an animal, respond with ONLY:

Not an Animal: [Brief explanation of what the image actually shows]

Otherwise respond in this format:

Species: [Most likely animal identification]

Behavior Observed: [Brief description based on image]

Typical Habitat: [Where this animal is commonly found]

Risk to Humans: [None/Low/Moderate/High] - [Brief explanation]

Conservation Status: [Common/Threatened/Endangered/Protected]

Confidence: [High/Medium/Low]

Disclaimer: This is an AI-generated identification and may not be fully accurate."#;

const HEALING_GRAMMAR: &str = r#"If the photos do not show a bite, sting, or wound, respond with ONLY:

Not a Wound: [Brief explanation of what the photos actually show]

Otherwise provide a concise assessment in this format:

Healing Status: [Healing/Unchanged/Worsening]

Visual Changes:
- Size: [Increased/Decreased/Same]
- Color: [Better/Worse/Same]
- Swelling: [Better/Worse/Same]

Treatment Recommendation: [Brief 1-2 sentence advice]

When to Seek Medical Care: [Specific warning signs]

Confidence: [High/Medium/Low]

Provide a brief explanation (2-3 sentences max). Do not give extensive medical advice."#;

/// Builds the chat payload for a request. Pure apart from its inputs: the
/// caller supplies prepared images, resolved location text and the local time.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model: String,
    max_tokens: u32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_MAX_TOKENS)
    }
}

impl PromptBuilder {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
        }
    }

    /// `images` are attached in order; for a healing comparison that is the
    /// day-one photo followed by the latest one.
    pub fn build(
        &self,
        request: &AnalysisRequest,
        images: &[PreparedImage],
        location: Option<&str>,
        now: NaiveDateTime,
    ) -> ChatRequest {
        let prompt = self.prompt_text(request, location, now);

        let mut content = vec![
            ContentPart::Text {
                text: UNIVERSAL_INSTRUCTION.to_string(),
            },
            ContentPart::Text { text: prompt },
        ];
        content.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_uri(image),
            },
        }));

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens: self.max_tokens,
        }
    }

    pub fn prompt_text(
        &self,
        request: &AnalysisRequest,
        location: Option<&str>,
        now: NaiveDateTime,
    ) -> String {
        match request.kind() {
            AnalysisKind::Bite => bite_prompt(request, location, now),
            AnalysisKind::Plant => identification_prompt(
                "Identify the plant in this image and provide key safety information.",
                request.notes(),
                location,
                PLANT_GRAMMAR,
            ),
            AnalysisKind::Animal => identification_prompt(
                "Identify the animal in this image and assess potential risks.",
                request.notes(),
                location,
                ANIMAL_GRAMMAR,
            ),
            AnalysisKind::HealingComparison => healing_prompt(request),
        }
    }
}

pub fn data_uri(image: &PreparedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        general_purpose::STANDARD.encode(&image.data)
    )
}

fn list_or_none(items: Option<&Vec<String>>) -> String {
    match items {
        Some(items) if !items.is_empty() => items.join(", "),
        _ => "None".to_string(),
    }
}

pub fn profile_block(profile: Option<&UserProfile>) -> String {
    let empty = UserProfile::default();
    let profile = profile.unwrap_or(&empty);
    let age = profile
        .age
        .map(|age| age.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    format!(
        "User Profile:\n- Age: {}\n- Gender: {}\n- Skin Color: {}\n- Allergies: {}\n- Medical Conditions: {}",
        age,
        profile.gender.as_deref().unwrap_or("Unknown"),
        profile.skin_color.as_deref().unwrap_or("Unknown"),
        list_or_none(profile.allergies.as_ref()),
        list_or_none(profile.medical_conditions.as_ref()),
    )
}

pub fn symptom_text(notes: Option<&str>) -> &str {
    match notes {
        Some(notes) if !notes.trim().is_empty() => notes,
        _ => DEFAULT_SYMPTOMS,
    }
}

pub fn environment_block(
    context: Option<&EnvironmentContext>,
    location: Option<&str>,
    now: NaiveDateTime,
) -> String {
    let mut block = String::from("Environmental Context:\n");

    let has_coordinates = context.is_some_and(|c| c.coordinates.is_some());
    if let Some(location) = location {
        block.push_str(&format!("- Location: {location}\n"));
    } else if has_coordinates {
        block.push_str("- Location: Unknown\n");
    }

    block.push_str(&format!("- Season: {}\n", Season::at(now)));

    if let Some(activity) = context.and_then(|c| c.activity.as_deref()) {
        block.push_str(&format!("- Activity: {activity}\n"));
    }

    block.push_str(&format!("- Time of Day: {}\n", TimeOfDay::at(now)));

    if let Some(setting) = context.and_then(|c| c.setting.as_deref()) {
        block.push_str(&format!("- Setting: {setting}\n"));
    }

    block
}

fn bite_prompt(request: &AnalysisRequest, location: Option<&str>, now: NaiveDateTime) -> String {
    format!(
        "You are an expert in dermatology and entomology specializing in insect bite identification. Analyze the image and user data to determine the likely cause of a skin reaction.\n\n{}\n\n{}\nUser Notes: {}\n\n{}",
        profile_block(request.profile()),
        environment_block(request.context(), location, now),
        symptom_text(request.notes()),
        BITE_GRAMMAR,
    )
}

fn identification_prompt(
    task: &str,
    notes: Option<&str>,
    location: Option<&str>,
    grammar: &str,
) -> String {
    let notes = notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("None");
    let location_line = location
        .map(|l| format!("Location context: {l}\n"))
        .unwrap_or_default();

    format!("{task} User notes: \"{notes}\"\n{location_line}\n{grammar}")
}

fn healing_prompt(request: &AnalysisRequest) -> String {
    let days_since = request.baseline().map(|b| b.days_since).unwrap_or(0);
    let notes = request
        .notes()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!("User notes: \"{n}\"\n"))
        .unwrap_or_default();

    format!(
        "Compare these two wound photos:\n- First photo (Day 1): the first attached image\n- Second photo (Day {}): the second attached image\n{}\nBased on the appearance, {}",
        days_since,
        notes,
        HEALING_GRAMMAR,
    )
}
