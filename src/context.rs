//! Prompt assembly for persona chat and enrichment
//!
//! Both builders are pure functions over the persona row and, for chat,
//! a bounded window of prior messages. Same inputs always produce the
//! same prompt text.

use std::fmt::Write;

use crate::db::{Message, Persona};

/// Build the system prompt for a chat turn with a persona.
///
/// Raw data points are grouped by category in first-seen order, capped at
/// 10 values per category with a "..." marker when more exist.
pub fn build_persona_context(persona: &Persona, messages: &[Message]) -> String {
    let demographics = persona.demographics.as_ref();
    let demo_field = |key: &str, fallback: &str| -> String {
        demographics
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };

    let mut context = format!(
        r#"You are responding as the "{}" persona. This persona represents a specific audience segment with these characteristics:

Demographics:
- {} of the total audience
- {}
- {}

Summary: {}

Key Data Points:"#,
        persona.name,
        demo_field("percentage", "Unknown %"),
        demo_field("genderSplit", "Mixed gender"),
        demo_field("devicePreference", "Various devices"),
        persona
            .summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("No summary available"),
    );

    for (category, values) in group_by_category(&persona.raw_data) {
        let shown: Vec<&str> = values.iter().take(10).map(String::as_str).collect();
        let suffix = if values.len() > 10 { "..." } else { "" };
        let _ = write!(context, "\n{}: {}{}", category, shown.join(", "), suffix);
    }

    context.push_str(
        r#"

Instructions:
1. Always respond from the perspective of this specific audience segment
2. Use "we" and "our" to represent the collective voice of this audience
3. Be specific and reference the actual data points when relevant
4. Avoid generic responses - tailor everything to this audience's characteristics
5. If asked about preferences, purchases, or behaviors, ground your response in the data
6. Be direct and factual without unnecessary praise or encouragement
7. For marketing/campaign questions, suggest strategies that would genuinely resonate with this audience

Previous conversation:"#,
    );

    for msg in messages {
        let _ = write!(context, "\n{}: {}", msg.role, msg.content);
    }

    context
}

/// Group raw records by Category, preserving first-seen category order
fn group_by_category(raw_data: &serde_json::Value) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    if let Some(records) = raw_data.as_array() {
        for record in records {
            let category = record
                .get("Category")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("Other")
                .to_string();
            let value = match record.get("Value").and_then(|v| v.as_str()) {
                Some(value) => value.to_string(),
                None => continue,
            };

            match groups.iter_mut().find(|(c, _)| *c == category) {
                Some((_, values)) => values.push(value),
                None => groups.push((category, vec![value])),
            }
        }
    }

    groups
}

/// Build the enrichment prompt asking for the six-key persona profile
pub fn build_enrichment_prompt(raw_data: &serde_json::Value) -> String {
    let data_json = serde_json::to_string_pretty(raw_data).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"I'm going to upload a CSV file which has a number of categorised data points about an audience segment. Based on this data, create a detailed persona that represents this audience.

Analyze the following data and create a persona profile:
{}

Provide:
1. A name for this persona
2. Demographics summary
3. Key characteristics and behaviors
4. Content preferences
5. Purchase motivators
6. Marketing recommendations

Format the response as JSON with these keys: name, demographics, characteristics, contentPreferences, purchaseMotivators, marketingRecommendations"#,
        data_json
    )
}

/// System prompt paired with the enrichment prompt
pub const ENRICHMENT_SYSTEM_PROMPT: &str =
    "You are an expert market researcher creating detailed audience personas.";
