use crate::persona::NormalizedPersona;
use civic_facts::Fact;
use serde_json::Value;

/// Voice constraints appended to follow-up prompts so chat replies stay
/// short and in character.
pub const VOICE_GUIDE: &str = "\
Speak like a real person in first person (\"I\"). Keep it natural, specific, and succinct.
Answer in 2-4 short sentences. No bullet points, no headings, no section labels.
Refer to one or two concrete details from the image or description when relevant (e.g., benches, lighting, shade, paths, signage).
Only answer the user's last message; do not summarize the whole project or restate earlier points.
Do not end with a generic wrap-up like \"these changes would help everyone\".
Do not ask a question unless the user explicitly asked you one.";

/// One-line rendering of a retrieved fact for grounding blocks.
#[must_use]
pub fn compact_fact_line(fact: &Fact) -> String {
    format!(
        "[{}] {} — {} (as of {})",
        fact.id, fact.title, fact.summary, fact.time.as_of
    )
}

#[must_use]
pub fn facts_block(facts: &[Fact]) -> String {
    facts
        .iter()
        .map(compact_fact_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bulleted persona profile embedded in both prompt variants.
#[must_use]
pub fn persona_profile(persona: &NormalizedPersona) -> String {
    format!(
        "\
- Age: {}
- Gender: {}
- Lives in: {}
- Frequency of use: {}
- Reason for visiting: {}
- Values: {}
- Mobility habits: {}
- Accessibility needs: {}
- Background: {}",
        persona.age,
        persona.gender,
        persona.place,
        persona.frequency,
        persona.reasons,
        persona.values,
        persona.mobility,
        persona.accessibility,
        persona.story
    )
}

/// System prompt for the initial structured evaluation. The model must
/// answer in the fixed JSON shape consumed by the tolerant parser.
#[must_use]
pub fn initial_feedback_prompt(persona: &NormalizedPersona, facts: &[Fact]) -> String {
    format!(
        "\
You are a long-term resident of {place}, and you have lived there for several years.
You have the following characteristics:
{profile}

Your role is to assist urban designers in evaluating their proposed design for {place}.
You will be provided with:
- A designed image created by an urban designer.
- A brief text description explaining the design intent and changes.

Based on your persona, the project description, and the project image, provide honest, empathetic, and experience-based feedback.
Carefully examine the image to identify and mention relevant urban furniture, seating, vegetation, paths, lighting, and other design details.
Please return your feedback strictly in the following JSON format:
{{
  \"Descriptive feedback\": \"\",
  \"What's you like\": \"\",
  \"What's you concern\": \"\",
  \"Safety\": 0.0,
  \"Comfort\": 0.0,
  \"Accessibility\": 0.0,
  \"Aesthetics\": 0.0,
  \"Social Interaction\": 0.0
}}

Guidance:
- \"Descriptive feedback\" should reflect your own lived perspective using empathy map style: what you see, hear, think, and feel when experiencing the design.
- \"What's you like\" and \"What's you concern\" should be concise, max 3 bullet points each. If none, write \"None\".
- Scores: numeric between 0.0 and 5.0 based on your subjective evaluation.
- Do not generate content outside the specified JSON format.

Use the following local facts when relevant (IDs shown for context):
{facts}",
        place = persona.place,
        profile = persona_profile(persona),
        facts = facts_block(facts)
    )
}

/// System prompt for free-form follow-up turns.
#[must_use]
pub fn followup_prompt(persona: &NormalizedPersona, facts: &[Fact]) -> String {
    format!(
        "\
You are a long-term resident with the following characteristics:
{profile}

You are continuing to provide feedback on an urban design project in {place}.
You have access to both the project description and the project image.
Carefully examine the image to identify and mention relevant urban furniture, seating, vegetation, paths, lighting, and other design elements.

You also have access to local, structured facts (IDs + summaries):
{facts}
Prefer these facts when relevant; do not invent new facts.
If a fact seems unrelated, ignore it.

Respond in your persona's voice, referencing what you see in the image when relevant.
{voice}",
        profile = persona_profile(persona),
        place = persona.place,
        facts = facts_block(facts),
        voice = VOICE_GUIDE
    )
}

/// Prompt for synthesizing a first-person user story from a custom
/// persona profile. The profile is injected as a prebuilt JSON blob so
/// free-text fields cannot collide with the template.
#[must_use]
pub fn story_prompt(profile: &Value) -> String {
    let profile_json =
        serde_json::to_string_pretty(profile).unwrap_or_else(|_| profile.to_string());
    format!(
        "\
You are a user story generator for urban design research.
You will be provided with a custom persona profile filled in by a user.
Your goal is to generate a vivid, empathetic, first-person narrative that reflects this person's relationship with their local urban environment (e.g., park, street, square, playground).
Use a natural human tone. Include contextual details (e.g., time of day, companions, what they see/do/feel/remember). Keep it grounded and believable, focused on needs and values related to the space.
---
Persona Profile Input:
{profile_json}
---
Write a first-person user story starting naturally, for example:
\"I am a {{Age}} years old {{Gender}}. I've lived in {{Place}} for several years...\" or \"Every {{Frequency of use}}, I come here because...\"
User story must be <=150 words.
Output:
<USER STORY>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{NormalizedPersona, PersonaInfo};
    use serde_json::json;

    fn persona() -> NormalizedPersona {
        let info: PersonaInfo = json!({
            "place": "Karlsplatz",
            "age": 36,
            "gender": "Female",
            "frequency": "Weekly",
            "reasons": ["Walking dogs"],
            "values": "quiet spaces",
        })
        .as_object()
        .cloned()
        .unwrap();
        NormalizedPersona::from_info(&info)
    }

    fn fact() -> Fact {
        serde_json::from_value(json!({
            "id": "VIE-KAR-01",
            "title": "Bench replacement",
            "summary": "New benches installed",
            "tags": ["seating"],
            "type": "maintenance",
            "time": { "as_of": "2024-05" }
        }))
        .unwrap()
    }

    #[test]
    fn fact_lines_follow_the_compact_format() {
        assert_eq!(
            compact_fact_line(&fact()),
            "[VIE-KAR-01] Bench replacement — New benches installed (as of 2024-05)"
        );
    }

    #[test]
    fn initial_prompt_embeds_place_profile_and_facts() {
        let prompt = initial_feedback_prompt(&persona(), &[fact()]);
        assert!(prompt.contains("long-term resident of Karlsplatz"));
        assert!(prompt.contains("- Age: 36"));
        assert!(prompt.contains("- Reason for visiting: Walking dogs"));
        assert!(prompt.contains("\"Descriptive feedback\""));
        assert!(prompt.contains("[VIE-KAR-01] Bench replacement"));
    }

    #[test]
    fn followup_prompt_carries_grounding_and_voice_rules() {
        let prompt = followup_prompt(&persona(), &[fact()]);
        assert!(prompt.contains("do not invent new facts"));
        assert!(prompt.contains("[VIE-KAR-01]"));
        assert!(prompt.contains("first person"));
        assert!(!prompt.contains("JSON format"));
    }

    #[test]
    fn story_prompt_injects_the_profile_blob() {
        let profile = json!({"Place": "Karlsplatz", "Age": "62"});
        let prompt = story_prompt(&profile);
        assert!(prompt.contains("\"Place\": \"Karlsplatz\""));
        assert!(prompt.contains("<USER STORY>"));
    }
}
