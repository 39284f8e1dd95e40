//! # Civic Feedback
//!
//! Persona-voiced, fact-grounded design feedback over an external
//! completion service.
//!
//! The crate owns everything between the retrieval layer and the model
//! call: persona field normalization, grounded prompt assembly, the
//! chat/completions client (text and image payloads), tolerant recovery
//! of structured model output, and the [`FeedbackSession`] facade the
//! UI layer drives.

mod chat;
mod error;
mod media;
mod parse;
mod persona;
mod prompt;
mod session;

pub use chat::{
    ChatMessage, CompletionBackend, CompletionConfig, CompletionOptions, ContentPart,
    HttpCompletionBackend, MessageContent, DEFAULT_CHAT_MODEL,
};
pub use error::{FeedbackError, Result};
pub use media::encode_image_payload;
pub use parse::{parse_structured_feedback, EvaluationScores, StructuredFeedback, DEFAULT_SCORE};
pub use persona::{
    predefined_persona, predefined_personas, query_fields, story_profile, NormalizedPersona,
    PersonaInfo, PERSONA_CATEGORIES,
};
pub use prompt::{
    compact_fact_line, facts_block, followup_prompt, initial_feedback_prompt, persona_profile,
    story_prompt, VOICE_GUIDE,
};
pub use session::{FeedbackResponse, FeedbackSession, TOP_K_FACTS};
