use crate::chat::{ChatMessage, CompletionBackend, CompletionOptions, HttpCompletionBackend};
use crate::error::Result;
use crate::media::encode_image_payload;
use crate::parse::{parse_structured_feedback, StructuredFeedback};
use crate::persona::{query_fields, story_profile, NormalizedPersona, PersonaInfo};
use crate::prompt;
use civic_facts::{checksum, Fact, FactStore};
use civic_retrieval::{retrieve, Embedder, EmbeddingCache, RetrievalQuery};
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Facts handed to the prompt builder per turn.
pub const TOP_K_FACTS: usize = 5;

const TEMPERATURE: f32 = 0.4;
const INITIAL_MAX_TOKENS: u32 = 1000;
const FOLLOWUP_MAX_TOKENS: u32 = 500;
const STORY_MAX_TOKENS: u32 = 200;

/// Result of one feedback turn: the initial evaluation is structured,
/// follow-up chat turns are free text.
#[derive(Debug, Clone)]
pub enum FeedbackResponse {
    Structured(StructuredFeedback),
    Text(String),
}

/// One practitioner session: facts, their checksum, the embedding cache
/// and the two external-service clients.
///
/// A failed service call aborts only the current turn; facts, checksum
/// and any cached embeddings survive for the next attempt.
pub struct FeedbackSession {
    facts: Vec<Fact>,
    checksum: String,
    cache: EmbeddingCache,
    embedder: Embedder,
    completion: Arc<dyn CompletionBackend>,
}

impl FeedbackSession {
    /// Load facts from disk and wire the env-configured service clients.
    pub async fn load(fact_path: impl AsRef<Path>) -> Result<Self> {
        let facts = FactStore::load(fact_path).await?;
        let embedder = Embedder::from_env()?;
        let completion: Arc<dyn CompletionBackend> = Arc::new(HttpCompletionBackend::from_env()?);
        Ok(Self::new(facts, embedder, completion))
    }

    #[must_use]
    pub fn new(facts: Vec<Fact>, embedder: Embedder, completion: Arc<dyn CompletionBackend>) -> Self {
        let checksum = checksum(&facts);
        Self {
            facts,
            checksum,
            cache: EmbeddingCache::new(),
            embedder,
            completion,
        }
    }

    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Cached fact matrix; rebuilt only when the checksum changed.
    pub async fn get_or_build_embeddings(&self) -> Result<Arc<Array2<f32>>> {
        Ok(self
            .cache
            .get_or_build(&self.facts, &self.checksum, &self.embedder)
            .await?)
    }

    /// Top-k facts for this persona, project and chat turn.
    pub async fn retrieve_facts(
        &self,
        persona: &PersonaInfo,
        project_description: &str,
        user_message: &str,
        k: usize,
    ) -> Result<Vec<Fact>> {
        let matrix = self.get_or_build_embeddings().await?;
        let (place, values, reasons) = query_fields(persona);
        let query = RetrievalQuery {
            place,
            project_description: project_description.to_string(),
            user_message: user_message.to_string(),
            values,
            reasons,
        };
        Ok(retrieve(&self.facts, &matrix, &query, k, &self.embedder).await?)
    }

    /// Render the grounded system prompt for a turn. An empty user
    /// message selects the initial structured evaluation framing.
    #[must_use]
    pub fn build_grounded_prompt(
        &self,
        persona: &PersonaInfo,
        user_message: &str,
        top_facts: &[Fact],
    ) -> String {
        let normalized = NormalizedPersona::from_info(persona);
        if user_message.trim().is_empty() {
            prompt::initial_feedback_prompt(&normalized, top_facts)
        } else {
            prompt::followup_prompt(&normalized, top_facts)
        }
    }

    /// Run one feedback turn against the completion service.
    pub async fn request_feedback(
        &self,
        persona: &PersonaInfo,
        project_description: &str,
        image: Option<&[u8]>,
        user_message: &str,
    ) -> Result<FeedbackResponse> {
        let top_facts = self
            .retrieve_facts(persona, project_description, user_message, TOP_K_FACTS)
            .await?;
        log::debug!(
            "Grounding feedback on {} facts: {:?}",
            top_facts.len(),
            top_facts.iter().map(|f| f.id.as_str()).collect::<Vec<_>>()
        );

        let system = self.build_grounded_prompt(persona, user_message, &top_facts);
        let mut messages = vec![ChatMessage::system(system)];

        let description = format!("Project description: {project_description}");
        match image {
            Some(bytes) => messages.push(ChatMessage::user_with_image(
                description,
                encode_image_payload(bytes)?,
            )),
            None => messages.push(ChatMessage::user(description)),
        }

        if user_message.trim().is_empty() {
            let options = CompletionOptions {
                temperature: TEMPERATURE,
                max_tokens: INITIAL_MAX_TOKENS,
                json_mode: true,
            };
            let raw = self.completion.complete(&messages, &options).await?;
            Ok(FeedbackResponse::Structured(parse_structured_feedback(&raw)))
        } else {
            messages.push(ChatMessage::user(user_message));
            let options = CompletionOptions {
                temperature: TEMPERATURE,
                max_tokens: FOLLOWUP_MAX_TOKENS,
                json_mode: false,
            };
            let raw = self.completion.complete(&messages, &options).await?;
            Ok(FeedbackResponse::Text(raw))
        }
    }

    /// Synthesize a short first-person story for a custom persona.
    pub async fn generate_persona_story(&self, persona: &PersonaInfo) -> Result<String> {
        let profile = story_profile(persona);
        let messages = vec![
            ChatMessage::system("You are a helpful writing assistant."),
            ChatMessage::user(prompt::story_prompt(&profile)),
        ];
        let options = CompletionOptions {
            temperature: TEMPERATURE,
            max_tokens: STORY_MAX_TOKENS,
            json_mode: false,
        };
        self.completion.complete(&messages, &options).await
    }
}
