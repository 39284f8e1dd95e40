use anyhow::{anyhow, Context as AnyhowContext, Result};
use civic_feedback::{
    compact_fact_line, predefined_persona, predefined_personas, FeedbackResponse, FeedbackSession,
    PersonaInfo,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "civic")]
#[command(about = "Persona-voiced, fact-grounded feedback for urban design projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fact collection path
    #[arg(long, global = true, default_value = "data/fact.json")]
    facts: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Http,
    Stub,
}

impl EmbedMode {
    const fn as_str(self) -> &'static str {
        match self {
            EmbedMode::Http => "http",
            EmbedMode::Stub => "stub",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load facts and build the embedding matrix
    Index,

    /// Rank facts for a place and project description
    Retrieve {
        /// Persona place, e.g. "Karlsplatz"
        #[arg(long, default_value = "")]
        place: String,

        /// Project description
        #[arg(long)]
        description: String,

        /// Optional follow-up message
        #[arg(long, default_value = "")]
        message: String,

        /// Number of facts to return
        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Run one feedback turn as a persona
    Feedback {
        /// Built-in persona label, or @path to a persona JSON file
        #[arg(long)]
        persona: String,

        /// Project description
        #[arg(long)]
        description: String,

        /// Optional project image (PNG/JPEG)
        #[arg(long)]
        image: Option<PathBuf>,

        /// Optional follow-up message; omit for the initial evaluation
        #[arg(long, default_value = "")]
        message: String,
    },

    /// Generate a first-person story for a persona
    Story {
        /// Built-in persona label, or @path to a persona JSON file
        #[arg(long)]
        persona: String,
    },

    /// List the built-in personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(mode) = cli.embed_mode {
        std::env::set_var("CIVIC_EMBEDDING_MODE", mode.as_str());
    }

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Index => {
            let session = FeedbackSession::load(&cli.facts).await?;
            let matrix = session.get_or_build_embeddings().await?;
            println!(
                "Indexed {} facts (checksum {}), embedding matrix {}x{}",
                session.facts().len(),
                session.checksum(),
                matrix.nrows(),
                matrix.ncols()
            );
        }

        Commands::Retrieve {
            place,
            description,
            message,
            k,
        } => {
            let session = FeedbackSession::load(&cli.facts).await?;
            let mut persona = PersonaInfo::new();
            if !place.is_empty() {
                persona.insert("place".to_string(), serde_json::Value::String(place));
            }
            let facts = session
                .retrieve_facts(&persona, &description, &message, k)
                .await?;
            if facts.is_empty() {
                println!("No facts retrieved.");
            }
            for fact in &facts {
                println!("{}", compact_fact_line(fact));
            }
        }

        Commands::Feedback {
            persona,
            description,
            image,
            message,
        } => {
            let persona = resolve_persona(&persona)?;
            let image_bytes = match &image {
                Some(path) => Some(
                    std::fs::read(path)
                        .with_context(|| format!("Failed to read image {}", path.display()))?,
                ),
                None => None,
            };

            let session = FeedbackSession::load(&cli.facts).await?;
            let response = session
                .request_feedback(&persona, &description, image_bytes.as_deref(), &message)
                .await?;
            print_response(&response);
        }

        Commands::Story { persona } => {
            let persona = resolve_persona(&persona)?;
            let session = FeedbackSession::load(&cli.facts).await?;
            let story = session.generate_persona_story(&persona).await?;
            println!("{story}");
        }

        Commands::Personas => {
            for (label, info) in predefined_personas() {
                let name = info
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("-");
                println!("{label} ({name})");
            }
        }
    }

    Ok(())
}

/// A persona argument is either a built-in label or `@file.json` with a
/// persona object.
fn resolve_persona(arg: &str) -> Result<PersonaInfo> {
    if let Some(path) = arg.strip_prefix('@') {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona file {path}"))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).with_context(|| format!("Invalid persona JSON in {path}"))?;
        return value
            .as_object()
            .cloned()
            .ok_or_else(|| anyhow!("Persona file {path} must contain a JSON object"));
    }

    predefined_persona(arg).cloned().ok_or_else(|| {
        let labels: Vec<&str> = predefined_personas().iter().map(|(label, _)| *label).collect();
        anyhow!(
            "Unknown persona '{arg}'. Built-in personas: {}",
            labels.join(", ")
        )
    })
}

fn print_response(response: &FeedbackResponse) {
    match response {
        FeedbackResponse::Text(text) => println!("{text}"),
        FeedbackResponse::Structured(feedback) => {
            println!("{}", feedback.descriptive);
            if !feedback.likes.is_empty() {
                println!("\nLikes:");
                for like in &feedback.likes {
                    println!("  + {like}");
                }
            }
            if !feedback.concerns.is_empty() {
                println!("\nConcerns:");
                for concern in &feedback.concerns {
                    println!("  - {concern}");
                }
            }
            let scores = &feedback.scores;
            println!("\nScores (0-5):");
            println!("  Safety             {:.1}", scores.safety);
            println!("  Comfort            {:.1}", scores.comfort);
            println!("  Accessibility      {:.1}", scores.accessibility);
            println!("  Aesthetics         {:.1}", scores.aesthetics);
            println!("  Social Interaction {:.1}", scores.social_interaction);
        }
    }
}
