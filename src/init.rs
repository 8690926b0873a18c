use std::path::PathBuf;

use dialoguer::{Confirm, Input};
use primer_core::config::{ChunkingConfig, Config, LlmConfig, RetrievalConfig, StoreConfig};

#[derive(Default)]
pub(crate) struct WizardState {
    pub(crate) generation_model: Option<String>,
    pub(crate) embedding_model: Option<String>,
    pub(crate) embedding_dim: usize,
    pub(crate) sqlite_path: Option<String>,
}

pub fn run(output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("primer init - configuration wizard\n");

    let mut state = WizardState {
        embedding_dim: 768,
        ..WizardState::default()
    };

    step_gemini(&mut state)?;
    step_storage(&mut state)?;
    step_review_and_write(&state, output)?;

    Ok(())
}

fn step_gemini(state: &mut WizardState) -> anyhow::Result<()> {
    println!("== Step 1/3: Gemini Models ==\n");

    state.generation_model = Some(
        Input::new()
            .with_prompt("Generation model")
            .default("gemini-2.0-flash".into())
            .interact_text()?,
    );
    state.embedding_model = Some(
        Input::new()
            .with_prompt("Embedding model")
            .default("gemini-embedding-001".into())
            .interact_text()?,
    );
    state.embedding_dim = Input::new()
        .with_prompt("Embedding dimension")
        .default(768usize)
        .interact_text()?;

    println!();
    Ok(())
}

fn step_storage(state: &mut WizardState) -> anyhow::Result<()> {
    println!("== Step 2/3: Storage ==\n");

    state.sqlite_path = Some(
        Input::new()
            .with_prompt("SQLite database path")
            .default("data/primer.db".into())
            .interact_text()?,
    );

    println!();
    Ok(())
}

/// The API key never lands in the file; it is read from
/// `PRIMER_GEMINI_API_KEY` at startup.
pub(crate) fn build_config(state: &WizardState) -> Config {
    Config {
        llm: LlmConfig {
            provider: "gemini".into(),
            api_key: String::new(),
            generation_model: state
                .generation_model
                .clone()
                .unwrap_or_else(|| "gemini-2.0-flash".into()),
            embedding_model: state
                .embedding_model
                .clone()
                .unwrap_or_else(|| "gemini-embedding-001".into()),
            embedding_dim: state.embedding_dim,
            embedding_batch_size: 64,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        },
        store: StoreConfig {
            sqlite_path: state
                .sqlite_path
                .clone()
                .unwrap_or_else(|| "data/primer.db".into()),
        },
        chunking: ChunkingConfig {
            min_chars: 800,
            max_chars: 1200,
            overlap_chars: 150,
        },
        retrieval: RetrievalConfig {
            top_k: 8,
            score_threshold: 0.25,
            min_chunks: 2,
        },
    }
}

fn step_review_and_write(state: &WizardState, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("== Step 3/3: Review & Write ==\n");

    let config = build_config(state);
    let toml_str = toml::to_string_pretty(&config)?;

    println!("--- Generated config ---");
    println!("{toml_str}");
    println!("------------------------\n");

    let default_path = PathBuf::from("config/default.toml");
    let path = output.unwrap_or_else(|| {
        Input::new()
            .with_prompt("Write config to")
            .default(default_path.display().to_string())
            .interact_text()
            .map(PathBuf::from)
            .unwrap_or(default_path)
    });

    if path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &toml_str)?;
    println!("Config written to {}", path.display());

    print_secrets_instructions();
    print_next_steps(&path);

    Ok(())
}

fn print_secrets_instructions() {
    println!("\nAdd the following to your shell profile:");
    println!("  export PRIMER_GEMINI_API_KEY=\"<your-api-key>\"");
}

fn print_next_steps(path: &std::path::Path) {
    println!("\nNext steps:");
    println!("  1. Set PRIMER_GEMINI_API_KEY (see above)");
    println!(
        "  2. Ingest a course: primer --config {} ingest --course-id <id> --dir <materials>",
        path.display()
    );
    println!(
        "  3. Build and tag the plan: primer --config {0} plan --course-id <id>, then primer --config {0} tag --course-id <id>",
        path.display()
    );
    println!(
        "  4. Generate questions: primer --config {} ask --course-id <id> --query \"<topic>\"",
        path.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_config_defaults_when_unset() {
        let state = WizardState {
            embedding_dim: 768,
            ..WizardState::default()
        };
        let config = build_config(&state);
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.generation_model, "gemini-2.0-flash");
        assert_eq!(config.llm.embedding_model, "gemini-embedding-001");
        assert_eq!(config.llm.embedding_dim, 768);
        assert_eq!(config.llm.embedding_batch_size, 64);
        assert_eq!(config.store.sqlite_path, "data/primer.db");
    }

    #[test]
    fn build_config_never_writes_api_key() {
        let state = WizardState {
            embedding_dim: 768,
            ..WizardState::default()
        };
        let config = build_config(&state);
        assert!(config.llm.api_key.is_empty());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("api_key = \"\""));
    }

    #[test]
    fn build_config_uses_wizard_values() {
        let state = WizardState {
            generation_model: Some("gemini-2.5-pro".into()),
            embedding_model: Some("text-embedding-005".into()),
            embedding_dim: 1536,
            sqlite_path: Some("/tmp/course.db".into()),
        };
        let config = build_config(&state);
        assert_eq!(config.llm.generation_model, "gemini-2.5-pro");
        assert_eq!(config.llm.embedding_model, "text-embedding-005");
        assert_eq!(config.llm.embedding_dim, 1536);
        assert_eq!(config.store.sqlite_path, "/tmp/course.db");
    }

    #[test]
    fn generated_config_round_trips_through_toml() {
        let state = WizardState {
            embedding_dim: 768,
            ..WizardState::default()
        };
        let config = build_config(&state);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.generation_model, config.llm.generation_model);
        assert_eq!(parsed.chunking.max_chars, 1200);
        assert_eq!(parsed.retrieval.top_k, 8);
        assert!((parsed.retrieval.score_threshold - 0.25).abs() < f32::EPSILON);
    }
}
