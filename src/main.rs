use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use primer_core::Config;
use primer_llm::GeminiProvider;
use primer_rag::chunker::ChunkerConfig;
use primer_rag::embedder::EmbeddingBatcher;
use primer_rag::ingest::CourseIngestor;
use primer_rag::outline::concept_outline;
use primer_rag::planner::{LessonPlanner, NO_PLAN_MESSAGE, PlanSource};
use primer_rag::questions::{
    DEFAULT_NUM_QUESTIONS, INSUFFICIENT_MATERIAL_MESSAGE, QuestionGenerator, QuestionOutcome,
};
use primer_rag::retriever::{RetrievalConfig, Scope};
use primer_rag::source::load_course_dir;
use primer_rag::tagger::{ConceptTagger, DEFAULT_BATCH_SIZE};
use primer_store::CourseStore;

mod init;

#[derive(Parser)]
#[command(
    name = "primer",
    version,
    about = "Ingest course material, derive a lesson plan, and generate grounded practice questions"
)]
struct Cli {
    /// Config file (falls back to PRIMER_CONFIG, then config/default.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive configuration wizard
    Init {
        /// Write the generated config here instead of prompting for a path
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Chunk, embed, and store a directory of course material
    Ingest {
        #[arg(long)]
        course_id: String,
        /// Course root; subdirectories become modules, a root-level
        /// syllabus file becomes the syllabus document
        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
        /// Display name stored with the course
        #[arg(long, default_value = "")]
        course_name: String,
    },
    /// Build the unit/topic/subtopic lesson plan for a course
    Plan {
        #[arg(long)]
        course_id: String,
        /// Course name passed to the model for context
        #[arg(long, default_value = "")]
        course_name: String,
        /// Print the stored plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assign stored chunks to lesson-plan nodes
    Tag {
        #[arg(long)]
        course_id: String,
        /// Chunks per LLM call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Print the tagging report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show ingested modules, or the conceptual outline with chunk counts
    Status {
        #[arg(long)]
        course_id: String,
        /// Show lesson-plan units/topics/subtopics instead of modules
        #[arg(long)]
        conceptual: bool,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate practice questions grounded in retrieved course material
    Ask {
        #[arg(long)]
        course_id: String,
        /// Topic or query to retrieve against
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_NUM_QUESTIONS)]
        num_questions: usize,
        /// Limit retrieval to this lesson-plan unit
        #[arg(long, default_value = "")]
        unit_id: String,
        /// Limit retrieval to this topic
        #[arg(long, default_value = "")]
        topic_id: String,
        /// Limit retrieval to this subtopic
        #[arg(long, default_value = "")]
        subtopic_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Init { output } => init::run(output.or(config)),
        Commands::Ingest {
            course_id,
            dir,
            course_name,
        } => {
            let pipeline = Pipeline::connect(&resolve_config_path(config)).await?;
            pipeline.ingest(&course_id, &dir, &course_name).await
        }
        Commands::Plan {
            course_id,
            course_name,
            json,
        } => {
            let pipeline = Pipeline::connect(&resolve_config_path(config)).await?;
            pipeline.plan(&course_id, &course_name, json).await
        }
        Commands::Tag {
            course_id,
            batch_size,
            json,
        } => {
            let pipeline = Pipeline::connect(&resolve_config_path(config)).await?;
            pipeline.tag(&course_id, batch_size, json).await
        }
        Commands::Status {
            course_id,
            conceptual,
            json,
        } => {
            let pipeline = Pipeline::connect(&resolve_config_path(config)).await?;
            pipeline.status(&course_id, conceptual, json).await
        }
        Commands::Ask {
            course_id,
            query,
            num_questions,
            unit_id,
            topic_id,
            subtopic_id,
        } => {
            let pipeline = Pipeline::connect(&resolve_config_path(config)).await?;
            let scope = Scope {
                unit_id,
                topic_id,
                subtopic_id,
            };
            pipeline.ask(&course_id, &query, num_questions, &scope).await
        }
    }
}

/// Shared setup for every subcommand that touches the store or the model.
struct Pipeline {
    config: Config,
    store: CourseStore,
    provider: Arc<GeminiProvider>,
}

impl Pipeline {
    async fn connect(config_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(config_path)?;
        config.validate()?;

        let provider = Arc::new(
            GeminiProvider::new(
                config.llm.api_key.clone(),
                config.llm.generation_model.clone(),
                config.llm.embedding_model.clone(),
                config.llm.embedding_dim,
            )
            .with_base_url(config.llm.base_url.clone()),
        );

        if let Some(parent) = Path::new(&config.store.sqlite_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let store = CourseStore::new(&config.store.sqlite_path).await?;

        Ok(Self {
            config,
            store,
            provider,
        })
    }

    async fn ingest(&self, course_id: &str, dir: &Path, course_name: &str) -> anyhow::Result<()> {
        let input = load_course_dir(dir, course_id, course_name)?;
        let embedder = EmbeddingBatcher::new(
            Arc::clone(&self.provider),
            self.config.llm.embedding_dim,
            self.config.llm.embedding_batch_size,
        );
        let ingestor =
            CourseIngestor::new(self.store.clone(), embedder, chunker_config(&self.config));
        let report = ingestor.ingest(&input).await?;

        println!(
            "Ingested {}/{} documents ({} chunks created, {} removed) in {} ms.",
            report.documents_ingested,
            report.documents_seen,
            report.chunks_created,
            report.chunks_removed,
            report.duration_ms
        );
        if !report.errors.is_empty() {
            eprintln!("{} document(s) failed:", report.errors.len());
            for error in &report.errors {
                eprintln!("  {error}");
            }
        }
        Ok(())
    }

    async fn plan(&self, course_id: &str, course_name: &str, json: bool) -> anyhow::Result<()> {
        let planner = LessonPlanner::new(self.store.clone(), Arc::clone(&self.provider));
        let outcome = planner.build(course_id, course_name).await?;

        if json {
            let mut value = serde_json::json!({
                "units": outcome.plan.units,
                "source": outcome.source.to_string(),
            });
            if matches!(outcome.source, PlanSource::None) {
                value["message"] = serde_json::Value::String(NO_PLAN_MESSAGE.to_owned());
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if matches!(outcome.source, PlanSource::None) {
            println!("{NO_PLAN_MESSAGE}");
            return Ok(());
        }
        println!(
            "Lesson plan ({}): {} unit(s)\n",
            outcome.source,
            outcome.plan.units.len()
        );
        for unit in &outcome.plan.units {
            println!("  {} ({})", unit.unit_name, unit.unit_id);
            for topic in &unit.topics {
                println!("    - {} ({})", topic.topic_name, topic.topic_id);
                for subtopic in &topic.subtopics {
                    println!("      - {}", subtopic.subtopic_name);
                }
            }
        }
        Ok(())
    }

    async fn tag(&self, course_id: &str, batch_size: usize, json: bool) -> anyhow::Result<()> {
        let tagger = ConceptTagger::new(self.store.clone(), Arc::clone(&self.provider));
        let report = tagger.tag_course(course_id, batch_size).await?;

        if json {
            let mut value = serde_json::json!({
                "tagged": report.tagged,
                "batches": report.batches,
                "chunks_total": report.chunks_total,
            });
            if let Some(ref error) = report.error {
                value["error"] = serde_json::Value::String(error.clone());
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if let Some(error) = report.error {
            eprintln!("{error}");
            std::process::exit(1);
        }
        println!(
            "Tagged {} assignments in {} batches ({} chunks).",
            report.tagged, report.batches, report.chunks_total
        );
        Ok(())
    }

    async fn status(&self, course_id: &str, conceptual: bool, json: bool) -> anyhow::Result<()> {
        if conceptual {
            let units = concept_outline(&self.store, course_id).await?;
            let course_name = self.store.course_name(course_id).await?;

            if json {
                let value = serde_json::json!({
                    "courseId": course_id,
                    "courseName": course_name,
                    "units": units,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            if units.is_empty() {
                println!("No conceptual units. Run `primer plan` and `primer tag` first.");
                return Ok(());
            }

            let display_name = if course_name.is_empty() {
                course_id
            } else {
                &course_name
            };
            println!(
                "Course {display_name} - {} conceptual unit(s)\n",
                units.len()
            );
            for unit in &units {
                println!(
                    "  {}: {} (chunks: {})",
                    unit.unit_id, unit.unit_name, unit.chunk_count
                );
                for topic in &unit.topics {
                    println!(
                        "    Topic {}: {} (chunks: {})",
                        topic.topic_id, topic.topic_name, topic.chunk_count
                    );
                    for subtopic in &topic.subtopics {
                        println!(
                            "      Subtopic {}: {} (chunks: {})",
                            subtopic.subtopic_id, subtopic.subtopic_name, subtopic.chunk_count
                        );
                    }
                }
            }
            return Ok(());
        }

        let modules = self.store.module_overview(course_id).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&modules)?);
            return Ok(());
        }
        if modules.is_empty() {
            println!("No units found for this course. Run `primer ingest` first.");
            return Ok(());
        }

        println!("Course {course_id} - {} module(s)\n", modules.len());
        for module in &modules {
            let name = if module.module_name.trim().is_empty() {
                module.module_id.as_str()
            } else {
                module.module_name.trim()
            };
            println!("  {}: {name}", module.module_id);
            println!(
                "    documents: {}, chunks: {}",
                module.document_count, module.chunk_count
            );
        }
        Ok(())
    }

    async fn ask(
        &self,
        course_id: &str,
        query: &str,
        num_questions: usize,
        scope: &Scope,
    ) -> anyhow::Result<()> {
        let generator = QuestionGenerator::new(
            self.store.clone(),
            Arc::clone(&self.provider),
            retrieval_config(&self.config),
        );

        match generator
            .generate(course_id, query, num_questions, scope)
            .await?
        {
            QuestionOutcome::InsufficientMaterial { retrieved } => {
                tracing::info!(retrieved, "too few passages cleared the score threshold");
                eprintln!("{INSUFFICIENT_MATERIAL_MESSAGE}");
                std::process::exit(1);
            }
            QuestionOutcome::Generated {
                questions,
                retrieved,
            } => {
                let value = serde_json::json!({
                    "questions": questions,
                    "retrieved_chunk_count": retrieved,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Ok(())
    }
}

fn chunker_config(config: &Config) -> ChunkerConfig {
    ChunkerConfig {
        min_chars: config.chunking.min_chars,
        max_chars: config.chunking.max_chars,
        overlap_chars: config.chunking.overlap_chars,
    }
}

fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        top_k: config.retrieval.top_k,
        score_threshold: config.retrieval.score_threshold,
        min_chunks: config.retrieval.min_chunks,
        embedding_dim: config.llm.embedding_dim,
    }
}

/// Priority: `--config` flag > `PRIMER_CONFIG` env > "config/default.toml"
fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var("PRIMER_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
