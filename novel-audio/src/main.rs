//! novel-audio - Translate web novels and turn them into EPUBs and narrated WAVs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use novel_audio::config::NovelConfig;
use novel_audio::epub::BookMetadata;
use novel_audio::glossary::{GlossaryEntry, GlossaryStore, JsonGlossaryStore, TermKind};
use novel_audio::pipeline::{Pipeline, StageEvent};
use novel_audio::project::{Project, TextSource};
use novel_audio::text::{self, ChunkSplitter};
use novel_audio::translate::Translator;
use novel_audio::tts::{AllTalkBackend, TtsBackend};

#[derive(Parser, Debug)]
#[command(name = "novel-audio")]
#[command(about = "Translate novels and turn them into EPUBs and narrated audio", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/novel-audio/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how a text file would be cut into TTS chunks
    Split {
        file: PathBuf,

        /// Override max_chunk_length
        #[arg(long)]
        max: Option<usize>,
    },
    /// Translate raw chapters that have no translation yet
    Translate {
        project: PathBuf,

        /// llm-client preset to use instead of the configured one
        #[arg(long)]
        preset: Option<String>,
    },
    /// Narrate chapters into WAV files
    Synthesize {
        project: PathBuf,

        /// Read raw chapters even when translations exist
        #[arg(long)]
        raw: bool,
    },
    /// Package chapters into an EPUB
    Epub {
        project: PathBuf,

        #[command(flatten)]
        book: BookArgs,

        /// Read raw chapters even when translations exist
        #[arg(long)]
        raw: bool,
    },
    /// Run several stages in order (all of them when none is chosen)
    Run {
        project: PathBuf,

        #[arg(long)]
        translate: bool,

        #[arg(long)]
        epub: bool,

        #[arg(long)]
        synthesize: bool,

        #[arg(long)]
        preset: Option<String>,

        #[command(flatten)]
        book: BookArgs,
    },
    /// Inspect or correct a project's glossary
    Glossary {
        #[command(subcommand)]
        action: GlossaryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct BookArgs {
    /// Book title (default: project directory name)
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    author: Option<String>,

    /// Cover image (JPEG, PNG, GIF or WebP)
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Book language code
    #[arg(long, default_value = "en")]
    language: String,
}

#[derive(Subcommand, Debug)]
enum GlossaryAction {
    /// Print every entry
    Show { project: PathBuf },
    /// Print the rendering of one term
    Get { project: PathBuf, term: String },
    /// Set or replace the rendering of a term
    Set {
        project: PathBuf,
        term: String,
        target: String,

        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        #[arg(long)]
        pronoun: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Character,
    Place,
    Term,
}

impl From<KindArg> for TermKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Character => TermKind::Character,
            KindArg::Place => TermKind::Place,
            KindArg::Term => TermKind::Term,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice reference
    SetVoice {
        /// Path to voice reference audio
        path: PathBuf,
    },
    /// Set the longest chunk sent to the TTS server
    SetMaxChunk {
        /// Characters per chunk
        value: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();

    let config_path = args.config.as_deref();
    let config = NovelConfig::load(config_path).context("Failed to load configuration")?;

    match args.command {
        Commands::Split { file, max } => handle_split(&file, max, &config),
        Commands::Translate { project, preset } => {
            let project = Project::open(project)?;
            let (translator, store) = build_translator(&project, &config, preset.as_deref())?;
            Pipeline::new(project, config)
                .translate(translator, store)
                .run(progress_printer())
                .await?;
            Ok(())
        }
        Commands::Synthesize { project, raw } => {
            let project = Project::open(project)?;
            let backend = build_tts(&config)?;
            with_source(Pipeline::new(project, config), raw)
                .synthesize(backend)
                .run(progress_printer())
                .await?;
            Ok(())
        }
        Commands::Epub { project, book, raw } => {
            let project = Project::open(project)?;
            let meta = book_metadata(&project, &book);
            with_source(Pipeline::new(project, config), raw)
                .epub(meta, book.cover)
                .run(progress_printer())
                .await?;
            Ok(())
        }
        Commands::Run {
            project,
            translate,
            epub,
            synthesize,
            preset,
            book,
        } => {
            let all = !(translate || epub || synthesize);
            let project = Project::open(project)?;
            let mut pipeline = Pipeline::new(project.clone(), config.clone());

            if all || translate {
                let (translator, store) = build_translator(&project, &config, preset.as_deref())?;
                pipeline = pipeline.translate(translator, store);
            }
            if all || epub {
                pipeline = pipeline.epub(book_metadata(&project, &book), book.cover.clone());
            }
            if all || synthesize {
                pipeline = pipeline.synthesize(build_tts(&config)?);
            }

            let results = pipeline.run(progress_printer()).await?;
            for (stage, summary) in results {
                eprintln!(
                    "{}: {} done, {} skipped, {} failed",
                    stage, summary.processed, summary.skipped, summary.failed
                );
            }
            Ok(())
        }
        Commands::Glossary { action } => handle_glossary_command(action, &config),
        Commands::Config { action } => handle_config_command(action, config, config_path),
    }
}

fn with_source(pipeline: Pipeline, raw: bool) -> Pipeline {
    if raw {
        pipeline.with_source(TextSource::Raw)
    } else {
        pipeline
    }
}

fn build_translator(
    project: &Project,
    config: &NovelConfig,
    preset: Option<&str>,
) -> Result<(Arc<Translator>, Arc<dyn GlossaryStore>)> {
    let llm_config = llm_client::Config::load().context("Failed to load LLM configuration")?;
    let preset = llm_config.resolve_preset(preset.or(config.translation.preset.as_deref()))?;
    let provider = llm_client::get_provider(
        preset,
        llm_config.get_provider_config(&preset.provider),
    )?;
    log::info!("Translating with {} ({})", provider.name(), preset.model);

    let store: Arc<dyn GlossaryStore> =
        Arc::new(JsonGlossaryStore::open(project.glossary_path(config))?);
    let translator = Translator::new(provider, config.translation_options());
    Ok((Arc::new(translator), store))
}

fn build_tts(config: &NovelConfig) -> Result<Arc<dyn TtsBackend>> {
    let backend = AllTalkBackend::new(&config.tts.base_url, config.tts_timeout())?;
    Ok(Arc::new(backend))
}

fn book_metadata(project: &Project, book: &BookArgs) -> BookMetadata {
    let meta = BookMetadata::new(book.title.clone().unwrap_or_else(|| project.name()))
        .with_language(book.language.clone());
    match &book.author {
        Some(author) => meta.with_author(author.clone()),
        None => meta,
    }
}

/// Render stage events as one progress bar per stage.
fn progress_printer() -> impl FnMut(&StageEvent) {
    let mut bar: Option<ProgressBar> = None;
    move |event: &StageEvent| match event {
        StageEvent::Started { stage, total } => {
            let pb = ProgressBar::new(*total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_prefix(stage.to_string());
            bar = Some(pb);
        }
        StageEvent::Progress { done, item, .. } => {
            if let Some(pb) = &bar {
                pb.set_position(*done as u64);
                pb.set_message(item.clone());
            }
        }
        StageEvent::Warning { message, .. } => match &bar {
            Some(pb) => pb.println(format!("warning: {}", message)),
            None => eprintln!("warning: {}", message),
        },
        StageEvent::Finished { stage, .. } => {
            if let Some(pb) = bar.take() {
                pb.finish_with_message(format!("{} complete", stage));
            }
        }
        StageEvent::Failed { stage, error } => {
            if let Some(pb) = bar.take() {
                pb.abandon();
            }
            eprintln!("{} failed: {}", stage, error);
        }
    }
}

fn handle_split(file: &Path, max: Option<usize>, config: &NovelConfig) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let splitter = ChunkSplitter::new(max.unwrap_or(config.max_chunk_length))
        .with_line_grouping(config.group_lines);

    let chunks = text::process_chapter(&raw, &splitter);
    for chunk in &chunks {
        println!("--- chunk {} ({} chars) ---", chunk.number, chunk.char_count());
        println!("{}", chunk.text);
    }
    eprintln!("{} chunks, max {} chars", chunks.len(), splitter.max_len());
    Ok(())
}

fn handle_glossary_command(action: GlossaryAction, config: &NovelConfig) -> Result<()> {
    let open = |root: PathBuf| -> Result<JsonGlossaryStore> {
        let project = Project::open(root)?;
        Ok(JsonGlossaryStore::open(project.glossary_path(config))?)
    };

    match action {
        GlossaryAction::Show { project } => {
            let store = open(project)?;
            let glossary = store.snapshot()?;
            println!("Glossary: {} ({} terms)", store.path().display(), glossary.len());
            for (term, entry) in glossary.iter() {
                println!("{} = {}", term, describe(entry));
            }
        }
        GlossaryAction::Get { project, term } => {
            let store = open(project)?;
            match store.get(&term)? {
                Some(entry) => println!("{} = {}", term, describe(&entry)),
                None => anyhow::bail!("{} is not in the glossary", term),
            }
        }
        GlossaryAction::Set {
            project,
            term,
            target,
            kind,
            pronoun,
        } => {
            let store = open(project)?;
            let mut entry = GlossaryEntry::new(target);
            if let Some(kind) = kind {
                entry = entry.with_kind(kind.into());
            }
            if let Some(pronoun) = pronoun {
                entry = entry.with_pronoun(pronoun);
            }
            let summary = describe(&entry);
            match store.correct(&term, entry)? {
                Some(previous) => println!("{}: {} -> {}", term, describe(&previous), summary),
                None => println!("{} = {}", term, summary),
            }
        }
    }
    Ok(())
}

fn describe(entry: &GlossaryEntry) -> String {
    let mut out = entry.target.clone();
    if let Some(kind) = entry.kind {
        out.push_str(&format!(" [{:?}]", kind).to_lowercase());
    }
    if let Some(reading) = &entry.reading {
        out.push_str(&format!(" ({})", reading));
    }
    if let Some(pronoun) = &entry.pronoun {
        out.push_str(&format!(" {}", pronoun));
    }
    out
}

fn handle_config_command(
    action: ConfigAction,
    mut config: NovelConfig,
    path: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let shown = match path {
                Some(p) => p.to_path_buf(),
                None => NovelConfig::config_path()?,
            };
            println!("Configuration file: {}", shown.display());
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
            if config.voice_reference.is_none() {
                println!("# voice_reference = (server default voice)");
            }
        }
        ConfigAction::SetVoice { path: voice } => {
            config.voice_reference = Some(voice.clone());
            config.save(path)?;
            println!("Default voice reference set to: {}", voice.display());
        }
        ConfigAction::SetMaxChunk { value } => {
            config.max_chunk_length = value.max(1);
            config.save(path)?;
            println!("max_chunk_length set to: {}", config.max_chunk_length);
        }
    }
    Ok(())
}
