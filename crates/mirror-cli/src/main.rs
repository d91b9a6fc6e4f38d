use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mirror_contracts::assets::ImageAsset;
use mirror_contracts::events::EventWriter;
use mirror_contracts::history::{HistoryCache, HistoryEntry, JsonFileStore};
use mirror_contracts::models::ModelCatalog;
use mirror_engine::{
    CredentialResolver, DotenvConfig, EngineConfig, EnvConfig, GeminiTransport,
    GenerationRequest, GenerationResult, KeySelector, LayeredConfig, SessionError, TryOnSession,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const STATE_DIR: &str = ".mirror";
const EXIT_REAUTHORIZE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "mirror", version, about = "Virtual try-on from a person photo and a garment photo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dress the person photo in the garment.
    Generate(GenerateArgs),
    /// Inspect or clear past generations.
    History(HistoryArgs),
    /// List the available models.
    Models,
    /// Store an API key in the dotenv file and check that it resolves.
    Authorize(AuthorizeArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Dotenv file consulted for API_KEY before the environment.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
    /// History file; defaults to MIRROR_HISTORY_PATH or .mirror/history.json.
    #[arg(long)]
    history: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    person: PathBuf,
    #[arg(long)]
    garment: PathBuf,
    /// Extra style instruction, e.g. "on a beach at sunset".
    #[arg(long, default_value = "")]
    instruction: String,
    /// Model id; defaults to the recommended model.
    #[arg(long)]
    model: Option<String>,
    /// Where to write the generated image.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Session journal; defaults to .mirror/events.jsonl.
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[command(subcommand)]
    action: HistoryAction,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    List,
    /// Write a past result image back to disk.
    Show {
        id: String,
        /// Defaults to mirror-history-<id>.<ext>.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Clear,
}

#[derive(Debug, Args)]
struct AuthorizeArgs {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mirror error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::History(args) => run_history(args),
        Command::Models => run_models(),
        Command::Authorize(args) => run_authorize(args),
    }
}

fn build_session(common: &CommonArgs, events: Option<&Path>) -> Result<TryOnSession> {
    let config = layered_config(&common.env_file);
    let engine_config = EngineConfig::from_provider(&config);
    let history_path = common
        .history
        .clone()
        .or_else(|| engine_config.history_path.clone())
        .unwrap_or_else(|| Path::new(STATE_DIR).join("history.json"));
    tracing::debug!(history = %history_path.display(), api_base = %engine_config.api_base, "session configured");

    let transport = Arc::new(GeminiTransport::new(&engine_config)?);
    let history = HistoryCache::new(Box::new(JsonFileStore::new(history_path)));
    let mut session = TryOnSession::new(CredentialResolver::new(Box::new(config)), transport, history)
        .with_catalog(ModelCatalog::default());
    if let Some(events) = events {
        session = session.with_events(EventWriter::new(events, uuid::Uuid::new_v4().to_string()));
    }
    Ok(session)
}

fn layered_config(env_file: &Path) -> LayeredConfig {
    LayeredConfig::new()
        .push(DotenvConfig::new(env_file))
        .push(EnvConfig)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let person = ImageAsset::from_path(&args.person)?;
    let garment = ImageAsset::from_path(&args.garment)?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| Path::new(STATE_DIR).join("events.jsonl"));
    let session = build_session(&args.common, Some(&events_path))?;

    let mut request =
        GenerationRequest::new(Some(person), Some(garment)).with_instruction(args.instruction.clone());
    if let Some(model) = &args.model {
        request = request.with_model(model.clone());
    }
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| session.catalog().default_id().to_string());

    match session.generate(&request) {
        Ok(result) => {
            let out = args
                .out
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("mirror-result.{}", extension_for_mime(&result.mime_type))));
            write_result(&result, &out)?;
            print_json(&json!({
                "status": "success",
                "output": out.to_string_lossy(),
                "model": model,
                "model_name": session.catalog().display_name(&model),
                "description": result.description,
            }))?;
            Ok(0)
        }
        Err(err) => {
            let reauthorize = matches!(err, SessionError::NeedsAuthorization)
                || err.kind().map(|kind| kind.forces_reauthorization()).unwrap_or(false);
            print_json(&json!({
                "status": "error",
                "error": err.kind().map(|kind| kind.code()).unwrap_or("SESSION"),
                "message": err.to_string(),
                "reauthorize": reauthorize,
            }))?;
            if reauthorize {
                eprintln!("Run `mirror authorize` or set API_KEY to connect a valid key.");
                return Ok(EXIT_REAUTHORIZE);
            }
            Ok(1)
        }
    }
}

fn write_result(result: &GenerationResult, out: &Path) -> Result<()> {
    write_image(&result.image_bytes()?, out)
}

fn write_image(bytes: &[u8], out: &Path) -> Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "image/heif" => "heif",
        _ => "png",
    }
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let session = build_session(&args.common, None)?;
    match args.action {
        HistoryAction::List => {
            let rows: Vec<Value> = session.list_history().iter().map(history_row).collect();
            print_json(&Value::Array(rows))?;
        }
        HistoryAction::Show { id, out } => {
            let Some(entry) = session.history_entry(&id) else {
                bail!("no history entry with id {id}");
            };
            let written = restore_history_image(&entry, out.as_deref())?;
            let mut row = history_row(&entry);
            row["output"] = json!(written.to_string_lossy());
            print_json(&row)?;
        }
        HistoryAction::Clear => {
            session.clear_history();
            println!("History cleared.");
        }
    }
    Ok(0)
}

fn history_row(entry: &HistoryEntry) -> Value {
    json!({
        "id": entry.id,
        "timestamp": entry.timestamp,
        "model": entry.model_name,
        "prompt": entry.prompt,
        "person": entry.person_preview,
        "garment": entry.garment_preview,
        "result_chars": entry.result_image.len(),
    })
}

fn restore_history_image(entry: &HistoryEntry, out: Option<&Path>) -> Result<PathBuf> {
    let (mime_type, bytes) = entry
        .decode_result()
        .with_context(|| format!("history entry {} has no readable image", entry.id))?;
    let out = out.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(format!("mirror-history-{}.{}", entry.id, extension_for_mime(&mime_type)))
    });
    write_image(&bytes, &out)?;
    Ok(out)
}

fn run_models() -> Result<i32> {
    let catalog = ModelCatalog::default();
    for model in catalog.list() {
        let marker = if model.id == catalog.default_id() { "*" } else { " " };
        println!("{marker} {:<28} {}", model.id, model.display_name);
        println!("  {:<28} {}", "", model.description);
    }
    Ok(0)
}

/// Prompts on stdin and stores the answer as `API_KEY` in a dotenv file.
struct DotenvKeySelector {
    path: PathBuf,
}

impl KeySelector for DotenvKeySelector {
    fn select_key(&self) -> Result<()> {
        eprint!("Paste API key: ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let key = line.trim();
        if key.is_empty() {
            bail!("no key entered");
        }
        store_dotenv_key(&self.path, "API_KEY", key)
    }
}

fn store_dotenv_key(path: &Path, name: &str, value: &str) -> Result<()> {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let body = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let is_target = body
                .split_once('=')
                .map(|(key, _)| key.trim() == name)
                .unwrap_or(false);
            if is_target && !replaced {
                replaced = true;
                format!("{name}={value}")
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(format!("{name}={value}"));
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn run_authorize(args: AuthorizeArgs) -> Result<i32> {
    let session = build_session(&args.common, None)?.with_key_selector(Box::new(DotenvKeySelector {
        path: args.common.env_file.clone(),
    }));
    match session.resolve_and_authorize() {
        Ok(()) => {
            let masked = CredentialResolver::new(Box::new(layered_config(&args.common.env_file)))
                .resolve()
                .map(|credential| credential.masked())
                .unwrap_or_default();
            println!("API key {masked} is configured.");
            Ok(0)
        }
        Err(kind) => {
            eprintln!("Authorization failed: {kind}");
            Ok(EXIT_REAUTHORIZE)
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
