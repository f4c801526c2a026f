//! Duet - design/implementation agent orchestration CLI
//!
//! The `duet` command runs a session offline against the in-memory
//! collaborators, or against an OpenAI-compatible endpoint with `--llm`.
//!
//! ## Commands
//!
//! - `run`: run a full session and write the artifacts
//! - `check`: run conflict detection over existing artifacts
//! - `config`: print the effective configuration

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use duet_core::fakes::{InMemoryKnowledgeBase, StaticDiscovery, TemplateGenerator};
use duet_core::parser::require_design;
use duet_core::{
    ArtifactGenerator, ChatCompletionsGenerator, Collaborators, ConflictDetector, DuetConfig,
    EventSink, OutputFormat, RequestContext, Requirements, SchemaCatalog, SessionReport,
    SessionRequest, SharedSessionMemory, TaskType,
};

#[derive(Parser)]
#[command(name = "duet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Design and implementation agents negotiating one artifact", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full session for one request
    Run {
        /// Free-text request
        #[arg(short, long)]
        request: String,

        /// Data source and record count, e.g. `fracfocus=1200` (repeatable)
        #[arg(long = "source", value_parser = parse_source)]
        sources: Vec<(String, u64)>,

        /// Schema fields of a source, e.g. `fracfocus=state,volume` (repeatable)
        #[arg(long = "schema", value_parser = parse_schema)]
        schemas: Vec<(String, Vec<String>)>,

        /// Restrict the session to these sources (repeatable)
        #[arg(long)]
        scope: Vec<String>,

        /// Override the task type read from the request
        #[arg(long)]
        task: Option<TaskType>,

        /// Override the output format read from the request
        #[arg(long)]
        format: Option<OutputFormat>,

        /// JSON array of knowledge patterns
        #[arg(long)]
        knowledge: Option<PathBuf>,

        /// Directory for the design, implementation files and report.json
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Generate with the chat-completions endpoint from DUET_LLM_* variables
        #[arg(long)]
        llm: bool,

        /// Print planning and state events as they happen
        #[arg(long)]
        watch: bool,

        /// Planning iterations per role per negotiation cycle
        #[arg(long, env = "DUET_MAX_STEPS")]
        max_steps: Option<u32>,

        /// Upper bound on negotiation cycles
        #[arg(long, env = "DUET_MAX_NEGOTIATION_CYCLES")]
        max_cycles: Option<u32>,
    },

    /// Detect conflicts between an existing design and implementation
    Check {
        /// Design text file
        #[arg(long)]
        design: PathBuf,

        /// Directory holding the implementation files
        #[arg(long)]
        implementation_dir: PathBuf,

        /// Schema fields of a source, e.g. `fracfocus=state,volume` (repeatable)
        #[arg(long = "schema", value_parser = parse_schema)]
        schemas: Vec<(String, Vec<String>)>,

        /// JSON array of knowledge patterns
        #[arg(long)]
        knowledge: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn parse_source(raw: &str) -> std::result::Result<(String, u64), String> {
    let (name, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=count, got {raw:?}"))?;
    let count = count
        .trim()
        .parse()
        .map_err(|_| format!("record count must be a number, got {count:?}"))?;
    Ok((name.trim().to_string(), count))
}

fn parse_schema(raw: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (name, fields) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=field,field, got {raw:?}"))?;
    let fields = fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.trim().to_string(), fields))
}

fn schema_catalog(schemas: &[(String, Vec<String>)]) -> SchemaCatalog {
    schemas
        .iter()
        .fold(SchemaCatalog::default(), |catalog, (name, fields)| {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            catalog.with_source(name, &fields)
        })
}

fn load_knowledge(path: Option<&Path>) -> Result<InMemoryKnowledgeBase> {
    let Some(path) = path else {
        return Ok(InMemoryKnowledgeBase::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read knowledge file {}", path.display()))?;
    InMemoryKnowledgeBase::from_json(&json)
        .with_context(|| format!("Invalid knowledge file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    duet_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            request,
            sources,
            schemas,
            scope,
            task,
            format,
            knowledge,
            out,
            llm,
            watch,
            max_steps,
            max_cycles,
        } => {
            let mut session = SessionRequest::new(request);
            for (name, count) in &sources {
                session = session.with_source(name, *count);
            }
            for name in &scope {
                session = session.with_scope(name);
            }
            if let Some(task) = task {
                session = session.with_task_type(task);
            }
            if let Some(format) = format {
                session = session.with_output_format(format);
            }
            let options = RunOptions {
                schemas,
                knowledge,
                out,
                llm,
                watch,
                max_steps,
                max_cycles,
            };
            cmd_run(&session, &options).await
        }
        Commands::Check {
            design,
            implementation_dir,
            schemas,
            knowledge,
        } => cmd_check(&design, &implementation_dir, &schemas, knowledge.as_deref()).await,
        Commands::Config => cmd_config(),
    }
}

struct RunOptions {
    schemas: Vec<(String, Vec<String>)>,
    knowledge: Option<PathBuf>,
    out: Option<PathBuf>,
    llm: bool,
    watch: bool,
    max_steps: Option<u32>,
    max_cycles: Option<u32>,
}

async fn cmd_run(request: &SessionRequest, options: &RunOptions) -> Result<()> {
    let mut config = DuetConfig::from_env().context("Invalid DUET_* configuration")?;
    if let Some(steps) = options.max_steps {
        config.max_planning_steps = steps;
    }
    if let Some(cycles) = options.max_cycles {
        config.max_negotiation_cycles = cycles;
    }

    let mut discovery = StaticDiscovery::new();
    let catalog = schema_catalog(&options.schemas);
    for (name, count) in &request.hints.sources {
        let fields: Vec<&str> = catalog
            .fields(name)
            .map(|f| f.iter().map(String::as_str).collect())
            .unwrap_or_default();
        discovery = discovery.with_source(name, *count, &fields);
    }

    let generator: Arc<dyn ArtifactGenerator> = if options.llm {
        Arc::new(
            ChatCompletionsGenerator::from_env()
                .context("Failed to build chat-completions client")?,
        )
    } else {
        Arc::new(TemplateGenerator::new())
    };
    let collaborators = Collaborators::new(
        Arc::new(discovery),
        Arc::new(load_knowledge(options.knowledge.as_deref())?),
        generator,
    );

    let mut orchestrator = duet_core::Orchestrator::new(collaborators, config);
    let watcher = if options.watch {
        let (sink, mut rx) = EventSink::channel();
        orchestrator = orchestrator.with_events(sink);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        }))
    } else {
        None
    };

    let report = orchestrator.run(request).await;
    drop(orchestrator);
    if let Some(watcher) = watcher {
        watcher.await.ok();
    }
    let report = report.context("Session aborted")?;

    if let Some(out) = &options.out {
        write_report(out, &report)?;
        info!(dir = %out.display(), "artifacts written");
    }
    print_summary(&report);
    Ok(())
}

fn write_report(out: &Path, report: &SessionReport) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    if let Some(design) = &report.design {
        std::fs::write(out.join("design.md"), &design.raw)?;
    }
    for (name, content) in &report.implementation.files {
        let path = contained_path(out, name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(out.join("report.json"), json)?;
    Ok(())
}

/// Join a generated file name onto `out`, refusing names that would land
/// outside it.
fn contained_path(out: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let plain = relative
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)));
    if !plain || !duet_core::parser::is_relative_file_name(name) {
        bail!("Refusing to write {name:?} outside {}", out.display());
    }
    Ok(out.join(relative))
}

fn print_summary(report: &SessionReport) {
    println!("Session {}", report.session_id);
    println!("  Outcome:      {}", report.outcome.as_str());
    println!("  Intent:       {}", report.intent_tag);
    println!("  Scope:        {}", report.scope.join(", "));
    println!(
        "  Versions:     design v{}, implementation v{}",
        report.design_version, report.implementation_version
    );
    println!("  Files:        {}", report.implementation.files.len());
    println!("  Negotiation:  {} cycle(s)", report.negotiation_cycles);
    for state in &report.fallbacks {
        println!("  Fallback:     {state}");
    }
    for warning in &report.warnings {
        println!("  Warning:      {warning}");
    }
    for conflict in &report.conflicts {
        println!("  {}", conflict.summary());
    }
}

/// Implementation files under `dir`, keyed by `/`-separated relative path.
fn read_tree(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("Failed to read {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(dir)
                .with_context(|| format!("{} escapes {}", path.display(), dir.display()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, std::fs::read_to_string(&path)?);
        }
    }
    Ok(files)
}

async fn cmd_check(
    design_path: &Path,
    implementation_dir: &Path,
    schemas: &[(String, Vec<String>)],
    knowledge: Option<&Path>,
) -> Result<()> {
    let text = std::fs::read_to_string(design_path)
        .with_context(|| format!("Failed to read design {}", design_path.display()))?;
    let design = require_design(&text)?;
    let files = read_tree(implementation_dir)?;

    let schema = schema_catalog(schemas);
    let mut sources: BTreeSet<String> = schema.sources.keys().cloned().collect();
    sources.extend(design.components.iter().filter_map(|c| c.source.clone()));
    if sources.is_empty() {
        bail!("design names no data source and no --schema was given");
    }
    let counts: Vec<(String, u64)> = sources.iter().map(|s| (s.clone(), 0)).collect();
    let context = RequestContext::build(
        &Requirements::new(sources.iter().cloned()),
        sources.iter().cloned(),
        counts,
        &design.title,
        TaskType::Dashboard,
        OutputFormat::Markdown,
    )?;

    let patterns = {
        use duet_core::KnowledgeRetrieval;
        let store = load_knowledge(knowledge)?;
        let top_k = store.len();
        store.query(&design.title, None, top_k).await?
    };

    let mut memory = SharedSessionMemory::new(Arc::new(context))
        .with_schema(schema)
        .with_knowledge(patterns);
    memory.update_design(design, "loaded");
    memory.update_implementation(files, "loaded");

    let conflicts = ConflictDetector::standard().run(&mut memory);
    for conflict in &conflicts {
        println!("{}", conflict.summary());
    }
    let high = memory.high_severity_count();
    println!("{} conflict(s), {} high severity", conflicts.len(), high);
    if high > 0 {
        bail!("{high} high-severity conflict(s) open");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = DuetConfig::from_env().context("Invalid DUET_* configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
