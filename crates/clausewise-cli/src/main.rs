use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use clausewise::jobs::Job;
use clausewise::{
    load_config, validate_upload, Config, ContentType, Document, DocumentId, DocumentStore,
    ExtractorRegistry, JobProgressBroadcaster, JobQueue, JobState, JobTracker, Orchestrator,
    Playbook, SqliteStore, StrategyRegistry,
};

#[derive(Parser)]
#[command(name = "clausewise", version, about = "Legal clause analysis for PDF and Word documents")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "CLAUSEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (defaults to the configured or per-user path)
    #[arg(long, global = true, env = "CLAUSEWISE_DB")]
    db: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and analyze a file without storing anything
    Analyze {
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Admit a file and register it as a pending document
    Ingest {
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Process a pending document, or compare it against a playbook
    Process {
        document_id: String,
        #[arg(long)]
        playbook: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
        /// Seconds to wait for the job before giving up
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// List the stored clauses of a document
    Clauses { document_id: String },
    /// Manage playbooks
    Playbook {
        #[command(subcommand)]
        action: PlaybookAction,
    },
    /// List the registered analysis strategies
    Strategies,
}

#[derive(Subcommand)]
enum PlaybookAction {
    /// Store a playbook from a JSON rules file
    Add { name: String, rules: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(2);
            }
        },
        None => Config::default(),
    };
    if cli.log_json {
        config.logging.json = true;
    }

    if let Err(e) = clausewise::telemetry::init(&config.logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let code = match cli.command {
        Commands::Analyze {
            file,
            content_type,
            strategy,
        } => cmd_analyze(&file, content_type.as_deref(), strategy.as_deref()),
        Commands::Ingest { file, content_type } => {
            cmd_ingest(&config, cli.db.as_deref(), &file, content_type.as_deref())
        }
        Commands::Process {
            document_id,
            playbook,
            strategy,
            timeout,
        } => cmd_process(
            &config,
            cli.db.as_deref(),
            &document_id,
            playbook.as_deref(),
            strategy.as_deref(),
            Duration::from_secs(timeout),
        ),
        Commands::Clauses { document_id } => cmd_clauses(&config, cli.db.as_deref(), &document_id),
        Commands::Playbook {
            action: PlaybookAction::Add { name, rules },
        } => cmd_playbook_add(&config, cli.db.as_deref(), &name, &rules),
        Commands::Strategies => cmd_strategies(),
    };

    std::process::exit(code);
}

fn open_store(config: &Config, db: Option<&Path>) -> Result<SqliteStore, String> {
    let path = db
        .map(Path::to_path_buf)
        .or_else(|| config.resolved_database_path())
        .ok_or_else(|| "no database path configured and no home directory found".to_string())?;
    SqliteStore::open(&path).map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Declared MIME type, or one guessed from the file extension.
fn resolve_content_type(file: &Path, declared: Option<&str>) -> Result<String, String> {
    match declared {
        Some(mime) => Ok(mime.to_string()),
        None => ContentType::guess_from_path(file)
            .map(|ct| ct.mime().to_string())
            .ok_or_else(|| format!("cannot guess content type of {}", file.display())),
    }
}

fn cmd_analyze(file: &Path, content_type: Option<&str>, strategy: Option<&str>) -> i32 {
    let content_type = match resolve_content_type(file, content_type) {
        Ok(ct) => ct,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let text = match ExtractorRegistry::new().extract(file, &content_type) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: {}", clausewise::ClausewiseError::from(e));
            return 1;
        }
    };

    if let Err(e) = StrategyRegistry::validate_text(&text) {
        eprintln!("Error: {}: {}", file.display(), e);
        return 1;
    }

    let registry = match StrategyRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match registry.analyze(&text, &DocumentId::new(), strategy) {
        Ok(result) => print_json(&result),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_ingest(config: &Config, db: Option<&Path>, file: &Path, content_type: Option<&str>) -> i32 {
    let size = match std::fs::metadata(file) {
        Ok(meta) => meta.len(),
        Err(e) => {
            eprintln!("Error: {}: {}", file.display(), e);
            return 1;
        }
    };
    let original_filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let parsed = match validate_upload(&original_filename, content_type, size, &config.upload) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let file_path = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    let mime = content_type.unwrap_or(parsed.mime());
    let document = Document::new(&original_filename, file_path, mime, size);

    let store = match open_store(config, db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match store.insert_document(&document) {
        Ok(()) => {
            log::info!("Registered {} as document {}", original_filename, document.id);
            print_json(&document)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_process(
    config: &Config,
    db: Option<&Path>,
    document_id: &str,
    playbook: Option<&str>,
    strategy: Option<&str>,
    timeout: Duration,
) -> i32 {
    let store = match open_store(config, db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let orchestrator = match Orchestrator::from_config(Arc::new(store), config) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let broadcaster = JobProgressBroadcaster::new(config.progress.channel_capacity);
    let mut events = broadcaster.subscribe();
    let tracker = Arc::new(JobTracker::with_broadcaster(broadcaster));

    let worker_count = config.worker_count.max(1);
    let queue = match JobQueue::new(orchestrator, worker_count, Arc::clone(&tracker)) {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let job = match playbook {
        Some(playbook_id) => Job::playbook(document_id, playbook_id),
        None => Job::process(document_id, strategy),
    };

    let handle = match queue.submit_job(job) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {}", e);
            queue.shutdown();
            queue.wait();
            return 1;
        }
    };

    let snapshot = queue.wait_for(&handle, timeout);
    let timed_out = !snapshot.as_ref().is_some_and(|s| s.state.is_terminal());

    queue.shutdown();
    queue.wait();

    // Joining the workers lets a job that outran the timeout finish, so the
    // snapshot is read again to report its final state.
    let snapshot = if timed_out {
        tracker.get(&handle.job_id)
    } else {
        snapshot
    };

    while let Ok(event) = events.try_recv() {
        tracing::debug!(
            job_id = %event.job_id,
            progress = event.progress,
            "{}",
            event.message
        );
    }

    match snapshot {
        Some(snapshot) => {
            let code = print_json(&snapshot);
            match snapshot.state {
                JobState::Succeeded => code,
                JobState::Failed => 1,
                _ => {
                    eprintln!("Error: job did not finish within {}s", timeout.as_secs());
                    3
                }
            }
        }
        None => {
            eprintln!("Error: job {} is not tracked", handle.job_id);
            1
        }
    }
}

fn cmd_clauses(config: &Config, db: Option<&Path>, document_id: &str) -> i32 {
    let id = match DocumentId::parse(document_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let store = match open_store(config, db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match store.load_document(&id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            eprintln!("Error: {}", clausewise::ClausewiseError::document_not_found(&id));
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    match store.list_clauses(&id) {
        Ok(clauses) => print_json(&clauses),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_playbook_add(config: &Config, db: Option<&Path>, name: &str, rules_path: &Path) -> i32 {
    let rules = match std::fs::read_to_string(rules_path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string()))
    {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Error: {}: {}", rules_path.display(), e);
            return 2;
        }
    };

    let store = match open_store(config, db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let playbook = Playbook::new(name, rules);
    match store.insert_playbook(&playbook) {
        Ok(()) => print_json(&playbook),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_strategies() -> i32 {
    match StrategyRegistry::new() {
        Ok(registry) => {
            for name in registry.available_strategies() {
                println!("{}", name);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
