//! `vaultctl` — a minimal smoke-test CLI over `notecore`. Not a production
//! front-end: a thin driver for exercising vault init, note CRUD, and search
//! from a shell.

use clap::{Parser, Subcommand};
use notecore::schema::{MetadataSchema, Value};
use notecore::workspace::Workspace;
use notecore::{CoreError, GlobalRegistry, VaultContext};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "vaultctl", about = "Local markdown note store")]
struct Cli {
    /// Vault id to operate on; defaults to the registry's current vault.
    #[arg(long, global = true)]
    vault: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and initialize a new vault at `path`.
    Init { path: PathBuf, #[arg(long)] name: Option<String> },
    /// List registered vaults.
    Vaults,
    /// Create a note type.
    TypeCreate { name: String, description: String },
    /// List note types.
    TypeList,
    /// Create a note.
    Create { #[arg(long = "type")] note_type: String, title: String, #[arg(long, default_value = "")] body: String },
    /// Fetch a note by id, filename, or title.
    Get { identifier: String },
    /// Replace a note's body (requires its current content_hash).
    Update { identifier: String, hash: String, body: String },
    /// Rename a note's title in place.
    Rename { identifier: String, hash: String, title: String },
    /// Move a note to a different note type.
    Move { identifier: String, hash: String, #[arg(long = "to")] note_type: String },
    /// Delete a note.
    Delete { identifier: String, hash: String, #[arg(long)] confirm: bool },
    /// Search notes.
    Search { query: String, #[arg(long)] regex: bool, #[arg(long)] limit: Option<usize> },
    /// Rebuild the index from the filesystem.
    Reindex,
}

fn open_vault(cli: &Cli, registry: &GlobalRegistry) -> Result<VaultContext, CoreError> {
    let id = cli
        .vault
        .clone()
        .or_else(|| registry.current_vault_id().map(String::from))
        .ok_or_else(|| CoreError::not_found("no vault specified and no current vault set"))?;
    let entry = registry.get(&id).ok_or_else(|| CoreError::not_found(format!("vault '{}'", id)))?;
    VaultContext::open(id, entry.path.clone())
}

fn run() -> Result<(), CoreError> {
    env_logger::init();
    let cli = Cli::parse();
    let mut registry = GlobalRegistry::load()?;

    match &cli.command {
        Commands::Init { path, name } => {
            Workspace::initialize_vault(path)?;
            let id = path.file_name().and_then(|n| n.to_str()).unwrap_or("vault").to_string();
            let now = chrono::Utc::now().to_rfc3339();
            registry.register(&id, name.as_deref().unwrap_or(&id), path, None, &now)?;
            println!("initialized vault '{}' at {}", id, path.display());
        }
        Commands::Vaults => {
            for v in registry.vaults() {
                println!("{}\t{}\t{}", v.id, v.name, v.path.display());
            }
        }
        Commands::TypeCreate { name, description } => {
            let ctx = open_vault(&cli, &registry)?;
            ctx.note_types().create(name, description, None, MetadataSchema::default())?;
            println!("created note type '{}'", name);
        }
        Commands::TypeList => {
            let ctx = open_vault(&cli, &registry)?;
            for nt in ctx.note_types().list()? {
                println!("{}\t{}", nt.name, nt.content_hash);
            }
        }
        Commands::Create { note_type, title, body } => {
            let ctx = open_vault(&cli, &registry)?;
            let note = ctx.notes().create_note(note_type, title, BTreeMap::<String, Value>::new(), body)?;
            println!("{}\t{}", note.id, note.content_hash);
        }
        Commands::Get { identifier } => {
            let ctx = open_vault(&cli, &registry)?;
            let note = ctx.notes().get_note(identifier)?;
            println!("{}\t{}\n{}", note.id, note.content_hash, note.body);
        }
        Commands::Update { identifier, hash, body } => {
            let ctx = open_vault(&cli, &registry)?;
            let note = ctx.notes().update_note(identifier, hash, body)?;
            println!("{}\t{}", note.id, note.content_hash);
        }
        Commands::Rename { identifier, hash, title } => {
            let ctx = open_vault(&cli, &registry)?;
            let report = ctx.notes().rename_note(identifier, title, hash)?;
            println!("{}\tnotes_updated={}\tlinks_updated={}", report.note.id, report.notes_updated, report.links_updated);
        }
        Commands::Move { identifier, hash, note_type } => {
            let ctx = open_vault(&cli, &registry)?;
            let report = ctx.notes().move_note(identifier, note_type, hash)?;
            println!("{} -> {}", report.old_id, report.note.id);
        }
        Commands::Delete { identifier, hash, confirm } => {
            let ctx = open_vault(&cli, &registry)?;
            ctx.notes().delete_note(identifier, hash, *confirm)?;
            println!("deleted {}", identifier);
        }
        Commands::Search { query, regex, limit } => {
            let ctx = open_vault(&cli, &registry)?;
            let results = ctx.search().search_notes(query, None, *limit, *regex)?;
            for r in results {
                println!("{:.2}\t{}\t{}", r.score, r.note_id, r.snippet);
            }
        }
        Commands::Reindex => {
            let ctx = open_vault(&cli, &registry)?;
            let count = ctx.search().rebuild_index(Some(&|done, total| eprint!("\rindexing {done}/{total}")))?;
            println!("\nreindexed {} notes", count);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
