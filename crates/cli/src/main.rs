use clap::{Parser, Subcommand};
use depot_core::{
    ConfigFile, CoreConfig, DefaultPaths, MetadataEngine, RelativePath, StorageBackend,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "depot-admin")]
#[command(about = "Offline maintenance for a Depot file store (stop the server first)")]
struct Cli {
    /// Store root (default: base_dir from the config file, then ~/.depot)
    #[arg(short = 'd', long, global = true)]
    base_dir: Option<PathBuf>,
    /// Index directory (default: cache_dir from the config file, then ~/.cache/depot)
    #[arg(short = 'c', long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Index backend: sled or memory
    #[arg(long, global = true)]
    backend: Option<StorageBackend>,
    /// Configuration file (default: ~/.config/depot.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file at PATH
    Store {
        /// Destination path inside the store
        path: String,
        /// Local file to read
        source: PathBuf,
    },
    /// Move a file or directory
    Move { old: String, new: String },
    /// Delete a file or directory
    Delete { path: String },
    /// Print the stored checksum of PATH
    Checksum { path: String },
    /// Print the identifier of PATH
    Find { path: String },
    /// Export both indices as a JSON snapshot
    Dump {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON snapshot into both indices
    Restore { file: PathBuf },
    /// Compare the store with its indices
    Reconcile {
        /// Fix what was found, using the disk as the source of truth
        #[arg(long)]
        repair: bool,
    },
}

impl Cli {
    /// Flags win over the config file, which wins over the built-in defaults.
    fn core_config(&self) -> Result<CoreConfig, Box<dyn std::error::Error>> {
        let defaults = DefaultPaths::for_current_user()?;
        let config_path = self.config.clone().unwrap_or(defaults.config_file);
        let file = ConfigFile::load(&config_path)?.unwrap_or_default();

        let base_dir = self
            .base_dir
            .clone()
            .or(file.base_dir)
            .unwrap_or(defaults.base_dir);
        let cache_dir = self
            .cache_dir
            .clone()
            .or(file.cache_dir)
            .unwrap_or(defaults.cache_dir);
        let backend = self.backend.or(file.backend).unwrap_or_default();

        Ok(CoreConfig::new(base_dir, cache_dir, backend)?)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command.as_ref() else {
        println!("Nothing to do, see --help");
        return Ok(());
    };

    let engine = MetadataEngine::open(&cli.core_config()?)?;

    match command {
        Commands::Store { path, source } => {
            let path = RelativePath::new(path)?;
            let content = std::fs::read(source)?;
            match engine.store(&path, &content) {
                Ok(record) => println!(
                    "Stored {} as {} ({})",
                    record.path,
                    record.identifier,
                    record.checksum.map(|c| c.to_string()).unwrap_or_default()
                ),
                Err(e) => eprintln!("Error storing {}: {}", path, e),
            }
        }
        Commands::Move { old, new } => {
            let (old, new) = (RelativePath::new(old)?, RelativePath::new(new)?);
            match engine.move_path(&old, &new) {
                Ok(report) => {
                    println!("Moved {} to {} ({} file(s))", old, new, report.identities);
                    for failure in report.failures {
                        eprintln!("  index not updated: {}", failure);
                    }
                }
                Err(e) => eprintln!("Error moving {}: {}", old, e),
            }
        }
        Commands::Delete { path } => {
            let path = RelativePath::new(path)?;
            match engine.delete(&path) {
                Ok(report) => {
                    println!("Deleted {} ({} file(s))", path, report.identities);
                    for failure in report.failures {
                        eprintln!("  index not updated: {}", failure);
                    }
                }
                Err(e) => eprintln!("Error deleting {}: {}", path, e),
            }
        }
        Commands::Checksum { path } => {
            let path = RelativePath::new(path)?;
            match engine.checksum_of(&path) {
                Ok(Some(checksum)) => println!("{}  {}", checksum, path),
                Ok(None) => println!("No checksum stored for {}", path),
                Err(e) => eprintln!("Error reading checksum: {}", e),
            }
        }
        Commands::Find { path } => {
            let path = RelativePath::new(path)?;
            match engine.find_identity_by_path(&path) {
                Ok(Some(id)) => println!("{}", id),
                Ok(None) => println!("No identifier for {}", path),
                Err(e) => eprintln!("Error searching identifiers: {}", e),
            }
        }
        Commands::Dump { output } => {
            let outcome = match output {
                Some(output) => {
                    let outcome = engine.dump_to_file(output)?;
                    println!("Wrote {} record(s) to {}", outcome.records.len(), output.display());
                    outcome
                }
                None => {
                    let outcome = engine.dump()?;
                    println!("{}", serde_json::to_string_pretty(&outcome.records)?);
                    outcome
                }
            };
            for error in outcome.errors {
                eprintln!("  {}", error);
            }
        }
        Commands::Restore { file } => {
            let errors = engine.restore_file(file)?;
            if errors.is_empty() {
                println!("ok");
            } else {
                for error in errors {
                    eprintln!("{}", error);
                }
            }
        }
        Commands::Reconcile { repair } => {
            let report = engine.reconcile(*repair)?;
            for path in &report.untracked {
                println!("untracked          {}", path);
            }
            for (id, path) in &report.stale_identities {
                println!("stale identifier   {} -> {}", id, path);
            }
            for (id, path) in &report.duplicate_identities {
                println!("duplicate          {} -> {}", id, path);
            }
            for path in &report.stale_checksums {
                println!("stale checksum     {}", path);
            }
            for path in &report.mismatched {
                println!("checksum mismatch  {}", path);
            }
            for path in &report.missing_checksums {
                println!("missing checksum   {}", path);
            }
            for error in &report.corrupt {
                println!("corrupt            {}", error);
            }
            if report.is_consistent() {
                println!("Store and indices are consistent.");
            } else if *repair {
                println!("Repaired with {} index write(s).", report.repaired);
            }
            for failure in &report.failures {
                eprintln!("  repair failed: {}", failure);
            }
        }
    }

    engine.flush()?;
    Ok(())
}
