use clap::Parser;
use depot_api_rest::{router, AppState, DEFAULT_MAX_UPLOAD_BYTES};
use depot_core::{
    normalize_listen_addr, ConfigFile, CoreConfig, DefaultPaths, MetadataEngine, StorageBackend,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Self-hosted file store with stable identifiers and checksums.
///
/// Every setting is taken from, in order: the command line, the environment (a `.env` file is
/// honoured), the TOML configuration file, the built-in default.
#[derive(Parser, Debug)]
#[command(name = "depot", version)]
struct Args {
    /// Port or address to listen on
    #[arg(short = 'p', long = "port", env = "DEPOT_ADDR")]
    addr: Option<String>,
    /// Root directory of the stored files
    #[arg(short = 'd', long, env = "DEPOT_BASE_DIR")]
    base_dir: Option<PathBuf>,
    /// Directory holding the identity and checksum indices
    #[arg(short = 'c', long, env = "DEPOT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// Index backend: sled or memory
    #[arg(long, env = "DEPOT_BACKEND")]
    backend: Option<StorageBackend>,
    /// Configuration file (default: ~/.config/depot.toml)
    #[arg(long, env = "DEPOT_CONFIG")]
    config: Option<PathBuf>,
    /// Load a JSON snapshot into the indices, print the outcome and exit
    #[arg(long, value_name = "FILE")]
    restore: Option<PathBuf>,
}

/// Fully resolved startup settings.
#[derive(Debug)]
struct Settings {
    addr: String,
    core: CoreConfig,
    max_upload_bytes: usize,
}

fn resolve(args: &Args, file: ConfigFile, defaults: DefaultPaths) -> anyhow::Result<Settings> {
    let addr = match args.addr.as_deref().or(file.port.as_deref()) {
        Some(value) => normalize_listen_addr(value),
        None => {
            tracing::info!("no port specified, falling back to {}", normalize_listen_addr(""));
            normalize_listen_addr("")
        }
    };

    let base_dir = match args.base_dir.clone().or(file.base_dir) {
        Some(dir) => dir,
        None => {
            tracing::info!(
                "no base directory specified, falling back to {}",
                defaults.base_dir.display()
            );
            defaults.base_dir
        }
    };

    let cache_dir = match args.cache_dir.clone().or(file.cache_dir) {
        Some(dir) => dir,
        None => {
            tracing::info!(
                "no cache directory specified, falling back to {}",
                defaults.cache_dir.display()
            );
            defaults.cache_dir
        }
    };

    let backend = args.backend.or(file.backend).unwrap_or_default();

    Ok(Settings {
        addr,
        core: CoreConfig::new(base_dir, cache_dir, backend)?,
        max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
    })
}

/// Main entry point for the Depot server
///
/// Opens the indices and serves the REST API, or performs a one-shot restore when `--restore`
/// is given.
///
/// # Errors
/// Returns an error if the configuration is invalid, the indices cannot be opened, the
/// snapshot cannot be read, or the HTTP server fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot=info".parse()?)
                .add_directive("depot_core=info".parse()?)
                .add_directive("depot_api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let defaults = DefaultPaths::for_current_user()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| defaults.config_file.clone());
    let file = ConfigFile::load(&config_path)?.unwrap_or_default();
    let settings = resolve(&args, file, defaults)?;

    let engine = MetadataEngine::open(&settings.core)?;

    if let Some(snapshot) = &args.restore {
        let errors = engine.restore_file(snapshot)?;
        engine.flush()?;
        if errors.is_empty() {
            println!("ok");
        } else {
            for error in errors {
                println!("{}", error);
            }
        }
        return Ok(());
    }

    let root = std::fs::canonicalize(settings.core.base_dir())?;
    tracing::info!("setting the base directory at {}", root.display());
    tracing::info!("++ Starting Depot on {}", settings.addr);

    let app = router(AppState::new(engine.clone(), root), settings.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    engine.flush()?;
    tracing::info!("-- Depot stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["depot"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_apply_when_nothing_is_set() {
        let defaults = DefaultPaths::under(Path::new("/home/ada"));
        let settings = resolve(
            &Args {
                addr: None,
                base_dir: None,
                cache_dir: None,
                backend: None,
                config: None,
                restore: None,
            },
            ConfigFile::default(),
            defaults,
        )
        .unwrap();

        assert_eq!(settings.addr, "0.0.0.0:8080");
        assert_eq!(settings.core.base_dir(), Path::new("/home/ada/.depot"));
        assert_eq!(settings.core.cache_dir(), Path::new("/home/ada/.cache/depot"));
        assert_eq!(settings.core.backend(), StorageBackend::Sled);
        assert_eq!(settings.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_flags_win_over_config_file() {
        let file = ConfigFile::parse(
            r#"
            port = ":9000"
            base_dir = "/srv/from-file"
            cache_dir = "/var/cache/from-file"
            max_upload_bytes = 1024
            "#,
        )
        .unwrap();

        let settings = resolve(
            &args(&["-p", "7000", "-d", "/srv/from-flag", "--backend", "memory"]),
            file,
            DefaultPaths::under(Path::new("/home/ada")),
        )
        .unwrap();

        assert_eq!(settings.addr, "0.0.0.0:7000");
        assert_eq!(settings.core.base_dir(), Path::new("/srv/from-flag"));
        assert_eq!(settings.core.cache_dir(), Path::new("/var/cache/from-file"));
        assert_eq!(settings.core.backend(), StorageBackend::Memory);
        assert_eq!(settings.max_upload_bytes, 1024);
    }

    #[test]
    fn test_config_file_port_is_normalized() {
        let file = ConfigFile::parse("port = \"9000\"").unwrap();
        let settings = resolve(
            &Args {
                addr: None,
                base_dir: None,
                cache_dir: None,
                backend: None,
                config: None,
                restore: None,
            },
            file,
            DefaultPaths::under(Path::new("/home/ada")),
        )
        .unwrap();
        assert_eq!(settings.addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_restore_flag_parses() {
        let parsed = args(&["--restore", "/tmp/backup.json"]);
        assert_eq!(parsed.restore, Some(PathBuf::from("/tmp/backup.json")));
    }
}
