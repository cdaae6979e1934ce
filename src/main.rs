use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use secretwatch::secrets::{SecretHandler, Secrets, middleware};
use secretwatch::{
    DirectoryWatcher, DirectoryWatcherConfig, Provider, Settings, SharedLogger, TracingLogger,
    init_from_config, logging,
};

#[derive(Parser)]
#[command(name = "secretwatch")]
#[command(about = "Watch secret files and directories for changes", version)]
struct Cli {
    /// Settings file (defaults to ./secretwatch.toml)
    #[arg(short, long, global = true, env = "SECRETWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log every file created in or removed from a directory
    WatchDir {
        /// Directory to watch
        dir: PathBuf,
    },

    /// Load a secret store and log its contents on every change
    Secrets {
        /// Bundle file or CSI mount (overrides config)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Secret provider (overrides config)
        #[arg(long, value_parser = ["vault", "vault_csi"])]
        provider: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = Settings::config_path(cli.config.as_deref());
    let mut settings = Settings::load_from(&config_path)
        .map_err(|e| anyhow::anyhow!("loading {}: {e}", config_path.display()))?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", settings.to_toml()?);
            Ok(())
        }

        Commands::WatchDir { dir } => watch_dir(&dir).await,

        Commands::Secrets { path, provider } => {
            if let Some(path) = path {
                settings.secrets.path = path;
            }
            if let Some(provider) = provider {
                settings.secrets.provider = provider.parse::<Provider>()?;
            }
            watch_secrets(&settings).await
        }
    }
}

fn stderr_logger() -> SharedLogger {
    Arc::new(|message: &str| eprintln!("{message}"))
}

async fn watch_dir(dir: &Path) -> anyhow::Result<()> {
    let scope = CancellationToken::new();
    let config = DirectoryWatcherConfig::new(dir)
        .logger(stderr_logger())
        .on_create(|path: &Path| {
            println!("create {}", path.display());
            Ok(())
        })
        .on_remove(|path: &Path| {
            println!("remove {}", path.display());
            Ok(())
        });

    let watcher = DirectoryWatcher::start(&scope, config)
        .with_context(|| format!("watching {}", dir.display()))?;
    eprintln!("Watching {} (Ctrl-C to stop)", dir.display());

    tokio::signal::ctrl_c().await?;
    watcher.shutdown().await;
    Ok(())
}

async fn watch_secrets(settings: &Settings) -> anyhow::Result<()> {
    let scope = CancellationToken::new();

    let print_ids = middleware(|next: SecretHandler| -> SecretHandler {
        Arc::new(move |secrets: &Secrets| {
            println!("{} secrets:", secrets.len());
            for id in secrets.ids() {
                let kind = secrets
                    .kind_of(id)
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                println!("  {id} ({kind})");
            }
            next(secrets);
        })
    });

    let logger: SharedLogger = Arc::new(TracingLogger);
    let store = init_from_config(
        &scope,
        &settings.secrets,
        &settings.watcher,
        logger,
        &[print_ids],
    )
    .await
    .with_context(|| format!("loading secrets from {}", settings.secrets.path.display()))?;

    if settings.secrets.provider == Provider::Vault {
        let vault = store.get_vault()?;
        if !vault.url.is_empty() {
            println!("vault: {}", vault.url);
        }
    }

    eprintln!(
        "Watching {} (Ctrl-C to stop)",
        settings.secrets.path.display()
    );
    tokio::signal::ctrl_c().await?;
    store.close();
    scope.cancel();
    Ok(())
}
