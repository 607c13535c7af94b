use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repoherd::config::DEFAULT_TEMPLATE;
use repoherd::credentials::{credentials_path, mask_token, save_credential};
use repoherd::{
    Config, ConfigLocation, Connector, ConnectorFactory, Credentials, DialoguerPrompter,
    ExecutionEngine, GitClient, HttpConnectors, ProviderKind, StopSignal, StrategyResolver,
    SyncOptions, SyncRunner, SyncSummary,
};

#[derive(Parser)]
#[command(name = "repoherd")]
#[command(about = "Keep local working copies in agreement with a declared repository list")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path, http(s) URL or ssh location (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone declared repositories and handle untracked ones
    Sync {
        /// Delete local repositories that are not declared
        #[arg(short, long)]
        prune: bool,

        /// Add local repositories that are not declared to the config
        #[arg(short, long)]
        add: bool,

        /// Skip confirmation prompts
        #[arg(long)]
        force: bool,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = repoherd::engine::DEFAULT_WORKERS)]
        jobs: usize,

        /// Show what would happen without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Also pull repositories that are already present
        #[arg(long)]
        pull: bool,

        /// Only sync the named source
        #[arg(long)]
        source: Option<String>,
    },

    /// Pull every repository under every source directory
    Pull {
        /// Number of parallel workers
        #[arg(short, long, default_value_t = repoherd::engine::DEFAULT_WORKERS)]
        jobs: usize,

        /// Only pull the named source
        #[arg(long)]
        source: Option<String>,
    },

    /// Show what sync would change
    Diff {
        /// Only diff the named source
        #[arg(long)]
        source: Option<String>,
    },

    /// Inspect or create the configuration file
    Config {
        /// Validate the config and report every invalid source
        #[arg(short, long)]
        validate: bool,

        /// Print the default config template
        #[arg(short, long)]
        generate: bool,
    },

    /// Verify and store a provider access token
    Connect {
        /// Provider type (github, gitea, bitbucket)
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// Access token (skips the interactive prompt)
        #[arg(short = 'T', long)]
        token: Option<String>,

        /// Server host, e.g. git.example.com
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// List configured connections
        #[arg(short, long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;
    debug!("Starting repoherd v{}", env!("CARGO_PKG_VERSION"));

    let location = config_location(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            prune,
            add,
            force,
            jobs,
            dry_run,
            pull,
            source,
        } => {
            let options = SyncOptions {
                prune,
                add,
                force,
                dry_run,
                pull,
                jobs,
                source,
            };
            cmd_sync(&location, options).await
        }
        Commands::Pull { jobs, source } => cmd_pull(&location, jobs, source).await,
        Commands::Diff { source } => cmd_diff(&location, source).await,
        Commands::Config { validate, generate } => cmd_config(&location, validate, generate).await,
        Commands::Connect {
            kind,
            token,
            host,
            list,
        } => cmd_connect(kind, token, host, list).await,
    }
}

/// Initialize logging based on the debug flag
fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries diffs and summaries
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn config_location(raw: Option<&str>) -> Result<ConfigLocation> {
    match raw {
        Some(raw) => ConfigLocation::parse(raw),
        None => Ok(ConfigLocation::Local(Config::default_config_path()?)),
    }
}

/// Load configuration, writing a template first if nothing exists locally
async fn load_config(location: &ConfigLocation) -> Result<Config> {
    if let ConfigLocation::Local(path) = location {
        let has_sources_dir = path
            .parent()
            .map(|p| p.join("sources.d").is_dir())
            .unwrap_or(false);
        if !path.exists() && !has_sources_dir {
            Config::create_default(path)?;
            bail!(
                "no configuration found; a template was written to {}. Declare your sources there and run again",
                path.display()
            );
        }
    }

    Config::load(location)
        .await
        .with_context(|| format!("Failed to load config from {}", location))
}

fn report_rejected(config: &Config) {
    for err in &config.rejected {
        println!("⚠️  Skipped invalid source: {}", err);
    }
}

/// One runner per command; Ctrl-C raises its stop signal
fn build_runner() -> SyncRunner {
    let stop = StopSignal::new();
    install_stop_handler(stop.clone());

    let resolver = StrategyResolver::with_http(Credentials::from_environment());
    let engine = ExecutionEngine::new(Arc::new(GitClient::new()), stop);
    SyncRunner::new(resolver, engine, Arc::new(DialoguerPrompter::new())).with_progress(true)
}

fn install_stop_handler(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("⏹️  Stopping: running jobs will finish, queued jobs are cancelled");
            stop.raise();
        }
    });
}

async fn cmd_sync(location: &ConfigLocation, options: SyncOptions) -> Result<()> {
    let mut config = load_config(location).await?;
    info!("Syncing {} sources", config.sources.len());

    if options.dry_run {
        println!("🔍 Dry run mode - nothing will be changed");
    }
    if options.force {
        println!("⚡ Force mode enabled");
    }
    if options.add && location.is_remote() {
        println!("⚠️  Config is remote: added repos will not be saved");
    }

    let runner = build_runner();
    let summary = runner.sync(&mut config, &options).await?;

    if options.dry_run {
        print_plan(&summary);
    } else {
        println!("\n🎉 Sync complete!");
        print_summary(&summary);
    }
    finish(&summary)
}

async fn cmd_pull(location: &ConfigLocation, jobs: usize, source: Option<String>) -> Result<()> {
    let config = load_config(location).await?;

    let runner = build_runner();
    let summary = runner.pull(&config, jobs, source.as_deref()).await?;

    println!("\n🎉 Pull complete!");
    print_summary(&summary);
    finish(&summary)
}

async fn cmd_diff(location: &ConfigLocation, source: Option<String>) -> Result<()> {
    let config = load_config(location).await?;
    report_rejected(&config);

    let runner = build_runner();
    let diffs = runner.diff(&config, source.as_deref()).await?;

    let skipped = diffs.iter().filter(|d| d.is_err()).count();
    if skipped == diffs.len() {
        println!("No sources to diff");
    } else if skipped > 0 {
        println!("\n⚠️  {} sources could not be resolved", skipped);
    }
    Ok(())
}

async fn cmd_config(location: &ConfigLocation, validate: bool, generate: bool) -> Result<()> {
    if generate {
        print!("{}", DEFAULT_TEMPLATE);
        return Ok(());
    }

    if validate {
        let config = Config::load(location)
            .await
            .with_context(|| format!("Failed to load config from {}", location))?;
        report_rejected(&config);

        if !config.rejected.is_empty() {
            bail!("{} invalid sources in {}", config.rejected.len(), location);
        }
        println!("✅ Config is valid: {} sources", config.sources.len());
        return Ok(());
    }

    let path = match location {
        ConfigLocation::Local(path) => path,
        _ => bail!("cannot edit a remote config, use --validate to check it"),
    };

    if path.exists() {
        println!("📁 Config: {}", path.display());
    } else {
        Config::create_default(path)?;
        println!("📝 Created default config: {}", path.display());
    }
    println!("   Edit it to declare your sources, then run 'repoherd config --validate'");
    Ok(())
}

async fn cmd_connect(
    kind: Option<String>,
    token: Option<String>,
    host: Option<String>,
    list: bool,
) -> Result<()> {
    if list {
        return list_connections();
    }

    let (kind, host, token) = match (kind, token) {
        (Some(kind), Some(token)) => {
            let kind = ProviderKind::from_name(&kind)
                .ok_or_else(|| anyhow!("unknown connector type: {}", kind))?;
            let host = host
                .map(|h| normalize_host(&h))
                .unwrap_or_else(|| kind.default_host().to_string());
            (kind, host, token)
        }
        _ => interactive_connect(host)?,
    };

    println!("🔌 Testing connection to {} ({})...", host, kind);
    let connector = HttpConnectors
        .connector(kind, &host, &token)
        .context("Failed to create connector")?;
    connector
        .test_connection()
        .await
        .with_context(|| format!("Connection test failed for {}", host))?;

    let path = credentials_path()?;
    save_credential(&path, kind.env_var(), &token)?;

    println!("✅ Connection successful");
    println!("   {} saved to {}", kind.env_var(), path.display());
    Ok(())
}

fn interactive_connect(host: Option<String>) -> Result<(ProviderKind, String, String)> {
    let theme = ColorfulTheme::default();

    let labels: Vec<String> = ProviderKind::ALL
        .iter()
        .map(|k| format!("{} ({} or self-hosted)", k, k.default_host()))
        .collect();
    let index = Select::with_theme(&theme)
        .with_prompt("Select Git provider")
        .items(&labels)
        .default(0)
        .interact()?;
    let kind = ProviderKind::ALL[index];

    let host = match host {
        Some(host) => normalize_host(&host),
        None => {
            let raw: String = Input::with_theme(&theme)
                .with_prompt("Server host")
                .default(kind.default_host().to_string())
                .interact_text()?;
            normalize_host(&raw)
        }
    };

    println!();
    println!("Generate an access token at:");
    println!("  {}", token_url(kind, &host));
    println!();

    let token = Password::with_theme(&theme)
        .with_prompt("Access token")
        .interact()?;
    if token.trim().is_empty() {
        bail!("token is required");
    }

    Ok((kind, host, token.trim().to_string()))
}

fn token_url(kind: ProviderKind, host: &str) -> String {
    match kind {
        ProviderKind::GitHub => format!("https://{}/settings/tokens/new?scopes=repo", host),
        ProviderKind::Gitea => format!("https://{}/user/settings/applications", host),
        ProviderKind::Bitbucket if host == "bitbucket.org" => {
            "https://bitbucket.org/account/settings/app-passwords/".to_string()
        }
        ProviderKind::Bitbucket => format!("https://{}/account", host),
    }
}

fn normalize_host(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn list_connections() -> Result<()> {
    let credentials = Credentials::from_environment();

    println!("Configured connections:");
    let mut any = false;
    for kind in ProviderKind::ALL {
        if let Some(token) = credentials.token_for(kind) {
            println!("   🔑 {:<10} {}", kind, mask_token(token));
            any = true;
        }
    }
    if !any {
        println!("   (none) - run 'repoherd connect' to add one");
    }

    println!();
    println!("Credentials file: {}", credentials_path()?.display());
    Ok(())
}

fn print_plan(summary: &SyncSummary) {
    if summary.planned.is_empty() {
        println!("\n✅ Everything is up to date");
    } else {
        println!("\n📋 Planned changes:");
        for line in &summary.planned {
            println!("   {}", line);
        }
    }
    print_skipped(summary);
}

fn print_summary(summary: &SyncSummary) {
    println!("   📂 Sources processed: {}", summary.sources_processed);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Pulled: {}", summary.pulled);
    println!("   🗑️  Pruned: {}", summary.pruned);
    println!("   ➕ Added to config: {}", summary.added);
    println!("   ❌ Failed: {}", summary.failed.len() + summary.prune_failed);
    if summary.cancelled > 0 {
        println!("   ⏹️  Cancelled: {}", summary.cancelled);
    }
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if !summary.failed.is_empty() {
        println!("\n🔍 Failed Operations:");
        for (name, error) in &summary.failed {
            println!("   ❌ {}: {}", name, error);
        }
    }
    print_skipped(summary);
}

fn print_skipped(summary: &SyncSummary) {
    if !summary.sources_skipped.is_empty() {
        println!("\n⏭️  Skipped sources:");
        for (name, reason) in &summary.sources_skipped {
            println!("   ⚠️  {}: {}", name, reason);
        }
    }
}

fn finish(summary: &SyncSummary) -> Result<()> {
    if summary.has_failures() {
        bail!("completed with failures");
    }
    Ok(())
}
