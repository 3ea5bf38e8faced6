use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, info};
use tokio::net::TcpListener;

use chatstage::manifest::{self, Manifest};
use chatstage::settings::{self, Settings};
use chatstage::{ChatApp, app, shutdown_signal};

const BIN_NAME: &str = "chatstage";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config_file = match &cli.config {
        Some(path) => settings::expand_path(path)?,
        None => settings::default_config_file()?,
    };
    let settings = Settings::load(&config_file)?;

    match cli.command {
        Command::Serve(args) => {
            cli.log.init(&settings.logging.level);
            serve(settings, args)
        }
        Command::Config { command } => show_config(&settings, &config_file, command),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, &mut io::stdout());
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = BIN_NAME,
    version,
    about = "Serve chat-style web apps with a live layout and artifact pane.",
    propagate_version = true
)]
struct Cli {
    /// Settings file [default: $XDG_CONFIG_HOME/chatstage/config.toml]
    #[arg(long, value_name = "PATH", env = "CHATSTAGE_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    log: LogOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct LogOpts {
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Write logs as JSON lines
    #[arg(long = "log-json", global = true)]
    json: bool,
    /// When to color log output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve a chat app, optionally seeded from a manifest
    Serve(ServeArgs),
    /// Inspect the effective settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// App manifest (TOML) with layout, artifacts and reply behavior
    #[arg(value_name = "MANIFEST")]
    manifest: Option<PathBuf>,
    /// Address to bind [default: server.host]
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on [default: server.port]
    #[arg(short, long)]
    port: Option<u16>,
    /// Re-apply the manifest whenever it changes on disk
    #[arg(long, requires = "manifest")]
    reload: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective settings as TOML
    Show,
    /// Print the settings file path
    Path,
}

impl LogOpts {
    fn level(&self, configured: &str) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => configured.parse().unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn init(&self, configured: &str) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.level(configured);
        let directive = level.as_str().to_ascii_lowercase();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{BIN_NAME}={directive},tower_http={directive}"))
        });

        let registry = tracing_subscriber::registry().with(filter);
        if self.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let ansi = match self.color {
                ColorChoice::Always => true,
                ColorChoice::Never => false,
                ColorChoice::Auto => {
                    env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
                }
            };
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(ansi))
                .try_init()
                .ok();
        }

        // Library modules log through the `log` facade.
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .filter_level(level)
            .try_init()
            .ok();
    }
}

fn show_config(settings: &Settings, config_file: &Path, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => print!("{}", settings.to_toml()?),
        ConfigCommand::Path => println!("{}", config_file.display()),
    }
    Ok(())
}

#[tokio::main]
async fn serve(settings: Settings, args: ServeArgs) -> Result<()> {
    app::mark_launched_by_cli();
    let chat = ChatApp::with_layout_defaults(settings.layout.clone());

    let manifest_path = match &args.manifest {
        Some(path) => Some(settings::expand_path(path)?),
        None => None,
    };
    match &manifest_path {
        Some(path) => load_application(&chat, path).context("Error loading application")?,
        None => info!("No manifest given, serving an empty app"),
    }

    let _reload = match (&manifest_path, args.reload) {
        (Some(path), true) => Some(manifest::spawn_reload(path.clone(), chat.clone())?),
        _ => None,
    };

    let addr = settings
        .server
        .socket_addr(args.host.as_deref(), args.port)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    chat.serve(listener, &settings.server.options(), shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

fn load_application(chat: &ChatApp, path: &Path) -> Result<()> {
    let manifest = Manifest::load(path)?;
    manifest.apply(chat);
    manifest.install_reply(chat);
    info!(
        "Loaded {} ({} artifacts, reply: {:?})",
        path.display(),
        chat.artifacts().len(),
        manifest.reply.kind
    );
    Ok(())
}
