use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drudock::build::context::BuildContext;
use drudock::cancel::CancelToken;
use drudock::commands::build::{build_init, BuildRequest};
use drudock::commands::{redis, restart, Services};
use drudock::config::settings::SettingsOverrides;
use drudock::config::{AppType, ConfigStore, ToolSettings};
use drudock::console::Console;
use drudock::containers::readiness::MysqlProbe;
use drudock::error::ProvisionError;
use drudock::process::SystemRunner;
use drudock::source::{FixedAnswer, InteractivePrompt, Prompt};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drudock", version, about = "Provision Drupal apps under Docker Compose")]
struct Cli {
    /// More diagnostics on stderr (-v info, -vv debug). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, scaffold, start and install the app in the current directory.
    #[command(name = "build:init", visible_alias = "init")]
    BuildInit {
        /// App type; must match `apptype` in .config.yml.
        #[arg(long = "type", value_parser = parse_app_type)]
        app_type: Option<AppType>,
        /// Docroot inside a cloned repository, instead of asking.
        #[arg(long)]
        docroot: Option<String>,
        /// Directory holding `bundles/`.
        #[arg(long)]
        util_root: Option<PathBuf>,
        /// Seconds to wait for the database.
        #[arg(long = "readiness-timeout")]
        readiness_timeout: Option<u64>,
        /// Stop before bring-up when fetching or scaffolding failed.
        #[arg(long)]
        strict: bool,
        /// Do not open a browser at the end.
        #[arg(long)]
        no_open: bool,
    },
    /// Restart the containers of docker-compose.yml in the current directory.
    #[command(name = "docker:restart", visible_alias = "restart")]
    Restart,
    /// Ping the app's redis.
    #[command(name = "redis:ping")]
    RedisPing,
}

fn parse_app_type(raw: &str) -> Result<AppType, String> {
    AppType::parse(raw).ok_or_else(|| format!("unknown app type '{raw}' (expected D7, D8 or DEFAULT)"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let console = Console::terminal();

    match run(cli.command, &console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err, &console),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "drudock=warn",
        1 => "drudock=info",
        _ => "drudock=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(err: &anyhow::Error, console: &Console) -> ExitCode {
    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::ConfigMissing { .. }) => {
            console.error("You're not currently in an APP directory");
            ExitCode::SUCCESS
        }
        Some(provision) => {
            eprintln!("error[{}]: {err:#}", provision.code());
            ExitCode::from(u8::try_from(provision.exit_code()).unwrap_or(1))
        }
        None => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, console: &Console) -> Result<()> {
    let project_dir = std::env::current_dir().context("resolving current directory")?;
    let cancel = CancelToken::new();
    cancel
        .install_signal_handlers()
        .context("installing signal handlers")?;

    match command {
        Command::BuildInit {
            app_type,
            docroot,
            util_root,
            readiness_timeout,
            strict,
            no_open,
        } => {
            let settings = load_settings(SettingsOverrides {
                utility_root: util_root,
                readiness_timeout_secs: readiness_timeout,
                strict_stages: strict,
                no_open,
            })?;
            let runner = SystemRunner::new(console.clone(), settings.process_timeout(), cancel.clone());
            let prompt: Box<dyn Prompt> = match docroot {
                Some(answer) => Box::new(FixedAnswer(answer)),
                None => Box::new(InteractivePrompt),
            };
            let probe = MysqlProbe::default();
            let services = Services {
                runner: &runner,
                prompt: prompt.as_ref(),
                probe: &probe,
                cancel,
            };
            let request = BuildRequest {
                project_dir: project_dir.clone(),
                settings,
                requested_type: app_type,
                session_build: None,
            };
            build_init(request, console.clone(), &services)
                .with_context(|| format!("building app in '{}'", project_dir.display()))?;
        }
        Command::Restart => {
            let settings = load_settings(SettingsOverrides::default())?;
            let runner = SystemRunner::new(console.clone(), settings.process_timeout(), cancel);
            restart::restart(&project_dir, &settings, console, &runner)
                .context("restarting app containers")?;
        }
        Command::RedisPing => {
            let settings = load_settings(SettingsOverrides::default())?;
            let config = ConfigStore::new(&project_dir)
                .load_validated()
                .context("loading app config")?;
            let runner = SystemRunner::new(console.clone(), settings.process_timeout(), cancel);
            let ctx = BuildContext::new(project_dir, config, settings, console.clone());
            redis::ping(&ctx, &runner).context("pinging redis")?;
        }
    }
    Ok(())
}

fn load_settings(overrides: SettingsOverrides) -> Result<ToolSettings> {
    let mut settings = ToolSettings::load().context("loading tool settings")?;
    settings.apply_overrides(&overrides);
    Ok(settings)
}
