use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use paramsync::confirm::TerminalConfirmer;
use paramsync::console::Console;
use paramsync::export::{ExportEngine, ExportError, ExportOptions};
use paramsync::purge::{PurgeEngine, PurgeError, PurgeOptions};
use paramsync::ssm::{SsmConfig, SsmStore};
use paramsync::store::FatalError;
use paramsync::sync::{SyncEngine, SyncError, SyncOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
  name = "paramsync",
  about = "Push .env files into AWS SSM Parameter Store, pull them back, and purge namespaces",
  version,
  author
)]
struct Cli {
  /// AWS profile to use
  #[arg(long, global = true, env = "PARAMSYNC_PROFILE")]
  profile: Option<String>,

  /// AWS region to use
  #[arg(long, global = true, env = "PARAMSYNC_REGION")]
  region: Option<String>,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Write every variable of an env file under a namespace
  Sync {
    /// Namespace to write under, e.g. /prod/api
    #[arg(short, long, env = "PARAMSYNC_NAMESPACE")]
    namespace: Option<String>,

    /// Path to the .env file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Read the env content from stdin instead of a file
    #[arg(long)]
    stdin: bool,

    /// Store every value as a SecureString
    #[arg(long)]
    secure_all: bool,

    /// Show what would be written without writing
    #[arg(long)]
    dry_run: bool,
  },

  /// Delete every parameter under a namespace
  Purge {
    /// Namespace to empty
    #[arg(short, long, env = "PARAMSYNC_NAMESPACE")]
    namespace: Option<String>,

    /// Refuse to purge anything
    #[arg(long, env = "PARAMSYNC_PARANOID", value_parser = BoolishValueParser::new())]
    paranoid: bool,

    /// Skip the confirmation prompts
    #[arg(long)]
    force: bool,
  },

  /// Print a namespace as .env content
  Export {
    /// Namespace to read
    #[arg(short, long, env = "PARAMSYNC_NAMESPACE")]
    namespace: Option<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
  #[error(transparent)]
  Sync(#[from] SyncError),
  #[error(transparent)]
  Purge(#[from] PurgeError),
  #[error(transparent)]
  Export(#[from] ExportError),
  #[error("Failed to read stdin: {0}")]
  Stdin(std::io::Error),
}

impl CliError {
  fn fatal(&self) -> Option<&FatalError> {
    match self {
      CliError::Sync(SyncError::Fatal(fatal))
      | CliError::Purge(PurgeError::Fatal(fatal))
      | CliError::Export(ExportError::Fatal(fatal)) => Some(fatal),
      _ => None,
    }
  }

  fn remediation(&self) -> Option<&'static str> {
    match self {
      CliError::Purge(PurgeError::Paranoid) => {
        Some("Unset PARAMSYNC_PARANOID (or drop --paranoid) to allow purges.")
      }
      CliError::Sync(SyncError::NamespaceRequired)
      | CliError::Purge(PurgeError::NamespaceRequired)
      | CliError::Export(ExportError::NamespaceRequired) => {
        Some("Pass --namespace or set PARAMSYNC_NAMESPACE.")
      }
      CliError::Sync(SyncError::SourceRequired | SyncError::ConflictingSources) => {
        Some("Pass exactly one of --file and --stdin.")
      }
      _ => self.fatal().map(|fatal| fatal.kind.remediation()),
    }
  }
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

async fn run(cli: Cli, console: &Console) -> Result<ExitCode, CliError> {
  let config = SsmConfig {
    profile: cli.profile,
    region: cli.region,
  };

  let success = match cli.command {
    Command::Sync {
      namespace,
      file,
      stdin,
      secure_all,
      dry_run,
    } => {
      let text = if stdin {
        Some(std::io::read_to_string(std::io::stdin()).map_err(CliError::Stdin)?)
      } else {
        None
      };
      let options = SyncOptions {
        namespace,
        file,
        text,
        force_all_secret: secure_all,
        dry_run,
      };
      options.validate()?;
      let store = SsmStore::connect(&config).await;
      let report = SyncEngine::new(&store, console).sync(options).await?;
      !report.has_failures()
    }
    Command::Purge {
      namespace,
      paranoid,
      force,
    } => {
      let options = PurgeOptions {
        namespace,
        paranoid,
        force,
      };
      options.validate()?;
      let store = SsmStore::connect(&config).await;
      let outcome = PurgeEngine::new(&store, &TerminalConfirmer, console)
        .purge(options)
        .await?;
      !outcome.has_failures()
    }
    Command::Export { namespace, output } => {
      let options = ExportOptions { namespace, output };
      options.validate()?;
      let store = SsmStore::connect(&config).await;
      ExportEngine::new(&store, console).export(options).await?;
      true
    }
  };

  Ok(if success {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  let console = Console::stdout(cli.verbose > 0);
  match run(cli, &console).await {
    Ok(code) => code,
    Err(error) => {
      eprintln!("Error: {error}");
      if let Some(remediation) = error.remediation() {
        eprintln!("{remediation}");
      }
      ExitCode::FAILURE
    }
  }
}
