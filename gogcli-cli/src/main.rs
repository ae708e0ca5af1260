//! gog CLI
//!
//! Command-line access to Gmail, Drive and Calendar through the resilient
//! access layer in `gogcli-core`.
//!
//! # Usage
//!
//! ```bash
//! # Show which credential source serves an account
//! gog token drive --account me@example.com
//!
//! # Issue an authenticated GET through the retry transport
//! gog get https://www.googleapis.com/drive/v3/files --service drive --account me@example.com
//!
//! # Print the effective configuration
//! gog config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gogcli_core::{
    ApiClient, AuthRequiredError, CallContext, CircuitBreakerError, GogConfig, GoogleApiError,
    RateLimitError, ResolveError, Service, TokenSourceResolver, TransportError,
    config::default_config_path,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// No credential source for the account; run the authorization flow.
const EXIT_AUTH_REQUIRED: u8 = 3;

/// Circuit open or still rate limited; try again later.
const EXIT_BACKOFF: u8 = 4;

#[derive(Parser)]
#[command(name = "gog")]
#[command(about = "Google CLI for Gmail, Drive and Calendar")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $GOG_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the token source for an account
    Token {
        /// Service (gmail, drive, calendar)
        service: Service,

        /// Account email
        #[arg(short, long)]
        account: String,

        /// Print the access token itself
        #[arg(long)]
        show: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Issue an authenticated GET request and print the body
    Get {
        url: String,

        /// Service whose credentials to use
        #[arg(short, long)]
        service: Service,

        /// Account email
        #[arg(short, long)]
        account: String,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = GogConfig::from_path(&config_path)?;
    tracing::debug!(path = %config_path.display(), "loaded configuration");

    match cli.command {
        Commands::Token {
            service,
            account,
            show,
            format,
        } => token(&config, service, &account, show, format).await,
        Commands::Get {
            url,
            service,
            account,
        } => get(&config, &url, service, &account).await,
        Commands::Config => print_config(&config),
    }
}

async fn token(
    config: &GogConfig,
    service: Service,
    account: &str,
    show: bool,
    format: Format,
) -> Result<()> {
    let source = TokenSourceResolver::from_config(config)
        .resolve(service, account)
        .await?;

    let token = if show {
        Some(source.token().await.context("fetch access token")?)
    } else {
        None
    };

    match format {
        Format::Json => {
            let out = serde_json::json!({
                "service": service,
                "account": account,
                "source": source.kind(),
                "access_token": token.as_ref().map(|t| t.access_token.expose()),
                "expires_at": token.as_ref().and_then(|t| t.expires_at),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            println!("{service} {account}: {}", source.kind());
            if let Some(token) = token {
                println!("{}", token.access_token.expose());
            }
        }
    }
    Ok(())
}

async fn get(config: &GogConfig, url: &str, service: Service, account: &str) -> Result<()> {
    let source = TokenSourceResolver::from_config(config)
        .resolve(service, account)
        .await?;
    let retry = config.retry.to_retry_config();
    let max_retries = retry.max_rate_limit_retries;
    let client = ApiClient::new(source, retry)?;

    let cancel = CancellationToken::new();
    let ctx = CallContext::with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let response = client.get(&ctx, url).await?;
    let status = response.status();

    if status.as_u16() == 429 {
        return Err(RateLimitError {
            retries: max_retries,
        }
        .into());
    }
    if !status.is_success() {
        return Err(GoogleApiError::from_response(response).await.into());
    }

    let body = response.text().await.context("read response body")?;
    println!("{body}");
    Ok(())
}

fn print_config(config: &GogConfig) -> Result<()> {
    println!("# {}", config.config_path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<AuthRequiredError>()
            || matches!(
                cause.downcast_ref::<ResolveError>(),
                Some(ResolveError::AuthRequired(_))
            )
        {
            return EXIT_AUTH_REQUIRED;
        }

        if cause.is::<CircuitBreakerError>()
            || cause.is::<RateLimitError>()
            || cause
                .downcast_ref::<TransportError>()
                .is_some_and(TransportError::is_circuit_open)
        {
            return EXIT_BACKOFF;
        }
    }
    1
}
