use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use keyhub_server::auth::{Bcrypt, PasswordHasher};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "keyhubd",
    about = "keyhubd: management console for Outline access-key servers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the console HTTP server
    Serve {
        /// Port to listen on (default: $KEYHUB_PORT or 8080)
        #[arg(long, env = "KEYHUB_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $KEYHUB_HOST or 0.0.0.0)
        #[arg(long, env = "KEYHUB_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Access-key API URL of a managed server; repeat or comma-separate
        #[arg(long = "server", env = "KEYHUB_SERVERS", value_delimiter = ',', required = true)]
        servers: Vec<String>,
        /// Admin username; falls back to the credential file when unset
        #[arg(long, env = "KEYHUB_USERNAME")]
        username: Option<String>,
        /// Admin password; falls back to the credential file when unset
        #[arg(long, env = "KEYHUB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Directory holding the credential file
        #[arg(long, env = "KEYHUB_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Accept self-signed upstream certificates (default: true)
        #[arg(
            long,
            env = "KEYHUB_ACCEPT_INVALID_CERTS",
            default_value_t = true,
            action = ArgAction::Set
        )]
        accept_invalid_certs: bool,
        /// Fragment appended to displayed access URLs
        #[arg(long, env = "KEYHUB_ACCESS_URL_TAG", default_value = "keyhub")]
        access_url_tag: String,
        /// Log level: error, warn, info, debug, verbose (default: $KEYHUB_LOG_LEVEL or warn)
        #[arg(long, env = "KEYHUB_LOG_LEVEL")]
        log_level: Option<String>,
    },
    /// Print a bcrypt hash for a credential file written by hand.
    HashPassword {
        #[arg(long)]
        plaintext: String,
        #[arg(long, default_value_t = 12)]
        cost: u32,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let effective_log_level = if let Commands::Serve { ref log_level, .. } = cli.command {
        let raw = log_level
            .clone()
            .or_else(|| std::env::var("KEYHUB_LOG_LEVEL").ok())
            .unwrap_or_else(|| "warn".into());
        if raw.eq_ignore_ascii_case("verbose") {
            "debug".to_owned()
        } else {
            raw
        }
    } else {
        std::env::var("KEYHUB_LOG_LEVEL").unwrap_or_else(|_| "warn".into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            servers,
            username,
            password,
            data_dir,
            accept_invalid_certs,
            access_url_tag,
            log_level: _,
        } => {
            let cfg = keyhub_server::ServerConfig {
                host,
                port,
                servers,
                username,
                password,
                data_dir,
                accept_invalid_certs,
                access_url_tag,
                // $KEYHUB_UPSTREAM_TIMEOUT, in seconds
                ..Default::default()
            };
            keyhub_server::run(cfg).await
        }

        Commands::HashPassword { plaintext, cost } => cmd_hash_password(&plaintext, cost),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

fn cmd_hash_password(plaintext: &str, cost: u32) -> Result<()> {
    let hash = Bcrypt::new(cost).hash(plaintext)?;
    println!("{hash}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_invalid_certs(args: &[&str]) -> bool {
        let mut argv = vec!["keyhubd", "serve", "--server", "https://h:1/x"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Serve {
                accept_invalid_certs,
                ..
            } => accept_invalid_certs,
            Commands::HashPassword { .. } => unreachable!(),
        }
    }

    #[test]
    fn self_signed_certs_accepted_unless_switched_off() {
        assert!(accept_invalid_certs(&[]));
        assert!(!accept_invalid_certs(&["--accept-invalid-certs", "false"]));
        assert!(accept_invalid_certs(&["--accept-invalid-certs", "true"]));
    }
}
