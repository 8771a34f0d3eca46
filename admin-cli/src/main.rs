mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenderwatch::{config::AppConfig, vault::SecretVault};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "tenderwatch-admin")]
#[command(about = "Set up and inspect the tenderwatch signing vault")]
struct Cli {
    /// Keys directory (defaults to storage.keys_dir from config, then ./keys)
    #[arg(long, global = true)]
    keys_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// First-time setup: create the root key, encrypt certificate and passphrase
    Init {
        /// PKCS#12 certificate container (.p12)
        #[arg(long)]
        certificate: PathBuf,
        /// Replace the secrets of an already complete vault
        #[arg(long)]
        force: bool,
    },
    /// Replace the stored certificate passphrase
    SetPassphrase,
    /// Replace the stored certificate container
    SetCertificate {
        certificate: PathBuf,
    },
    /// Show which vault files exist
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the non-secret vault status to a JSON file
    ExportConfig {
        #[arg(long, default_value = "ecp_config.json")]
        output: PathBuf,
    },
}

fn prompt_new_passphrase() -> anyhow::Result<Zeroizing<String>> {
    let first = Zeroizing::new(rpassword::read_password_from_tty(Some("Certificate passphrase: "))?);
    let confirm = Zeroizing::new(rpassword::read_password_from_tty(Some("Confirm passphrase: "))?);
    commands::check_passphrase(&first, &confirm)?;
    Ok(first)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenderwatch=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let configured = AppConfig::load().ok().map(|c| c.storage.keys_dir);
    let vault = SecretVault::new(commands::resolve_keys_dir(cli.keys_dir, configured));

    match cli.command {
        Commands::Init { certificate, force } => {
            let passphrase = prompt_new_passphrase()?;
            let created = commands::init(&vault, &certificate, &passphrase, force)?;
            if created {
                println!("Created root key: {}", vault.root_key_path().display());
            }
            println!("Certificate and passphrase encrypted in {}", vault.keys_dir().display());
            println!("The original {} can now be deleted.", certificate.display());
            println!("Keep {} safe: without it the secrets cannot be recovered.", vault.root_key_path().display());
        }
        Commands::SetPassphrase => {
            let passphrase = prompt_new_passphrase()?;
            commands::set_passphrase(&vault, &passphrase)?;
            println!("Passphrase replaced");
        }
        Commands::SetCertificate { certificate } => {
            commands::set_certificate(&vault, &certificate)?;
            println!("Certificate replaced; the original {} can now be deleted.", certificate.display());
        }
        Commands::Status { json } => {
            let status = vault.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for line in commands::render_status(&status) {
                    println!("{}", line);
                }
            }
        }
        Commands::ExportConfig { output } => {
            commands::export_config(&vault, &output)?;
            println!("Vault status written to {}", output.display());
        }
    }

    Ok(())
}
