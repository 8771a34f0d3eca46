//! Vault operations behind each subcommand. Prompts stay in `main.rs`.

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tenderwatch::fsutil::{self, PUBLIC_FILE_MODE};
use tenderwatch::vault::{SecretKind, SecretVault, VaultStatus};
use zeroize::Zeroizing;

/// Reject empty or mismatched passphrase entries.
pub fn check_passphrase(first: &str, confirm: &str) -> anyhow::Result<()> {
    if first.is_empty() {
        bail!("Passphrase must not be empty");
    }
    if first != confirm {
        bail!("Passphrases do not match");
    }
    Ok(())
}

/// First-time setup: root key, certificate and passphrase.
///
/// Refuses to touch a complete vault unless `force` is set. The root key is
/// never replaced; `force` only re-encrypts the two secrets.
pub fn init(
    vault: &SecretVault,
    certificate: &Path,
    passphrase: &Zeroizing<String>,
    force: bool,
) -> anyhow::Result<bool> {
    if vault.verify_complete() && !force {
        bail!(
            "Vault in {} is already set up (use --force to replace the stored secrets)",
            vault.keys_dir().display()
        );
    }
    if !certificate.is_file() {
        bail!("Certificate file not found: {}", certificate.display());
    }

    let created = vault.initialize().context("Failed to create root key")?;
    vault
        .store_secret_from_file(SecretKind::Certificate, certificate)
        .context("Failed to store certificate")?;
    vault
        .store_secret(SecretKind::Passphrase, passphrase.as_bytes())
        .context("Failed to store passphrase")?;
    Ok(created)
}

/// Replace the stored passphrase. The vault must already have a root key.
pub fn set_passphrase(vault: &SecretVault, passphrase: &Zeroizing<String>) -> anyhow::Result<()> {
    vault
        .store_secret(SecretKind::Passphrase, passphrase.as_bytes())
        .context("Failed to store passphrase")
}

/// Replace the stored certificate. The vault must already have a root key.
pub fn set_certificate(vault: &SecretVault, certificate: &Path) -> anyhow::Result<()> {
    if !certificate.is_file() {
        bail!("Certificate file not found: {}", certificate.display());
    }
    vault
        .store_secret_from_file(SecretKind::Certificate, certificate)
        .context("Failed to store certificate")
}

/// Human-readable status lines.
pub fn render_status(status: &VaultStatus) -> Vec<String> {
    let mark = |present: bool| if present { "present" } else { "MISSING" };
    vec![
        format!("Keys directory:        {}", status.keys_directory.display()),
        format!("Root key:              {}", mark(status.master_key_exists)),
        format!("Encrypted certificate: {}", mark(status.ecp_encrypted_exists)),
        format!("Encrypted passphrase:  {}", mark(status.password_encrypted_exists)),
        format!(
            "Setup complete:        {}",
            if status.setup_complete { "yes" } else { "no" }
        ),
    ]
}

/// Write the non-secret vault status as JSON for documentation.
pub fn export_config(vault: &SecretVault, output: &Path) -> anyhow::Result<VaultStatus> {
    let status = vault.status();
    let json = serde_json::to_vec_pretty(&status)?;
    fsutil::write_atomic(output, &json, PUBLIC_FILE_MODE)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(status)
}

/// `--keys-dir` if given, else the configured keys directory, else `./keys`.
pub fn resolve_keys_dir(flag: Option<PathBuf>, configured: Option<PathBuf>) -> PathBuf {
    flag.or(configured).unwrap_or_else(|| PathBuf::from("./keys"))
}
