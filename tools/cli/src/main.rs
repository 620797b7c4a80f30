//! zkshare CLI - zero-knowledge file sharing against a local store.
//!
//! Every command opens the store directory, logs in if it needs the
//! private key and exits. Passwords come from `ZKSHARE_PASSWORD` or an
//! interactive prompt, never from flags.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use zkshare_client::{Client, ClientConfig, ShareTarget, UserSession, CONFIG_FILENAME};
use zkshare_common::{FileId, GrantPermissions};
use zkshare_storage::LocalStore;

/// Environment variable consulted before prompting for a password.
const PASSWORD_ENV: &str = "ZKSHARE_PASSWORD";

#[derive(Parser)]
#[command(name = "zkshare")]
#[command(about = "zkshare - Zero-knowledge encrypted file sharing")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account with a fresh identity key pair.
    Register {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username to register.
        #[arg(short, long)]
        user: String,
    },

    /// Check that a password unseals the account's private key.
    Login {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,
    },

    /// Encrypt and upload a file.
    Upload {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File to upload.
        #[arg(short, long)]
        file: PathBuf,

        /// MIME type recorded with the file.
        #[arg(short, long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Download and decrypt a file.
    Download {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File identifier.
        #[arg(short = 'i', long)]
        file_id: String,

        /// Where to write the plaintext.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Grant other users access to a file.
    Share {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File identifier.
        #[arg(short = 'i', long)]
        file_id: String,

        /// Recipient usernames.
        #[arg(short, long, required = true, num_args = 1..)]
        to: Vec<String>,

        /// Allow recipients to share the file further.
        #[arg(long)]
        reshare: bool,

        /// Do not allow recipients to download the ciphertext.
        #[arg(long)]
        no_download: bool,
    },

    /// Revoke one user's access to a file.
    Unshare {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File identifier.
        #[arg(short = 'i', long)]
        file_id: String,

        /// Recipient username to revoke.
        #[arg(short, long)]
        from: String,
    },

    /// List the grants of a file you own.
    Shares {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File identifier.
        #[arg(short = 'i', long)]
        file_id: String,
    },

    /// List your files and the files shared with you.
    Shared {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,
    },

    /// Delete a file you own, revoking every grant.
    Delete {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username.
        #[arg(short, long)]
        user: String,

        /// File identifier.
        #[arg(short = 'i', long)]
        file_id: String,
    },

    /// Show the public key fingerprint of a user.
    Fingerprint {
        /// Store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Username to look up.
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Register { store, user } => cmd_register(&store, &user).await,

        Commands::Login { store, user } => cmd_login(&store, &user).await,

        Commands::Upload {
            store,
            user,
            file,
            mime,
        } => cmd_upload(&store, &user, &file, &mime).await,

        Commands::Download {
            store,
            user,
            file_id,
            output,
        } => cmd_download(&store, &user, &file_id, &output).await,

        Commands::Share {
            store,
            user,
            file_id,
            to,
            reshare,
            no_download,
        } => {
            let permissions = GrantPermissions {
                can_download: !no_download,
                can_reshare: reshare,
            };
            cmd_share(&store, &user, &file_id, &to, permissions).await
        }

        Commands::Unshare {
            store,
            user,
            file_id,
            from,
        } => cmd_unshare(&store, &user, &file_id, &from).await,

        Commands::Shares {
            store,
            user,
            file_id,
        } => cmd_shares(&store, &user, &file_id).await,

        Commands::Shared { store, user } => cmd_shared(&store, &user).await,

        Commands::Delete {
            store,
            user,
            file_id,
        } => cmd_delete(&store, &user, &file_id).await,

        Commands::Fingerprint { store, user } => cmd_fingerprint(&store, &user).await,
    }
}

/// Read the password from the environment or prompt for it.
/// `RUST_LOG` if set, INFO otherwise; `--verbose` overrides both with DEBUG.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        debug!("Using password from {}", PASSWORD_ENV);
        return Ok(Zeroizing::new(password));
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Load `config.json` from the store directory, if present.
async fn load_config(store: &Path) -> Result<ClientConfig> {
    let path = store.join(CONFIG_FILENAME);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ClientConfig::from_bytes(&bytes)
            .with_context(|| format!("Invalid configuration in {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Open the store and build a client over it.
async fn open_client(store: &Path) -> Result<Client> {
    let config = load_config(store).await?;
    let local = Arc::new(
        LocalStore::open(store)
            .await
            .with_context(|| format!("Failed to open store at {}", store.display()))?
            .with_max_file_size(config.max_file_size),
    );
    Client::new(config, local.clone(), local).context("Invalid client configuration")
}

/// Log in, prompting for the password.
async fn open_session(client: &Client, user: &str) -> Result<UserSession> {
    let password = read_password(&format!("Password for {}: ", user))?;
    client
        .login(user, &password)
        .await
        .context("Login failed")
}

fn parse_file_id(file_id: &str) -> Result<FileId> {
    FileId::new(file_id).context("Invalid file id")
}

/// Create an account.
async fn cmd_register(store: &Path, user: &str) -> Result<()> {
    info!("Registering {}", user);

    let password = read_password("Enter password: ")?;
    if std::env::var(PASSWORD_ENV).is_err() {
        let confirm = read_password("Confirm password: ")?;
        if password != confirm {
            anyhow::bail!("Passwords do not match");
        }
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let client = open_client(store).await?;
    let record = client
        .register(user, &password)
        .await
        .context("Failed to register")?;
    let (_, public_key) = client.public_key_of(user).await?;

    println!("Account created successfully!");
    println!("  User: {}", record.username);
    println!("  ID: {}", record.id);
    println!("  Fingerprint: {}", public_key.fingerprint()?);

    Ok(())
}

/// Verify the password.
async fn cmd_login(store: &Path, user: &str) -> Result<()> {
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    println!("Logged in as {}", session.username());
    println!("  ID: {}", session.principal_id());
    println!("  Fingerprint: {}", session.public_key().fingerprint()?);

    Ok(())
}

/// Encrypt and upload a file.
async fn cmd_upload(store: &Path, user: &str, file: &Path, mime: &str) -> Result<()> {
    info!("Uploading {}", file.display());

    let content = Zeroizing::new(
        tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?,
    );
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Source path has no file name")?;

    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;
    let metadata = client
        .upload(&session, &filename, mime, &content)
        .await
        .context("Failed to upload file")?;

    println!("File uploaded successfully: {} ({} bytes)", filename, metadata.size);
    println!("  ID: {}", metadata.id);

    Ok(())
}

/// Download and decrypt a file.
async fn cmd_download(store: &Path, user: &str, file_id: &str, output: &Path) -> Result<()> {
    let file_id = parse_file_id(file_id)?;
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    let file = client
        .download(&session, &file_id)
        .await
        .context("Failed to download file")?;
    tokio::fs::write(output, file.content.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "File extracted successfully: {} -> {} ({} bytes)",
        file.metadata.filename,
        output.display(),
        file.content.len()
    );

    Ok(())
}

/// Share a file with other users.
async fn cmd_share(
    store: &Path,
    user: &str,
    file_id: &str,
    recipients: &[String],
    permissions: GrantPermissions,
) -> Result<()> {
    let file_id = parse_file_id(file_id)?;
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    let mut targets = Vec::with_capacity(recipients.len());
    let mut names = Vec::with_capacity(recipients.len());
    for username in recipients {
        let (record, public_key) = client
            .public_key_of(username)
            .await
            .with_context(|| format!("Unknown user: {}", username))?;
        println!("  {} fingerprint: {}", username, public_key.fingerprint()?);
        names.push((record.id.clone(), record.username));
        targets.push(
            ShareTarget::new(record.id)
                .with_public_key(public_key)
                .with_permissions(permissions),
        );
    }

    let report = client
        .share(&session, &file_id, targets)
        .await
        .context("Failed to share file")?;

    for recipient in &report.recipients {
        let name = names
            .iter()
            .find(|(id, _)| id == &recipient.recipient)
            .map(|(_, name)| name.as_str())
            .unwrap_or_else(|| recipient.recipient.as_str());
        match &recipient.outcome {
            Ok(_) => println!("  [OK] {}", name),
            Err(e) if e.is_policy() => println!("  [REJECTED] {}: {}", name, e),
            Err(e) => println!("  [FAILED] {}: {}", name, e),
        }
    }

    if !report.all_granted() {
        anyhow::bail!(
            "{} of {} recipients failed",
            report.failed().count(),
            report.recipients.len()
        );
    }
    println!("File shared successfully.");

    Ok(())
}

/// Revoke a user's grant.
async fn cmd_unshare(store: &Path, user: &str, file_id: &str, from: &str) -> Result<()> {
    let file_id = parse_file_id(file_id)?;
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    let (record, _) = client
        .public_key_of(from)
        .await
        .with_context(|| format!("Unknown user: {}", from))?;
    client
        .unshare(&session, &file_id, &record.id)
        .await
        .context("Failed to revoke access")?;

    println!("Access revoked for {}", from);
    println!("  Note: the content key is not rotated; re-upload the file to cut off");
    println!("  any copy of the key {} may have kept.", from);

    Ok(())
}

/// List the grants of a file.
async fn cmd_shares(store: &Path, user: &str, file_id: &str) -> Result<()> {
    let file_id = parse_file_id(file_id)?;
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    let grants = client
        .list_grants(&session, &file_id)
        .await
        .context("Failed to list grants")?;

    if grants.is_empty() {
        println!("File is not shared.");
    } else {
        println!("Grants of {}:", file_id);
        for grant in grants {
            println!(
                "  {} (download: {}, reshare: {}, since {})",
                grant.recipient_username,
                grant.permissions.can_download,
                grant.permissions.can_reshare,
                grant.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// List own files and files shared with the user.
async fn cmd_shared(store: &Path, user: &str) -> Result<()> {
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    let owned = client.my_files(&session).await?;
    let shared = client.shared_with_me(&session).await?;

    println!("Your files:");
    if owned.is_empty() {
        println!("  (none)");
    }
    for file in owned {
        println!("  {}  {} ({} bytes)", file.id, file.filename, file.size);
    }

    println!("Shared with you:");
    if shared.is_empty() {
        println!("  (none)");
    }
    for entry in shared {
        println!(
            "  {}  {} ({} bytes){}",
            entry.metadata.id,
            entry.metadata.filename,
            entry.metadata.size,
            if entry.permissions.can_download {
                ""
            } else {
                " [no download]"
            }
        );
    }

    Ok(())
}

/// Delete an owned file.
async fn cmd_delete(store: &Path, user: &str, file_id: &str) -> Result<()> {
    let file_id = parse_file_id(file_id)?;
    let client = open_client(store).await?;
    let session = open_session(&client, user).await?;

    client
        .delete_file(&session, &file_id)
        .await
        .context("Failed to delete file")?;

    println!("File deleted: {}", file_id);

    Ok(())
}

/// Print a user's public key fingerprint.
async fn cmd_fingerprint(store: &Path, user: &str) -> Result<()> {
    let client = open_client(store).await?;
    let (record, public_key) = client
        .public_key_of(user)
        .await
        .with_context(|| format!("Unknown user: {}", user))?;

    println!("{} ({})", record.username, record.id);
    println!("  Fingerprint: {}", public_key.fingerprint()?);
    println!("  Key size: {} bits", public_key.bits());

    Ok(())
}
