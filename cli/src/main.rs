// lifeline-cli — Desktop front end for the Lifeline broadcast engine
//
// Identity and contact management, pairing-record exchange, and a
// loopback self-test of the full engine. The radio itself lives on the
// handheld; this tool manages the same storage format.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lifeline_core::platform::FixedPositionProvider;
use lifeline_core::radio::LoopbackRadio;
use lifeline_core::store::{MemoryStorage, SledStorage, StorageBackend};
use lifeline_core::{
    decrypt, encrypt, generate_key, ContactStore, Engine, EngineConfig, EngineEvent,
    IdentityStore, KeyVault, MessageKind, PairingRecord, Position, StoredKey,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lifeline")]
#[command(about = "Lifeline — Offline Emergency Broadcast", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize device identity
    Init,
    /// Show identity information
    Identity,
    /// Manage contacts
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },
    /// Exchange pairing records
    Pair {
        #[command(subcommand)]
        action: PairAction,
    },
    /// Run self-tests
    Selftest,
}

#[derive(Subcommand)]
enum ContactAction {
    List,
    Remove { id: String },
}

#[derive(Subcommand)]
enum PairAction {
    /// Print this device's pairing record for a peer to scan
    Export,
    /// Store a scanned pairing record as a contact
    Import {
        record: String,
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::Identity => cmd_identity(),
        Commands::Contact { action } => cmd_contact(action),
        Commands::Pair { action } => cmd_pair(action),
        Commands::Selftest => cmd_selftest().await,
    }
}

fn open_storage() -> Result<Arc<dyn StorageBackend>> {
    let path = config::storage_dir()?;
    let path = path.to_str().context("Storage path is not valid UTF-8")?;
    let storage = SledStorage::new(path).map_err(|e| anyhow::anyhow!(e))?;
    Ok(Arc::new(storage))
}

fn cmd_init() -> Result<()> {
    println!("{}", "Initializing Lifeline...".bold());
    println!();

    let data_dir = config::data_dir()?;
    println!("  {} Data directory: {}", "✓".green(), data_dir.display());

    let storage = open_storage()?;
    let vault = KeyVault::open(&storage)?;
    println!("  {} Key vault", "✓".green());

    let identity = IdentityStore::new(storage).load_or_generate(&vault)?;
    println!("  {} Identity ready", "✓".green());
    println!();

    println!("{}", "Identity Information:".bold());
    println!("  ID: {}", identity.id.bright_cyan());
    println!();

    println!("{}", "Next steps:".bold());
    println!("  • Export your pairing record: {}", "lifeline pair export".bright_green());
    println!(
        "  • Import a peer's record:     {}",
        "lifeline pair import <record> --name <name>".bright_green()
    );

    Ok(())
}

fn cmd_identity() -> Result<()> {
    let storage = open_storage()?;
    let identity = IdentityStore::new(storage)
        .load()?
        .context("No identity yet — run `lifeline init` first")?;

    println!("{}", "Identity Information".bold());
    println!("  ID: {}", identity.id.bright_cyan());
    match identity.key {
        StoredKey::Wrapped(_) => println!("  Key: {}", "vault-wrapped".green()),
        StoredKey::LegacyRaw(_) => {
            println!("  Key: {}", "legacy, stored unwrapped".bright_red());
            println!();
            println!(
                "{}",
                "⚠️  Re-pair to upgrade this key to wrapped storage.".bright_red()
            );
        }
    }

    Ok(())
}

fn cmd_contact(action: ContactAction) -> Result<()> {
    let storage = open_storage()?;
    let mut contacts = ContactStore::load(storage)?;

    match action {
        ContactAction::List => {
            let list = contacts.list();

            if list.is_empty() {
                println!("{}", "No contacts yet.".dimmed());
            } else {
                println!("{} ({} total)", "Contacts".bold(), list.len());
                println!();

                for contact in list {
                    println!("  {} {}", "•".bright_green(), contact.name.bright_cyan());
                    println!("    ID: {}", contact.id.dimmed());
                }
            }
        }

        ContactAction::Remove { id } => {
            if contacts.remove(&id)? {
                println!("{} Removed contact: {}", "✓".green(), id.bright_cyan());
            } else {
                anyhow::bail!("Contact not found: {}", id);
            }
        }
    }

    Ok(())
}

fn cmd_pair(action: PairAction) -> Result<()> {
    let storage = open_storage()?;
    let vault = KeyVault::open(&storage)?;

    match action {
        PairAction::Export => {
            let identity = IdentityStore::new(storage)
                .load()?
                .context("No identity yet — run `lifeline init` first")?;
            let record = PairingRecord::export(&identity, &vault)?;

            println!("{}", "Pairing Record".bold());
            println!();
            println!(
                "{}",
                "⚠️  Contains your secret key — share only with the person you are pairing with."
                    .bright_red()
                    .bold()
            );
            println!();
            println!("{}", record.to_json()?);
        }

        PairAction::Import { record, name } => {
            let contact = PairingRecord::from_json(&record)?.into_contact(name.clone(), &vault)?;
            let id = contact.id.clone();

            ContactStore::load(storage)?.add(contact)?;

            println!("{} Contact added:", "✓".green());
            println!("  Name: {}", name.bright_cyan());
            println!("  ID:   {}", id);
        }
    }

    Ok(())
}

async fn cmd_selftest() -> Result<()> {
    println!("{}", "Running self-tests...".bold());
    println!();

    // Broadcast sealing
    let key = generate_key();
    let frame = encrypt(b"lifeline self-test", &key)?;
    let plaintext = decrypt(&frame.to_bytes(), &key)?;
    anyhow::ensure!(plaintext == b"lifeline self-test");
    println!("{} Broadcast sealing round-trip", "✓".green());

    let wrong = generate_key();
    anyhow::ensure!(decrypt(&frame.to_bytes(), &wrong).is_err());
    println!("{} Wrong-key rejection", "✓".green());

    // Key vault
    let vault = KeyVault::ephemeral();
    let blob = vault.wrap(&key)?;
    let recovered = vault.unwrap(&blob).context("Vault unwrap failed")?;
    anyhow::ensure!(*recovered == *key);
    println!("{} Key vault round-trip", "✓".green());

    // Full engine against the loopback radio: a device paired with
    // itself hears its own SOS.
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let vault = KeyVault::open(&storage)?;
    let identity = IdentityStore::new(storage.clone()).load_or_generate(&vault)?;
    let record = PairingRecord::export(&identity, &vault)?;
    let contact = record.into_contact("Echo".into(), &vault)?;
    ContactStore::load(storage.clone())?.add(contact)?;

    let (engine, handle, mut events) = Engine::new(EngineConfig {
        storage,
        radio: Box::new(LoopbackRadio::new().with_echo()),
        position: Box::new(FixedPositionProvider {
            position: Position {
                latitude: 59.91,
                longitude: 10.75,
            },
        }),
    })?;
    let device_id = engine.device_id().to_string();
    let engine_task = tokio::spawn(engine.run());

    handle.start_sos();

    let heard = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(event) = events.recv().await {
            if let EngineEvent::MessageObserved {
                kind,
                sender_id,
                position,
                ..
            } = event
            {
                return kind == MessageKind::Sos && sender_id == device_id && position.is_some();
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    anyhow::ensure!(heard, "loopback broadcast was not heard");
    println!("{} Engine loopback broadcast", "✓".green());

    handle.shutdown();
    let _ = engine_task.await;

    println!();
    println!("{}", "All tests passed!".green().bold());

    Ok(())
}
