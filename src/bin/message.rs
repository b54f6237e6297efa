//! Schema Message CLI
//!
//! Fingerprints schemas, registers them in the configured store, and inspects
//! encoded messages.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use familiar_codec::{CodecConfig, FingerprintAlgorithm, MessageDecoder, MessageHeader, Schema, SchemaEntry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-message")]
#[command(about = "Fingerprint schemas and inspect single-object messages")]
struct Cli {
    /// Config file (defaults to codec.toml and friends)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical form and fingerprint of a schema file
    Fingerprint {
        /// Schema file (JSON)
        schema: PathBuf,
        /// Digest algorithm: rabin, md5 or sha256
        #[arg(short, long, default_value = "rabin")]
        algorithm: FingerprintAlgorithm,
    },

    /// Add a schema file to the configured store
    Register {
        /// Schema file (JSON)
        schema: PathBuf,
    },

    /// Show the header of a message and decode it with its writer schema
    Inspect {
        /// Encoded message
        message: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CodecConfig::load_from(cli.config.as_deref().and_then(Path::to_str))
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Fingerprint { schema, algorithm } => {
            let entry = load_schema(&schema)?;
            println!("{}", entry.canonical_form());
            println!("{:?} {}", algorithm, entry.fingerprint(algorithm));
            Ok(())
        }

        Commands::Register { schema } => {
            let entry = load_schema(&schema)?;
            let store = config.open_store()?;
            let fingerprint = store.add(entry.clone())?;
            println!("Registered {} as {}", entry.full_name(), fingerprint);
            Ok(())
        }

        Commands::Inspect { message } => {
            let bytes = fs::read(&message).with_context(|| format!("failed to read {}", message.display()))?;
            let header = MessageHeader::parse(&bytes)?;
            println!("Header:  {}", header);
            println!("Payload: {} bytes", bytes.len() - familiar_codec::message::HEADER_LEN);

            let store = config.open_store()?;
            let Some(writer) = store.find(&header.fingerprint())? else {
                bail!("no schema registered for fingerprint {}", header.fingerprint());
            };
            println!("Writer:  {}", writer.full_name());

            let value = MessageDecoder::new(writer).with_limits(config.decoder.limits()).decode(&bytes)?;
            println!("{:#?}", value);
            Ok(())
        }
    }
}

fn load_schema(path: &Path) -> anyhow::Result<SchemaEntry> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let schema: Schema =
        serde_json::from_str(&content).with_context(|| format!("failed to parse schema in {}", path.display()))?;
    Ok(SchemaEntry::new(schema)?)
}
