//! AtlasOM CLI
//!
//! Inspection and maintenance commands against a running store.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use atlas_om::config::KeyLayout;
use atlas_om::{Config, KvClient, RedisClient, SchemaGenerator};

/// AtlasOM CLI
#[derive(Parser, Debug)]
#[command(name = "atlas-om-cli")]
#[command(about = "Inspect entities, indexes and schema markers in the store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    /// Database index selected after connecting
    #[arg(short, long, default_value = "0")]
    database: u32,

    /// Key namespace of schema markers
    #[arg(long, default_value = "schema")]
    schema_namespace: String,

    /// Key namespace of index sets
    #[arg(long, default_value = "idx")]
    index_namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server
    Ping,

    /// List schema markers
    Schemas,

    /// List identities indexed under a field value
    Lookup {
        /// Entity key prefix
        prefix: String,

        /// Indexed field name
        field: String,

        /// Stored field value
        value: String,
    },

    /// Print the hash fields of one record
    Show {
        /// Record key (`{prefix}:{id}`)
        key: String,
    },

    /// Remove every key from the selected database
    FlushAll {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlas_om=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> atlas_om::Result<()> {
    let config = Config::builder()
        .server_addr(&args.server)
        .database(args.database)
        .schema_namespace(&args.schema_namespace)
        .index_namespace(&args.index_namespace)
        .build();
    let layout = config.key_layout();

    tracing::debug!("Connecting to {}", config.server_addr);
    let client = RedisClient::connect(config)?;

    match args.command {
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }

        Commands::Schemas => {
            let schemas = SchemaGenerator::new(&client)
                .with_layout(layout)
                .list_schemas()?;
            if schemas.is_empty() {
                println!("(no schema markers)");
            }
            for schema in schemas {
                let indexes: Vec<String> = schema
                    .indexes
                    .iter()
                    .map(|i| if i.nullable { format!("{}?", i.field) } else { i.field.clone() })
                    .collect();
                let ttl = schema
                    .ttl_seconds
                    .map_or_else(|| "-".to_string(), |t| format!("{}s", t));
                println!(
                    "{:<24} {:<24} ttl={:<6} indexes=[{}]",
                    schema.prefix,
                    schema.type_name,
                    ttl,
                    indexes.join(", ")
                );
            }
        }

        Commands::Lookup {
            prefix,
            field,
            value,
        } => {
            let index_key = layout.index_key(&prefix, &field, Some(&value));
            let members = client.set_members(&index_key)?;
            if members.is_empty() {
                println!("(empty)");
            }
            for member in &members {
                let id = KeyLayout::identity_of(&prefix, member).unwrap_or(member);
                let marker = if client.exists(member)? { "" } else { "  (orphan)" };
                println!("{}{}", id, marker);
            }
        }

        Commands::Show { key } => {
            let fields = client.hash_get_all(&key)?;
            if fields.is_empty() {
                println!("(nil)");
            }
            for (name, value) in &fields {
                println!("{:<24} {}", name, String::from_utf8_lossy(value));
            }
        }

        Commands::FlushAll { yes } => {
            if !yes {
                return Err(atlas_om::OmError::Config(
                    "flush-all wipes the database; pass --yes to confirm".to_string(),
                ));
            }
            client.flush_all()?;
            println!("OK");
        }
    }

    Ok(())
}
