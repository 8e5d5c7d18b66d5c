use std::collections::HashMap;
use docstore::engine::Driver;
use docstore::{Filter, RecordReader, RecordSearcher, RecordWriter};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, env = "DOCSTORE_DATA_DIR", default_value = "data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Write { collection: String, id: String, value: String },
    Read { collection: String, id: String },
    ReadAll { collection: String },
    Delete { collection: String, id: String },
    DeleteAll { collection: String },
    /// Filter as JSON, e.g. '{"age": {"$gt": 30}}'
    Search { filter: String },
    /// Field patterns as JSON, e.g. '{"name": "^A"}'
    Regex { collection: String, patterns: String },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let db = Driver::open(&cli.data_dir)?;

    match cli.command {
        Commands::Write { collection, id, value } => {
            let val: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            db.write(&collection, &id, &val)?;
            println!("OK");
        }
        Commands::Read { collection, id } => {
            let val = db.read(&collection, &id)?;
            println!("{}", serde_json::to_string_pretty(&val)?);
        }
        Commands::ReadAll { collection } => {
            let list = db.read_all(&collection)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Commands::Delete { collection, id } => {
            db.delete(&collection, &id)?;
            println!("OK");
        }
        Commands::DeleteAll { collection } => {
            db.delete_all(&collection)?;
            println!("OK");
        }
        Commands::Search { filter } => {
            let filter: Filter = serde_json::from_str(&filter)?;
            let hits = db.search(&filter)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Regex { collection, patterns } => {
            let patterns: HashMap<String, String> = serde_json::from_str(&patterns)?;
            let list = db.regex_search(&collection, &patterns)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }

    Ok(())
}
