use std::sync::Arc;
use docstore::engine::{Driver, Options, Placement, ReplicatedDriver, ScanPolicy};
use docstore::server::Router;
use docstore::DocumentStore;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "DOCSTORE_DATA_DIR", default_value = "data")]
    data_dir: String,

    #[arg(short, long, env = "DOCSTORE_PORT", default_value = "6942")]
    port: String,

    /// Comma-separated node labels; enables the replicated layout.
    #[arg(short, long, env = "DOCSTORE_NODES", value_delimiter = ',')]
    nodes: Vec<String>,

    /// Seed for primary-node selection.
    #[arg(long, env = "DOCSTORE_SEED")]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value = "replicate")]
    placement: PlacementArg,

    /// Skip malformed records in read-all and search instead of failing.
    #[arg(long)]
    lenient: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PlacementArg {
    Replicate,
    Partition,
}

impl From<PlacementArg> for Placement {
    fn from(arg: PlacementArg) -> Self {
        match arg {
            PlacementArg::Replicate => Placement::Replicate,
            PlacementArg::Partition => Placement::Partition,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let options = Options {
        bulk_policy: if args.lenient { ScanPolicy::Skip } else { ScanPolicy::FailFast },
        placement: args.placement.into(),
        seed: args.seed,
        ..Options::default()
    };

    let store: Arc<dyn DocumentStore> = if args.nodes.is_empty() {
        println!("Starting Docstore on {} (single node)...", args.data_dir);
        Arc::new(Driver::new(&args.data_dir, options)?)
    } else {
        println!("Starting Docstore on {} across nodes {:?}...", args.data_dir, args.nodes);
        Arc::new(ReplicatedDriver::new(&args.data_dir, args.nodes.clone(), options)?)
    };

    let router = Router::new(store);
    println!("Docstore listening on :{} (TCP)", args.port);

    tokio::select! {
        res = router.listen(&args.port) => {
            if let Err(e) = res {
                eprintln!("TCP Server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutdown signal received. Exiting.");
        }
    }

    Ok(())
}
