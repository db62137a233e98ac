use async_delete::adapters::{load_snapshot, save_snapshot};
use async_delete::domain::model::ResourceKey;
use async_delete::utils::logger;
use async_delete::{enqueue_deletion, InMemoryRegistry, LocalStorage, SystemClock};
use clap::Parser;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "enqueue_delete")]
#[command(about = "Marks a contact or host PENDING_DELETE and queues its async deletion")]
struct Args {
    /// Resource key, e.g. contact/C123-ROID or host/H1-ROID
    #[arg(long)]
    resource_key: String,

    #[arg(long)]
    client_id: String,

    #[arg(long)]
    superuser: bool,

    #[arg(long, default_value = "registry.json")]
    state_file: String,

    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let key: ResourceKey = match args.resource_key.parse() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let storage = LocalStorage::new(".");
    let snapshot = load_snapshot(&storage, &args.state_file).await?;
    let registry = InMemoryRegistry::from_snapshot(snapshot, Arc::new(SystemClock));

    match enqueue_deletion(&registry, &key, &args.client_id, args.superuser).await {
        Ok(task) => {
            save_snapshot(&storage, &args.state_file, &registry.snapshot().await).await?;
            println!("✅ Enqueued {} as task {}", key, task.name);
        }
        Err(e) => {
            tracing::error!("❌ Could not enqueue deletion of {}: {}", key, e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(2);
        }
    }

    Ok(())
}
