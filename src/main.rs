use clap::{Parser, Subcommand};
use layerstash::{
    GarbageCollector, ImageRecord, ImageService, RegistryAuth, DEFAULT_GC_INTERVAL,
};
use std::{path::PathBuf, process, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Local store for OCI/Docker container images.
#[derive(Parser)]
#[command(name = "layerstash", version)]
struct Args {
    /// Directory images are stored under
    #[arg(long)]
    root: Option<PathBuf>,

    /// Layer cache ceiling in bytes, 0 for unbounded
    #[arg(long)]
    cache_max_bytes: Option<i64>,

    /// Verify registry TLS certificates
    #[arg(long)]
    verify_tls: bool,

    /// Log filter, e.g. info or debug
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull an image and print its ID
    Pull {
        reference: String,
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
    },
    /// Remove a stored image
    Remove { reference: String },
    /// Show one stored image
    Status { reference: String },
    /// List all stored images
    List,
    /// Show filesystem information for the image store
    FsInfo,
    /// Run one garbage collection pass
    Gc,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.clone()),
    )
    .init();

    if let Err(err) = run(args).await {
        log::error!("{}", err);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), layerstash::ImageError> {
    let mut builder = ImageService::builder().verify_tls(args.verify_tls);
    if let Some(root) = &args.root {
        builder = builder.image_root(root);
    }
    if let Some(max_bytes) = args.cache_max_bytes {
        builder = builder.cache_max_bytes(max_bytes);
    }
    let service = builder.build().await?;

    // Interrupt aborts the operation at its next suspension point
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Pull {
            reference,
            username,
            password,
        } => {
            let auth = match (username, password) {
                (Some(username), Some(password)) => Some(RegistryAuth::new(username, password)),
                _ => None,
            };
            let id = service.pull_image(&reference, auth, &cancel).await?;
            println!("{}", id);
        }
        Command::Remove { reference } => {
            service.remove_image(&reference, &cancel).await?;
        }
        Command::Status { reference } => {
            print_record(&service.image_status(&reference).await?);
        }
        Command::List => {
            for record in service.list_images().await {
                print_record(&record);
            }
        }
        Command::FsInfo => {
            let info = service.image_fs_info();
            println!(
                "mountpoint={} used_bytes={} inodes_used={}",
                info.mountpoint.display(),
                info.used_bytes,
                info.inodes_used
            );
        }
        Command::Gc => {
            let gc = GarbageCollector::new(Arc::new(service), DEFAULT_GC_INTERVAL);
            gc.collect().await?;
            let stats = gc.stats();
            println!(
                "removed {} unreferenced layers ({} bytes)",
                stats.total_layers_removed, stats.last_collection_size
            );
        }
    }
    Ok(())
}

fn print_record(record: &ImageRecord) {
    println!(
        "{}\t{}\t{} bytes\t{} layers",
        record.id,
        record.repo_tags.join(","),
        record.size,
        record.layers.len()
    );
}
