use clap::Parser;
use policyaide_core::PolicyAideConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Explicit config path; skips the candidate-path search
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config — explicit path wins, otherwise walk the candidates
    let config = match &args.config {
        Some(path) => match PolicyAideConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => match PolicyAideConfig::discover() {
            Ok((c, path)) => {
                tracing::info!("Using config {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to locate a usable config: {}", e);
                std::process::exit(1);
            }
        },
    };

    // Connect to DB
    let pool = match policyaide_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match policyaide_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match policyaide_core::db::table_counts(&pool).await {
            Ok(c) => println!("✅ Telemetry tables: {} traces, {} spans", c.traces, c.spans),
            Err(e) => {
                println!("❌ Telemetry table check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ PolicyAide DB health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    policyaide_server::http::start_http_server(pool, config, tx.subscribe()).await?;

    Ok(())
}
