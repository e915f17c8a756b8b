//! Volair — bootstrap entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger at configured level
//!   4. Open config stores (server store seeded from env)
//!   5. Connect to the orchestration server, if one is configured
//!   6. Print status, close stores, exit

use tracing::info;

use volair::{
    Stores, VolairClient, config,
    error::AppError,
    logger,
    storage::ENV_KEYS,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level)?;

    info!(
        base_dir = %config.base_dir.display(),
        log_level = %config.log_level,
        "config loaded"
    );

    let stores = Stores::open(&config.base_dir)?;

    let mut seeded = 0;
    for key in ENV_KEYS {
        if stores.server.contains(key)? {
            seeded += 1;
        }
    }
    println!("✓ Stores ready: {} ({seeded}/{} credentials)", config.base_dir.display(), ENV_KEYS.len());

    let connected = match &config.client.server_url {
        Some(url) => VolairClient::builder(url.as_str())
            .options(config.client_options())
            .dev_server(config.dev_server())
            .connect()
            .map(Some),
        None => {
            info!("no server_url configured, skipping connection");
            Ok(None)
        }
    };

    if let Ok(Some(client)) = &connected {
        println!("✓ Connected: {} at {}", client.server_kind(), client.url());
    }

    // Close stores even when the connection failed.
    let closed = stores.close();
    connected?;
    closed
}
