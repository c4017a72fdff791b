use std::sync::Arc;

use tracing::{error, info};

use chatrelay::{BroadcastEngine, ChatHub, ChatServer, Config};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            if let Err(e) = config.apply_env_overrides() {
                eprintln!("Ignoring environment overrides: {e}");
            }
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = chatrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        chatrelay::logging::init_console_only(&config.logging.level);
    }

    info!("chatrelay starting");

    let engine = Arc::new(BroadcastEngine::new(
        Arc::new(ChatHub::new()),
        config.chat.clone(),
    ));

    if config.web.enabled {
        let web_config = config.web.clone();
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(e) = chatrelay::web::serve(&web_config, engine).await {
                error!("WebSocket endpoint stopped: {}", e);
            }
        });
    }

    let server = match ChatServer::bind(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", config.server.host, config.server.port, e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run(engine) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }
}
