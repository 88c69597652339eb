/*!
Here we go!
*/
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;

use ecole::{config, inter};

static DEFAULT_CONFIG_PATH: &str = "ecole.toml";

/// First command-line argument, else `ECOLE_CONFIG`, else the default.
fn config_path() -> String {
    if let Some(path) = std::env::args().nth(1) {
        return path;
    }
    match std::env::var("ECOLE_CONFIG") {
        Ok(path) if !path.trim().is_empty() => path,
        _ => DEFAULT_CONFIG_PATH.to_owned(),
    }
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("ecole")
        .build();
    if let Err(e) = TermLogger::init(
        ecole::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    let path = config_path();
    let glob = match config::load_configuration(&path).await {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Error loading configuration from {:?}: {}", &path, &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;
    let static_dir = glob.static_dir.clone();
    let glob = Arc::new(RwLock::new(glob));

    let app = inter::router(glob, static_dir);

    log::info!("Listening on {}", &addr);

    if let Err(e) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        log::error!("Server error: {}", &e);
        std::process::exit(1);
    }
}
