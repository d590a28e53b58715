use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

use rtp_midi_core::Config;
use rtp_midi_toolkit::{build_engine, run};

fn main() {
    env_logger::init();

    let config = match Config::load_from_file("config.toml") {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load config.toml: {}", e);
            std::process::exit(1);
        }
    };
    info!("loaded config: {:?}", config);

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to start session engine: {}", e);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = running.clone();
    ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("failed to install Ctrl-C handler");

    if let Err(e) = run(engine, &config, running) {
        error!("session engine exited with error: {}", e);
        std::process::exit(1);
    }
}
