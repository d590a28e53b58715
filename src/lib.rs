//! Example host binary wiring: loads configuration, starts an AppleMIDI
//! session engine, and drives its tick loop until interrupted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, trace};

use rtp_midi_core::Config;
use rtp_midi_net::{SessionEngine, SystemClock};

/// Builds the session engine bound to `config`'s control port (the data
/// port, `control_port + 1`, is derived automatically by [`SessionEngine`]).
pub fn build_engine(config: &Config) -> Result<SessionEngine> {
    let control_addr: SocketAddr = format!("0.0.0.0:{}", config.control_port)
        .parse()
        .context("invalid control port")?;
    SessionEngine::new(
        config.local_name.clone(),
        control_addr,
        Box::new(SystemClock::new()),
        Duration::from_secs(config.resync_period_secs),
    )
    .map_err(Into::into)
}

/// Runs the tick loop until `running` is cleared (e.g. by a Ctrl-C handler).
/// Outgoing MIDI is queued directly on `engine` via `queue_outgoing` from
/// elsewhere (a UI thread, another tick source) between iterations; this
/// loop only drains it. Incoming MIDI is likewise drained here via
/// `pop_incoming` after each `tick_receive`.
pub fn run(mut engine: SessionEngine, config: &Config, running: Arc<AtomicBool>) -> Result<()> {
    info!("rtp-midi-host listening on control port {}", config.control_port);
    let mut timestamp: u32 = 0;
    while running.load(Ordering::SeqCst) {
        engine.tick_receive(config.tick_batch)?;
        while let Some(received) = engine.pop_incoming() {
            trace!("received {} command(s) from peer {:#010x}", received.commands.len(), received.peer_ssrc);
        }
        engine.tick_send(timestamp, config.send_batch)?;
        engine.tick_idle()?;
        timestamp = timestamp.wrapping_add((config.sample_rate_hz / 1000).max(1));
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}
