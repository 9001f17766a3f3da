//! Router entry point: no positional arguments, no UI, forwards packets
//! between the three hosts until interrupted.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mininet_chat::bootstrap;
use mininet_chat::config::Config;
use mininet_chat::network::spawn_forwarding_loop;

fn main() -> ExitCode {
    env_logger::init();
    let config = Config::from_env();

    let router = match bootstrap::bootstrap_router(config) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            log::error!("router: failed to bind: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (forward_handle, stop_tx) = spawn_forwarding_loop(router);

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    if ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)).is_err() {
        log::warn!("router: failed to install interrupt handler");
    }

    while !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    log::info!("router: interrupted, shutting down");
    let _ = stop_tx.send(());
    let _ = forward_handle.join();
    ExitCode::SUCCESS
}
