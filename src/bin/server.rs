//! Chat server entry point: accepts connections, relays messages, and
//! drains in-flight sends on interrupt before exiting.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mininet_chat::app::server::Server;
use mininet_chat::bootstrap;
use mininet_chat::config::Config;
use mininet_chat::topology::NodeName;
use mininet_chat::transport::ReliableTransport;

fn main() -> ExitCode {
    env_logger::init();
    let config = Config::from_env();

    let network = match bootstrap::bootstrap_host(NodeName::Server, config) {
        Ok(n) => n,
        Err(e) => {
            log::error!("server: failed to bind: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let transport = Arc::new(ReliableTransport::new(NodeName::Server, network, config));
    let server = Arc::new(Server::new(transport));

    let accept_server = server.clone();
    thread::spawn(move || accept_server.run());

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    if ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)).is_err() {
        log::warn!("server: failed to install interrupt handler");
    }

    while !interrupted.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(50));
    }

    log::info!("server: interrupted, shutting down gracefully");
    server.shutdown();
    ExitCode::SUCCESS
}
