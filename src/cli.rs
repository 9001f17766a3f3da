//! Shared body of the two chat-client CLI entry points: both `alice` and
//! `bob` differ only in which fixed node they bind to, so the actual
//! wiring lives here once.

use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use crate::address::VirtualAddress;
use crate::app::client::Client;
use crate::app::ui::select_ui;
use crate::bootstrap;
use crate::config::Config;
use crate::topology::{NodeName, CHAT_SERVER_PORT};
use crate::transport::ReliableTransport;

#[derive(Parser)]
#[command(about = "mininet-chat client")]
struct Args {
    /// Force the graphical UI even when an interactive terminal is attached.
    #[arg(long)]
    gui: bool,
}

/// Runs a chat client bound to `node` and identified to the server as
/// `local_name`. Launches the UI immediately and connects to the server
/// in the background.
pub fn run_client(local_name: &str, node: NodeName) -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let config = Config::from_env();

    let network = match bootstrap::bootstrap_host(node, config) {
        Ok(n) => n,
        Err(e) => {
            log::error!("{}: failed to bind: {}", local_name, e);
            return ExitCode::FAILURE;
        }
    };
    let transport = Arc::new(ReliableTransport::new(node, network, config));

    let (command_tx, command_rx) = mpsc::channel();
    let ui_handle = select_ui(args.gui, command_tx);
    let client = Client::new(local_name, transport, ui_handle.ui());

    client.spawn_connect(VirtualAddress::new(NodeName::Server.vip(), CHAT_SERVER_PORT));

    let command_client = client.clone();
    thread::spawn(move || command_client.run_commands(command_rx));

    // The UI owns the blocking event loop (stdin reads, or the eframe
    // window) on this thread; it quits by dropping `command_tx`, which
    // ends `run_commands` on the background thread above.
    ui_handle.run();
    ExitCode::SUCCESS
}
