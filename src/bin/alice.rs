//! Alice's chat client entry point.

fn main() -> std::process::ExitCode {
    mininet_chat::cli::run_client("Alice", mininet_chat::topology::NodeName::Alice)
}
