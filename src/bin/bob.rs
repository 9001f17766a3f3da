//! Bob's chat client entry point.

fn main() -> std::process::ExitCode {
    mininet_chat::cli::run_client("Bob", mininet_chat::topology::NodeName::Bob)
}
