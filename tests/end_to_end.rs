//! Full-stack scenarios running on the real fixed topology: a router, a
//! server, and two clients, all bound to their literal fixed loopback
//! ports. Kept as one test function since the topology is a closed set
//! of four ports: a second test binding the same ports concurrently
//! would fail to bind, not run a second scenario.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mininet_chat::address::VirtualAddress;
use mininet_chat::app::client::Client;
use mininet_chat::app::message::Message;
use mininet_chat::app::server::Server;
use mininet_chat::app::ui::{Status, Ui, UiCommand};
use mininet_chat::bootstrap::{bootstrap_host, bootstrap_router};
use mininet_chat::config::Config;
use mininet_chat::network::spawn_forwarding_loop;
use mininet_chat::topology::{NodeName, CHAT_SERVER_PORT};
use mininet_chat::transport::ReliableTransport;

/// A `Ui` test double that records everything delivered to it instead of
/// printing or drawing it.
struct RecordingUi {
    delivered: Mutex<Vec<Message>>,
    status: Mutex<Option<Status>>,
    roster: Mutex<Vec<String>>,
}

impl RecordingUi {
    fn new() -> Arc<Self> {
        Arc::new(RecordingUi {
            delivered: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            roster: Mutex::new(Vec::new()),
        })
    }
}

impl Ui for RecordingUi {
    fn deliver(&self, message: &Message) {
        self.delivered.lock().unwrap().push(message.clone());
    }

    fn set_status(&self, status: Status) {
        *self.status.lock().unwrap() = Some(status);
    }

    fn set_roster(&self, names: &[String]) {
        *self.roster.lock().unwrap() = names.to_vec();
    }

    fn prompt_for_file(&self) -> Option<PathBuf> {
        None
    }
}

/// Polls `predicate` for up to five seconds before giving up. Every
/// cross-node exchange in this test rides a real Stop-and-Wait round
/// trip plus the noiseless default config's ack timeout, so a fixed
/// sleep would either be needlessly slow or flaky.
fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn chat_round_trip_across_the_router_and_graceful_shutdown() {
    let _guard = SEQUENTIAL.lock().unwrap();
    let config = Config::default();

    let router_network = Arc::new(bootstrap_router(config).expect("router bind"));
    let (router_handle, router_stop) = spawn_forwarding_loop(router_network);

    let server_network = bootstrap_host(NodeName::Server, config).expect("server bind");
    let server_transport = Arc::new(ReliableTransport::new(NodeName::Server, server_network, config));
    let server = Arc::new(Server::new(server_transport.clone()));
    let server_runner = {
        let server = server.clone();
        thread::spawn(move || server.run())
    };

    let alice_network = bootstrap_host(NodeName::Alice, config).expect("alice bind");
    let alice_transport = Arc::new(ReliableTransport::new(NodeName::Alice, alice_network, config));
    let alice_ui = RecordingUi::new();
    let alice = Client::new("Alice", alice_transport, alice_ui.clone() as Arc<dyn Ui>);
    alice.spawn_connect(VirtualAddress::new(NodeName::Server.vip(), CHAT_SERVER_PORT));

    let bob_network = bootstrap_host(NodeName::Bob, config).expect("bob bind");
    let bob_transport = Arc::new(ReliableTransport::new(NodeName::Bob, bob_network, config));
    let bob_ui = RecordingUi::new();
    let bob = Client::new("Bob", bob_transport, bob_ui.clone() as Arc<dyn Ui>);
    bob.spawn_connect(VirtualAddress::new(NodeName::Server.vip(), CHAT_SERVER_PORT));

    assert!(
        wait_until(|| *alice_ui.status.lock().unwrap() == Some(Status::Connected)
            && *bob_ui.status.lock().unwrap() == Some(Status::Connected)),
        "both clients should reach the server through the router"
    );

    // Alice's first message registers her on the roster (server.rs's
    // first-message policy); only after that can Bob address her by name.
    alice.send_text("Bob", "hello from alice".to_owned()).unwrap();
    assert!(
        wait_until(|| bob_ui
            .delivered
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, Message::Text { content, .. } if content == "hello from alice"))),
        "bob should receive alice's text message via the router"
    );

    bob.send_text("Alice", "hello back".to_owned()).unwrap();
    assert!(
        wait_until(|| alice_ui
            .delivered
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, Message::Text { content, .. } if content == "hello back"))),
        "alice should receive bob's reply via the router"
    );

    // Both clients have now sent a real message and are on the roster;
    // each should have seen the other's join announcement at some point.
    assert!(wait_until(|| !alice_ui.roster.lock().unwrap().is_empty()
        || alice_ui
            .delivered
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, Message::System { content, .. } if content.starts_with("join:")))));

    server.shutdown();
    let _ = router_stop.send(());
    router_handle.join().unwrap();
    server_runner.join().unwrap();

    assert!(wait_until(|| *alice_ui.status.lock().unwrap() == Some(Status::Disconnected)));
    assert!(wait_until(|| *bob_ui.status.lock().unwrap() == Some(Status::Disconnected)));
}

#[test]
fn unregistered_recipient_gets_a_system_error_reply() {
    let config = Config::default();

    // Binds the same four fixed ports as the scenario above, and
    // `cargo test` runs both `#[test]` fns in this file concurrently by
    // default: serialize them so the second bind doesn't fail.
    let _guard = SEQUENTIAL.lock().unwrap();

    let router_network = Arc::new(bootstrap_router(config).expect("router bind"));
    let (router_handle, router_stop) = spawn_forwarding_loop(router_network);

    let server_network = bootstrap_host(NodeName::Server, config).expect("server bind");
    let server_transport = Arc::new(ReliableTransport::new(NodeName::Server, server_network, config));
    let server = Arc::new(Server::new(server_transport.clone()));
    let server_runner = {
        let server = server.clone();
        thread::spawn(move || server.run())
    };

    let alice_network = bootstrap_host(NodeName::Alice, config).expect("alice bind");
    let alice_transport = Arc::new(ReliableTransport::new(NodeName::Alice, alice_network, config));
    let alice_ui = RecordingUi::new();
    let alice = Client::new("Alice", alice_transport, alice_ui.clone() as Arc<dyn Ui>);
    alice.spawn_connect(VirtualAddress::new(NodeName::Server.vip(), CHAT_SERVER_PORT));

    assert!(wait_until(|| *alice_ui.status.lock().unwrap() == Some(Status::Connected)));

    alice.send_text("Carol", "is anyone there".to_owned()).unwrap();
    assert!(
        wait_until(|| alice_ui
            .delivered
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, Message::System { content, .. } if content.contains("Carol")))),
        "alice should be told Carol is not a known recipient"
    );

    server.shutdown();
    let _ = router_stop.send(());
    router_handle.join().unwrap();
    server_runner.join().unwrap();
}

static SEQUENTIAL: Mutex<()> = Mutex::new(());
