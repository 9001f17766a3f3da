//! `Server`: accept loop, roster, relay, graceful shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::app::message::{Message, SHUTDOWN_SENTINEL};
use crate::app::priority::PrioritySender;
use crate::errors::AppError;
use crate::transport::ReliableConnection;
use crate::transport::ReliableTransport;

struct Peer {
    sender: Arc<PrioritySender>,
}

/// Relays messages between attached clients, keyed by the name each peer
/// announces in the `sender` field of its first outgoing message. A
/// client that never sends anything is never attached to the roster:
/// this is the deterministic policy chosen for the otherwise-unspecified
/// "how does the server learn a peer's name" question.
pub struct Server {
    transport: Arc<ReliableTransport>,
    roster: Arc<Mutex<HashMap<String, Peer>>>,
    active_readers: Arc<(Mutex<usize>, Condvar)>,
}

impl Server {
    pub fn new(transport: Arc<ReliableTransport>) -> Self {
        Server {
            transport,
            roster: Arc::new(Mutex::new(HashMap::new())),
            active_readers: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Runs the accept loop until the transport is shut down, spawning one
    /// reader task per new connection. Blocks the calling thread; run it
    /// on its own thread to overlap with a shutdown signal handler.
    pub fn run(&self) {
        loop {
            let conn = match self.transport.accept() {
                Ok(conn) => conn,
                Err(_) => {
                    info!("server: transport shut down, accept loop exiting");
                    return;
                }
            };
            self.spawn_reader(conn);
        }
    }

    fn spawn_reader(&self, conn: Arc<ReliableConnection>) {
        let transport = self.transport.clone();
        let roster = self.roster.clone();
        let active_readers = self.active_readers.clone();
        {
            let (count, _) = &*active_readers;
            *count.lock().unwrap() += 1;
        }
        thread::spawn(move || {
            Self::reader_loop(conn, transport, roster, active_readers);
        });
    }

    fn reader_loop(
        conn: Arc<ReliableConnection>,
        transport: Arc<ReliableTransport>,
        roster: Arc<Mutex<HashMap<String, Peer>>>,
        active_readers: Arc<(Mutex<usize>, Condvar)>,
    ) {
        let mut attached_as: Option<String> = None;
        loop {
            let bytes = match conn.receive() {
                Ok(bytes) => bytes,
                Err(_) => {
                    if let Some(name) = &attached_as {
                        Self::detach(name, &roster);
                    }
                    let (count, condvar) = &*active_readers;
                    *count.lock().unwrap() -= 1;
                    condvar.notify_all();
                    return;
                }
            };
            let message = match Message::from_bytes(&bytes) {
                Some(m) => m,
                None => {
                    warn!("server: dropping malformed application payload");
                    continue;
                }
            };
            if attached_as.is_none() {
                if let Some(name) = message.sender() {
                    let name = name.to_owned();
                    Self::attach(&name, conn.clone(), &transport, &roster);
                    attached_as = Some(name);
                }
            }
            if let Err(e) = Self::relay(&message, &roster) {
                if let Some(name) = message.sender() {
                    Self::tell(&roster, name, &e.to_string());
                }
            }
        }
    }

    fn attach(
        name: &str,
        conn: Arc<ReliableConnection>,
        transport: &Arc<ReliableTransport>,
        roster: &Mutex<HashMap<String, Peer>>,
    ) {
        let sender = PrioritySender::new(conn, transport.clone());
        let names: Vec<String> = {
            let mut roster = roster.lock().unwrap();
            let names: Vec<String> = roster.keys().cloned().collect();
            roster.insert(name.to_owned(), Peer { sender: sender.clone() });
            names
        };
        debug!("server: {} attached", name);
        sender.send(Message::system(name, format!("roster:{}", names.join(",")), now()));
        Self::broadcast_except(roster, name, &format!("join:{}", name));
    }

    fn detach(name: &str, roster: &Mutex<HashMap<String, Peer>>) {
        let removed = roster.lock().unwrap().remove(name);
        if let Some(peer) = removed {
            peer.sender.shutdown();
            debug!("server: {} detached", name);
            Self::broadcast_except(roster, name, &format!("leave:{}", name));
        }
    }

    fn relay(message: &Message, roster: &Mutex<HashMap<String, Peer>>) -> Result<(), AppError> {
        match message {
            Message::System { .. } => Ok(()),
            _ => {
                let recipient = message.recipient();
                let roster = roster.lock().unwrap();
                match roster.get(recipient) {
                    Some(peer) => {
                        peer.sender.send(message.clone());
                        Ok(())
                    }
                    None => Err(AppError::UnknownRecipient(recipient.to_owned())),
                }
            }
        }
    }

    fn tell(roster: &Mutex<HashMap<String, Peer>>, name: &str, text: &str) {
        if let Some(peer) = roster.lock().unwrap().get(name) {
            peer.sender.send(Message::system(name, text, now()));
        }
    }

    fn broadcast_except(roster: &Mutex<HashMap<String, Peer>>, except: &str, content: &str) {
        let roster = roster.lock().unwrap();
        for (name, peer) in roster.iter() {
            if name != except {
                peer.sender.send(Message::system(name, content, now()));
            }
        }
    }

    /// Sends `__SHUTDOWN__` to every attached peer, then waits for every
    /// reader task to observe that peer's FIN before tearing down the
    /// transport: in-flight sends are drained, not aborted.
    pub fn shutdown(&self) {
        info!("server: broadcasting shutdown to {} peer(s)", self.roster.lock().unwrap().len());
        {
            let roster = self.roster.lock().unwrap();
            for (name, peer) in roster.iter() {
                peer.sender.send(Message::system(name, SHUTDOWN_SENTINEL, now()));
            }
        }
        let (count, condvar) = &*self.active_readers;
        let mut guard = count.lock().unwrap();
        while *guard > 0 {
            guard = condvar.wait(guard).unwrap();
        }
        drop(guard);
        self.transport.shutdown();
        info!("server: all peers detached, shutdown complete");
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_to_unknown_recipient_is_an_error() {
        let roster: Mutex<HashMap<String, Peer>> = Mutex::new(HashMap::new());
        let message = Message::Text {
            sender: "Alice".into(),
            recipient: "Carol".into(),
            timestamp: 0,
            content: "hi".into(),
        };
        let result = Server::relay(&message, &roster);
        assert!(matches!(result, Err(AppError::UnknownRecipient(name)) if name == "Carol"));
    }

    #[test]
    fn system_messages_are_never_relayed() {
        let roster: Mutex<HashMap<String, Peer>> = Mutex::new(HashMap::new());
        let message = Message::system("Bob", "join:Alice", 0);
        assert!(Server::relay(&message, &roster).is_ok());
    }
}
