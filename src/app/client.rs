//! `Client`: UI bridge and background connect.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::address::VirtualAddress;
use crate::app::message::Message;
use crate::app::priority::PrioritySender;
use crate::app::ui::{Status, Ui, UiCommand};
use crate::errors::AppError;
use crate::transport::ReliableConnection;
use crate::transport::ReliableTransport;

/// Holds the UI handle plus whatever connection state exists so far.
/// While disconnected, outgoing actions are rejected rather than
/// buffered.
pub struct Client {
    local_name: String,
    transport: Arc<ReliableTransport>,
    ui: Arc<dyn Ui>,
    sender: Mutex<Option<Arc<PrioritySender>>>,
}

impl Client {
    pub fn new(local_name: impl Into<String>, transport: Arc<ReliableTransport>, ui: Arc<dyn Ui>) -> Arc<Self> {
        Arc::new(Client {
            local_name: local_name.into(),
            transport,
            ui,
            sender: Mutex::new(None),
        })
    }

    /// Spawns the background connect task and, once connected, the
    /// inbound reader task. Returns immediately so the caller can start
    /// the UI loop right away.
    pub fn spawn_connect(self: &Arc<Self>, server: VirtualAddress) {
        let client = self.clone();
        self.ui.set_status(Status::Connecting);
        thread::spawn(move || {
            let conn = client.transport.connect(server);
            let sender = PrioritySender::new(conn.clone(), client.transport.clone());
            *client.sender.lock().unwrap() = Some(sender);
            client.ui.set_status(Status::Connected);
            info!("client {}: connected", client.local_name);
            client.reader_loop(conn);
        });
    }

    fn reader_loop(self: Arc<Self>, conn: Arc<ReliableConnection>) {
        loop {
            let bytes = match conn.receive() {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.ui.set_status(Status::Disconnected);
                    debug!("client {}: reader loop exiting (connection closed)", self.local_name);
                    return;
                }
            };
            let message = match Message::from_bytes(&bytes) {
                Some(m) => m,
                None => {
                    warn!("client {}: dropping malformed application payload", self.local_name);
                    continue;
                }
            };
            if let Message::System { content, .. } = &message {
                if let Some(roster) = content.strip_prefix("roster:") {
                    let names: Vec<String> = roster.split(',').filter(|s| !s.is_empty()).map(String::from).collect();
                    self.ui.set_roster(&names);
                    continue;
                }
                if message.is_shutdown() {
                    info!("client {}: received shutdown, closing", self.local_name);
                    let _ = conn.close();
                    self.ui.set_status(Status::Disconnected);
                    return;
                }
            }
            if matches!(message, Message::File { .. }) {
                match save_incoming_file(&message) {
                    Ok(path) => debug!("client {}: saved incoming file to {}", self.local_name, path.display()),
                    Err(e) => warn!("client {}: failed to save incoming file: {}", self.local_name, e),
                }
            }
            self.ui.deliver(&message);
        }
    }

    /// Runs the UI command loop: drains `inbound` (fed by whichever UI
    /// implementation is attached) and turns each command into an
    /// outgoing send, until `UiCommand::Quit`.
    pub fn run_commands(self: &Arc<Self>, inbound: Receiver<UiCommand>) {
        for command in inbound {
            let result = match command {
                UiCommand::SendText { recipient, content } => self.send_text(&recipient, content),
                UiCommand::SendFile { recipient, path } => self.send_file(&recipient, &path),
                UiCommand::Quit => {
                    self.disconnect();
                    return;
                }
            };
            if let Err(e) = result {
                self.ui.deliver(&Message::system(&self.local_name, e.to_string(), now()));
            }
        }
    }

    pub fn send_text(&self, recipient: &str, content: String) -> Result<(), AppError> {
        let sender = self.sender.lock().unwrap();
        let sender = sender.as_ref().ok_or(AppError::NotConnected)?;
        sender.send(Message::Text {
            sender: self.local_name.clone(),
            recipient: recipient.to_owned(),
            timestamp: now(),
            content,
        });
        Ok(())
    }

    pub fn send_file(&self, recipient: &str, path: &std::path::Path) -> Result<(), AppError> {
        let sender = self.sender.lock().unwrap();
        let sender = sender.as_ref().ok_or(AppError::NotConnected)?;
        let bytes = std::fs::read(path).unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        let mime = mime_guess_from_extension(path);
        sender.send(Message::File {
            sender: self.local_name.clone(),
            recipient: recipient.to_owned(),
            timestamp: now(),
            size: bytes.len() as u64,
            name,
            mime,
            data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes),
        });
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(sender) = self.sender.lock().unwrap().take() {
            sender.shutdown();
        }
    }
}

/// Writes an inbound file message's bytes under
/// `downloads/<recipient>/<name>`, creating the directory idempotently.
pub fn save_incoming_file(message: &Message) -> std::io::Result<std::path::PathBuf> {
    let Message::File { recipient, name, data, .. } = message else {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file message"));
    };
    let dir = std::path::Path::new("downloads").join(recipient);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&path, bytes)?;
    Ok(path)
}

fn mime_guess_from_extension(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
    .to_owned()
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
    fn mime_guess_recognizes_common_extensions() {
        assert_eq!(mime_guess_from_extension(std::path::Path::new("a.png")), "image/png");
        assert_eq!(mime_guess_from_extension(std::path::Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn save_incoming_file_roundtrips_base64_payload() {
        let message = Message::File {
            sender: "Alice".into(),
            recipient: "test-recipient".into(),
            timestamp: 0,
            name: "hello.txt".into(),
            mime: "text/plain".into(),
            size: 5,
            data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"hello"),
        };
        let path = save_incoming_file(&message).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        let _ = std::fs::remove_dir_all(std::path::Path::new("downloads").join("test-recipient"));
    }
}
