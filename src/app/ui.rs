//! The UI capability set: a small polymorphic interface with two
//! implementations, modeled as a trait object rather than a tagged
//! variant since each implementation owns real resources (a terminal
//! thread, an `eframe` window).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use is_terminal::IsTerminal;

use crate::app::message::Message;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connecting,
    Connected,
    Disconnected,
}

/// Capability set exposed to the application core: deliver an inbound
/// message, report connection status, report the current roster, and
/// prompt for a file to send. Implementations must not block the caller
/// for longer than rendering one update.
pub trait Ui: Send + Sync {
    fn deliver(&self, message: &Message);
    fn set_status(&self, status: Status);
    fn set_roster(&self, names: &[String]);
    /// Returns the path of a file the user picked to send, if any.
    fn prompt_for_file(&self) -> Option<PathBuf>;
}

/// Owns whichever concrete UI was selected, so the caller can both hand
/// out the `Ui` trait object the application core talks to and later
/// start the UI's own blocking run loop on a thread of its choosing.
pub enum UiHandle {
    Terminal(Arc<TerminalUi>),
    Graphical(Arc<GraphicalUi>),
}

impl UiHandle {
    pub fn ui(&self) -> Arc<dyn Ui> {
        match self {
            UiHandle::Terminal(t) => t.clone(),
            UiHandle::Graphical(g) => g.clone(),
        }
    }

    /// Runs the UI's blocking event loop until the user quits.
    pub fn run(self) {
        match self {
            UiHandle::Terminal(t) => t.run(),
            UiHandle::Graphical(g) => g.run(),
        }
    }
}

/// Selection rule: graphical unless an interactive terminal is attached
/// and `--gui` was not passed.
pub fn select_ui(force_gui: bool, outbound: Sender<UiCommand>) -> UiHandle {
    if force_gui || !io::stdout().is_terminal() {
        UiHandle::Graphical(Arc::new(GraphicalUi::new(outbound)))
    } else {
        UiHandle::Terminal(Arc::new(TerminalUi::new(outbound)))
    }
}

/// A user-initiated action, reported from the UI back to the client core.
pub enum UiCommand {
    SendText { recipient: String, content: String },
    SendFile { recipient: String, path: PathBuf },
    Quit,
}

/// Line-oriented terminal UI: each inbound message is printed, status
/// changes are printed as a bracketed banner.
pub struct TerminalUi {
    outbound: Sender<UiCommand>,
}

impl TerminalUi {
    pub fn new(outbound: Sender<UiCommand>) -> Self {
        TerminalUi { outbound }
    }

    /// Runs the blocking stdin read loop. Intended to be the body of the
    /// UI thread; parses lines of the form `/to:<name> <text>` and
    /// `/file:<name> [path]`. When `/file:<name>` is given with no path,
    /// prompts for one on a second line instead of doing nothing.
    pub fn run(&self) {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
                let _ = self.outbound.send(UiCommand::Quit);
                return;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("/file:") {
                let (recipient, path) = match rest.split_once(' ') {
                    Some((recipient, path)) => (recipient.to_owned(), Some(PathBuf::from(path))),
                    None => (rest.to_owned(), self.prompt_for_file()),
                };
                if let Some(path) = path {
                    let _ = self.outbound.send(UiCommand::SendFile { recipient, path });
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("/to:") {
                if let Some((recipient, content)) = rest.split_once(' ') {
                    let _ = self.outbound.send(UiCommand::SendText {
                        recipient: recipient.to_owned(),
                        content: content.to_owned(),
                    });
                }
            }
        }
    }
}

impl Ui for TerminalUi {
    fn deliver(&self, message: &Message) {
        match message {
            Message::Text { sender, content, .. } => println!("{}: {}", sender, content),
            Message::File { sender, name, .. } => println!("{} sent a file: {}", sender, name),
            Message::System { content, .. } => println!("[system] {}", content),
        }
        let _ = io::stdout().flush();
    }

    fn set_status(&self, status: Status) {
        println!("[status] {:?}", status);
    }

    fn set_roster(&self, names: &[String]) {
        println!("[roster] {}", names.join(", "));
    }

    /// Asks the user for a path on a second stdin line, since a terminal
    /// has no file picker to open.
    fn prompt_for_file(&self) -> Option<PathBuf> {
        println!("path to file: ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
            return None;
        }
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(PathBuf::from(line))
        }
    }
}

/// Graphical UI built on `eframe`/`egui`. Rendering state lives behind a
/// mutex shared with the `eframe::App` impl that actually draws the
/// window; this struct is the handle the client core talks to.
pub struct GraphicalUi {
    outbound: Sender<UiCommand>,
    state: std::sync::Mutex<GraphicalState>,
}

#[derive(Default)]
struct GraphicalState {
    log: Vec<String>,
    roster: Vec<String>,
    status: Option<Status>,
}

impl GraphicalUi {
    pub fn new(outbound: Sender<UiCommand>) -> Self {
        GraphicalUi {
            outbound,
            state: std::sync::Mutex::new(GraphicalState::default()),
        }
    }

    /// Blocks for the lifetime of the window: the GUI owns its own event
    /// loop on the thread that runs it, distinct from the client's
    /// reader/connect tasks.
    pub fn run(self: std::sync::Arc<Self>) {
        let options = eframe::NativeOptions::default();
        let _ = eframe::run_native(
            "mininet-chat",
            options,
            Box::new(move |_cc| Ok(Box::new(EframeBridge { ui: self }))),
        );
    }
}

impl Ui for GraphicalUi {
    fn deliver(&self, message: &Message) {
        let line = match message {
            Message::Text { sender, content, .. } => format!("{}: {}", sender, content),
            Message::File { sender, name, .. } => format!("{} sent a file: {}", sender, name),
            Message::System { content, .. } => format!("[system] {}", content),
        };
        self.state.lock().unwrap().log.push(line);
    }

    fn set_status(&self, status: Status) {
        self.state.lock().unwrap().status = Some(status);
    }

    fn set_roster(&self, names: &[String]) {
        self.state.lock().unwrap().roster = names.to_vec();
    }

    /// No native file-picker dependency is bundled with the graphical UI
    /// yet, so this is a deliberate no-op rather than a fake prompt.
    fn prompt_for_file(&self) -> Option<PathBuf> {
        None
    }
}

struct EframeBridge {
    ui: std::sync::Arc<GraphicalUi>,
}

impl eframe::App for EframeBridge {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let state = self.ui.state.lock().unwrap();
            if let Some(status) = state.status {
                ui.label(format!("status: {:?}", status));
            }
            ui.label(format!("roster: {}", state.roster.join(", ")));
            ui.separator();
            for line in &state.log {
                ui.label(line);
            }
        });
        ctx.request_repaint_after(std::time::Duration::from_millis(200));
    }
}
