//! L5: the chat application. Server, client, the priority-scheduled
//! sender shared by both, and the UI boundary.

pub mod client;
pub mod message;
pub mod priority;
pub mod server;
pub mod ui;
