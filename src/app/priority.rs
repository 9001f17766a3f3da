//! `PrioritySender`: priority-scheduled sender over one connection,
//! preventing a file transfer from head-of-line-blocking chat text or
//! system messages.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, warn};

use crate::app::message::Message;
use crate::transport::{ReliableConnection, ReliableTransport};

struct QueuedMessage {
    priority: u8,
    arrival: usize,
    message: Message,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival == other.arrival
    }
}
impl Eq for QueuedMessage {}

impl Ord for QueuedMessage {
    /// `BinaryHeap` is a max-heap; reverse both fields so the lowest
    /// priority number (system < text < file) and, within a priority
    /// level, the earliest arrival sort to the top (FIFO within a
    /// priority level).
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}
impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Wraps a single connection with a many-producer / single-consumer
/// priority queue and a dedicated worker thread. Priority is evaluated
/// only between whole messages: once the worker has started sending a
/// chunked message, it runs to completion before the next pop.
pub struct PrioritySender {
    connection: Arc<ReliableConnection>,
    transport: Arc<ReliableTransport>,
    queue: Arc<(Mutex<BinaryHeap<QueuedMessage>>, Condvar)>,
    next_arrival: AtomicUsize,
    stopped: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PrioritySender {
    pub fn new(connection: Arc<ReliableConnection>, transport: Arc<ReliableTransport>) -> Arc<Self> {
        let sender = Arc::new(PrioritySender {
            connection,
            transport,
            queue: Arc::new((Mutex::new(BinaryHeap::new()), Condvar::new())),
            next_arrival: AtomicUsize::new(0),
            stopped: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        });
        let worker_sender = sender.clone();
        let handle = thread::spawn(move || worker_sender.worker_loop());
        *sender.worker.lock().unwrap() = Some(handle);
        sender
    }

    /// Enqueues `message` at its inherent priority.
    pub fn send(&self, message: Message) {
        let arrival = self.next_arrival.fetch_add(1, AtomicOrdering::SeqCst);
        let queued = QueuedMessage {
            priority: message.priority(),
            arrival,
            message,
        };
        let (queue, condvar) = &*self.queue;
        queue.lock().unwrap().push(queued);
        condvar.notify_one();
    }

    fn worker_loop(&self) {
        let (queue, condvar) = &*self.queue;
        loop {
            let mut guard = queue.lock().unwrap();
            while guard.is_empty() && !self.stopped.load(AtomicOrdering::SeqCst) {
                guard = condvar.wait(guard).unwrap();
            }
            let next = guard.pop();
            drop(guard);

            let Some(queued) = next else {
                if self.stopped.load(AtomicOrdering::SeqCst) {
                    return;
                }
                continue;
            };

            let bytes = queued.message.to_bytes();
            debug!(
                "priority sender: sending priority {} message ({} bytes)",
                queued.priority,
                bytes.len()
            );
            if let Err(e) = self.connection.send(&bytes) {
                warn!("priority sender: send failed, stopping worker: {}", e);
                self.transport.forget(self.connection.key());
                return;
            }
        }
    }

    /// Stops the worker thread once its current send (if any) completes
    /// and the queue drains; in-flight sends are not aborted.
    pub fn shutdown(&self) {
        self.stopped.store(true, AtomicOrdering::SeqCst);
        let (_queue, condvar) = &*self.queue;
        condvar.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_messages_order_by_priority_then_arrival() {
        let mut heap = BinaryHeap::new();
        heap.push(QueuedMessage {
            priority: 2,
            arrival: 0,
            message: Message::system("x", "file-stand-in", 0),
        });
        heap.push(QueuedMessage {
            priority: 1,
            arrival: 1,
            message: Message::system("x", "text-stand-in", 0),
        });
        heap.push(QueuedMessage {
            priority: 0,
            arrival: 2,
            message: Message::system("x", "system-stand-in", 0),
        });

        let order: Vec<u8> = std::iter::from_fn(|| heap.pop().map(|q| q.priority)).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn fifo_within_same_priority_level() {
        let mut heap = BinaryHeap::new();
        for arrival in 0..3 {
            heap.push(QueuedMessage {
                priority: 1,
                arrival,
                message: Message::system("x", format!("msg-{arrival}"), 0),
            });
        }
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|q| q.arrival)).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
