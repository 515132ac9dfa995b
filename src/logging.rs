//! Async logging channel.
//!
//! The core never calls a global logger directly: every component holds a
//! clone of a [`PrintSender`] and pushes [`Printout`] records onto it. One
//! print loop (spawned by the server shell) drains the channel and writes to
//! stdout. This mirrors the runtime-module convention used throughout the
//! teacher codebase this crate is grounded on, where modules like the kernel
//! event loop and the kv store both hold a `send_to_terminal: PrintSender`
//! and never touch the console directly.

use std::fmt;

pub type PrintSender = tokio::sync::mpsc::Sender<Printout>;
pub type PrintReceiver = tokio::sync::mpsc::Receiver<Printout>;

pub const PRINT_CHANNEL_CAPACITY: usize = 1_000;

/// `verbosity` 0 is always shown; higher numbers are progressively more
/// detailed debug output. The sink decides its own cutoff.
#[derive(Clone, Debug)]
pub struct Printout {
    pub verbosity: u8,
    pub content: String,
}

impl Printout {
    pub fn new(verbosity: u8, content: impl Into<String>) -> Self {
        Self {
            verbosity,
            content: content.into(),
        }
    }
}

impl fmt::Display for Printout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.verbosity, self.content)
    }
}

/// Send a [`Printout`] without blocking the caller on a full channel; drops
/// and counts toward nothing if the sink has gone away or is saturated. Used
/// at call sites that must never await inside a lock (see §5 of the spec:
/// fine-grained locks must never be held across blocking I/O).
pub fn log(sender: &PrintSender, verbosity: u8, content: impl Into<String>) {
    let _ = sender.try_send(Printout::new(verbosity, content));
}

/// Drains `rx` forever, writing formatted lines to stdout. `max_verbosity`
/// filters out anything noisier than the configured level (default 1).
pub async fn print_loop(mut rx: PrintReceiver, max_verbosity: u8) {
    while let Some(printout) = rx.recv().await {
        if printout.verbosity > max_verbosity {
            continue;
        }
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        println!("{now} {printout}");
    }
}

pub fn channel() -> (PrintSender, PrintReceiver) {
    tokio::sync::mpsc::channel(PRINT_CHANNEL_CAPACITY)
}
