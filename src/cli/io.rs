//! Interactive prompt helpers
//!
//! Every prompt is a bounded wait: a reader thread feeds a channel and
//! the caller gives up at the deadline. There are no unbounded reads.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::restore::{Confirmation, Confirmer};

/// Read one line from stdin, or None at the deadline.
pub fn read_line_with_timeout(timeout: Duration) -> Option<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = tx.send(line);
        }
    });
    rx.recv_timeout(timeout).ok()
}

/// Prompt for a line with a deadline. Returns None on timeout.
pub fn prompt_line(prompt: &str, timeout: Duration) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    read_line_with_timeout(timeout).map(|line| line.trim().to_string())
}

/// Stdin-backed confirmation with a deadline
pub struct StdinConfirmer {
    pub auto_confirm: bool,
    pub timeout_secs: u64,
}

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> Confirmation {
        if self.auto_confirm {
            return Confirmation::Yes;
        }
        match prompt_line(prompt, Duration::from_secs(self.timeout_secs)) {
            None => Confirmation::TimedOut,
            Some(answer) => match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => Confirmation::Yes,
                _ => Confirmation::No,
            },
        }
    }
}
