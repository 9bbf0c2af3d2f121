//! Scoped teardown of locks, stages, and partial state
//!
//! A `CleanupStack` is installed before any resource acquisition. Every
//! acquired resource registers a finaliser; finalisers run in LIFO order
//! when the stack is run explicitly or dropped, so unwinding on any exit
//! path (normal return, error, panic) tears resources down in reverse
//! acquisition order.
//!
//! Running the stack twice is safe: each finaliser runs at most once, and
//! finalisers themselves tolerate already-removed artefacts.

use std::fs;
use std::path::{Path, PathBuf};

/// LIFO stack of cleanup actions
#[derive(Default)]
pub struct CleanupStack {
    finalizers: Vec<Option<Box<dyn FnOnce()>>>,
}

impl CleanupStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a finaliser. It runs once, in LIFO order.
    pub fn register<F: FnOnce() + 'static>(&mut self, f: F) {
        self.finalizers.push(Some(Box::new(f)));
    }

    /// Register removal of a directory tree authored by this process.
    pub fn register_tree_removal(&mut self, path: &Path) {
        let path: PathBuf = path.to_path_buf();
        self.register(move || remove_tree_best_effort(&path));
    }

    /// Run all pending finalisers, newest first. Idempotent.
    pub fn run(&mut self) {
        while let Some(slot) = self.finalizers.pop() {
            if let Some(f) = slot {
                f();
            }
        }
    }

    /// Number of finalisers still pending
    pub fn pending(&self) -> usize {
        self.finalizers.len()
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.run();
    }
}

/// Remove a directory tree, tolerating its absence.
///
/// Cleanup runs on error paths where the artefact may never have been
/// created, or may have been renamed away already.
pub fn remove_tree_best_effort(path: &Path) {
    if path.exists() {
        let _ = fs::remove_dir_all(path);
    }
}
