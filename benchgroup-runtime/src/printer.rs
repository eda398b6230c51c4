//! Output sinks for the live result table.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Somewhere to draw a block of text that gets redrawn in place.
pub trait Printer: Send + Sync {
    /// Print `text` permanently, above the block being replaced.
    fn append(&self, text: &str);

    /// Overwrite the previously replaced block with `text`.
    fn replace(&self, text: &str);

    /// Leave the last block where it is.
    fn finish(&self) {}
}

/// Draws the block on stdout.
///
/// On a terminal the block is redrawn in place. Otherwise only the last block
/// is printed, once [`Printer::finish`] is called.
pub struct ConsolePrinter {
    bar: ProgressBar,
    interactive: bool,
    last: Mutex<Option<String>>,
}

impl ConsolePrinter {
    pub fn new() -> Self {
        let interactive = std::io::stdout().is_terminal();
        let target = if interactive {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };

        let bar = ProgressBar::with_draw_target(None, target);
        let style = ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);

        Self {
            bar,
            interactive,
            last: Mutex::new(None),
        }
    }
}

impl Default for ConsolePrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer for ConsolePrinter {
    fn append(&self, text: &str) {
        if self.interactive {
            self.bar.println(text);
        } else {
            println!("{}", text);
        }
    }

    fn replace(&self, text: &str) {
        if self.interactive {
            self.bar.set_message(text.to_string());
        } else {
            *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());
        }
    }

    fn finish(&self) {
        if self.interactive {
            self.bar.finish();
        } else if let Some(text) = self.last.lock().unwrap_or_else(PoisonError::into_inner).take() {
            println!("{}", text);
        }
    }
}

/// Keeps everything it is given; for tests and embedders that render elsewhere.
#[derive(Debug, Default)]
pub struct MemoryPrinter {
    frames: Mutex<Vec<String>>,
    appended: Mutex<Vec<String>>,
    finished: AtomicBool,
}

impl MemoryPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every replaced block, oldest first
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last_frame(&self) -> Option<String> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn appended(&self) -> Vec<String> {
        self.appended.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Printer for MemoryPrinter {
    fn append(&self, text: &str) {
        self.appended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }

    fn replace(&self, text: &str) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
