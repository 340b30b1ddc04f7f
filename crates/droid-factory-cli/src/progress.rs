//! Spinner and Ctrl-C handling

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Exit code after a user interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Spinner shown while the marketplace loads and plugins are scanned.
/// Hidden in debug mode so log lines are not interleaved with redraws.
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn start(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Exit with [`INTERRUPTED_EXIT_CODE`] on Ctrl-C, clearing the spinner first.
///
/// The blocking HTTP client owns the main thread, so the signal is awaited
/// on a small runtime in its own thread.
pub fn watch_interrupt(progress: Progress) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::debug!(error = %e, "interrupt handler unavailable");
                return;
            }
        };

        if rt.block_on(tokio::signal::ctrl_c()).is_ok() {
            progress.finish();
            eprintln!();
            eprintln!("{} Interrupted", "[ERROR]".red().bold());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
}
