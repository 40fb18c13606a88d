//! Terminal progress bars for transfers.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use osf_connection::ProgressReporter;

const BAR_TEMPLATE: &str = "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})";
const SPINNER_TEMPLATE: &str = "{spinner} {msg} {bytes} ({bytes_per_sec})";

/// Draws one indicatif bar per transfer; a spinner when the size is unknown.
#[derive(Default)]
pub(crate) struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, apply: impl FnOnce(&ProgressBar)) {
        let guard = self
            .bar
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            apply(bar);
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin(&self, label: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(label.to_string());
        let previous = self
            .bar
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(bar);
        if let Some(previous) = previous {
            previous.finish_and_clear();
        }
    }

    fn update(&self, transferred: u64, total: Option<u64>) {
        self.with_bar(|bar| {
            if let Some(total) = total
                && bar.length() != Some(total)
            {
                bar.set_length(total);
            }
            bar.set_position(transferred);
        });
    }

    fn finish(&self) {
        let bar = self
            .bar
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    }
}
