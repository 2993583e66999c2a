//! Progress bars for the train and test passes

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Progress bar for one pass over a split
///
/// Disabled reporters use hidden bars, so callers never branch on whether
/// progress output is on.
pub struct PassProgress {
    bar: ProgressBar,
}

impl PassProgress {
    /// Create a reporter for a pass of `total` batches
    pub fn new(label: &str, total: u64, enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▇▆▅▄▃▂▁  "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(label.to_string());

        Self { bar }
    }

    /// Advance by one batch, showing the latest loss
    pub fn advance(&self, label: &str, loss: f64) {
        self.bar.set_message(format!("{} loss={:.4}", label, loss));
        self.bar.inc(1);
    }

    /// Batches completed so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
