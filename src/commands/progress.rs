//! Transfer progress reporting

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rfastboot_core::TransferProgress;
use std::time::Duration;

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

/// Progress reporter using indicatif spinners, one per transferred piece
pub struct IndicatifProgress {
    multi: MultiProgress,
    current: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: None,
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferProgress for IndicatifProgress {
    fn started(&mut self, label: &str, index: usize, count: usize, bytes: u64) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        let piece = if count > 1 {
            format!(" {}/{}", index + 1, count)
        } else {
            String::new()
        };
        pb.set_message(format!(
            "Sending '{}'{} ({})",
            label,
            piece,
            indicatif::HumanBytes(bytes)
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current = Some(pb);
    }

    fn finished(&mut self, label: &str) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(format!("Wrote '{}'", label));
        }
    }
}
