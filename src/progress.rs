//! Progress indicators for nimbus CLI.

use colored::Colorize;
use declarative::{ProgressCallback, ResourceOutcome, ResourceReport};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar with the standard nimbus style
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Symbol for how a resource ended up
pub fn symbol(report: &ResourceReport) -> &'static str {
    if report.is_failure() {
        return "✗";
    }
    match report.outcome {
        ResourceOutcome::Unchanged => "○",
        ResourceOutcome::Converged(_) => "✓",
        ResourceOutcome::Skipped { .. } => "⊘",
        ResourceOutcome::Failed { .. } => "✗",
    }
}

/// Drives a progress bar from executor callbacks
pub struct BarProgress {
    pb: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    pub fn new(total: usize, verbose: bool) -> Self {
        Self {
            pb: bar(total as u64, "Applying"),
            verbose,
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_wave_start(&mut self, wave: usize, count: usize) {
        if self.verbose {
            self.pb
                .suspend(|| println!("  {} wave {wave}: {count} resource(s)", "→".cyan()));
        }
    }

    fn on_resource_complete(&mut self, report: &ResourceReport) {
        self.pb
            .set_message(format!("{} {}", symbol(report), report.resource));
        self.pb.inc(1);
    }

    fn on_wave_complete(&mut self) {}
}
