use std::io::Read;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressBarIter, ProgressStyle};

use crate::types::Processing;

/// Byte progress for one armor, unarmor or inspect run.
pub struct Bar {
    bar: ProgressBar,
}

impl Bar {
    pub fn new(total: u64, processing: Processing) -> Result<Self> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})").context("invalid progress template")?.progress_chars("●○ ");

        bar.set_style(style);
        bar.set_message(processing.to_string());

        Ok(Self { bar })
    }

    /// A bar that renders nothing, for piped or quiet runs.
    pub fn hidden() -> Self {
        Self { bar: ProgressBar::hidden() }
    }

    pub fn add(&self, delta: u64) {
        self.bar.inc(delta);
    }

    /// Advances the bar as `source` is read.
    pub fn wrap_read<R: Read>(&self, source: R) -> ProgressBarIter<R> {
        self.bar.wrap_read(source)
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Done");
    }

    pub fn abandon(&self, reason: &str) {
        self.bar.abandon_with_message(reason.to_owned());
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish();
        }
    }
}
