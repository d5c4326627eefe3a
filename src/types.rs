//! Common type definitions shared by the codec, the workers and the UI.
//!
//! - [`Processing`]: which operation a worker is running
//! - [`DecodeState`]: states of the reconstructor
//! - [`GroupOutcome`]: per-group decode result
//! - [`EncodeReport`] / [`DecodeReport`]: totals returned to callers

use std::fmt::{self, Display, Formatter};

use strum::Display as StrumDisplay;

use crate::error::ArmorError;

/// A long-running operation, labelled for progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum Processing {
    #[strum(to_string = "Armoring...")]
    Armor,

    #[strum(to_string = "Unarmoring...")]
    Unarmor,

    #[strum(to_string = "Inspecting...")]
    Inspect,
}

impl Processing {
    /// Past-tense verb for completion messages.
    #[inline]
    pub fn done(self) -> &'static str {
        match self {
            Self::Armor => "armored",
            Self::Unarmor => "unarmored",
            Self::Inspect => "inspected",
        }
    }
}

/// States of the decode-side state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum DecodeState {
    SeekingBoundary,
    ReadingMeta,
    ReadingShards,
    Reconstructing,
    Emitting,
    Terminal,
}

/// Result of decoding one group.
#[derive(Debug)]
pub enum GroupOutcome {
    Recovered {
        sequence: u64,
        data: Vec<u8>,
    },

    /// `sequence` is `None` when the group's header was too damaged to identify it.
    Unrecoverable {
        sequence: Option<u64>,
        reason: ArmorError,
    },
}

impl GroupOutcome {
    #[inline]
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Totals from one encode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub groups: u64,
    pub blocks: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

/// A group that could not be recovered.
#[derive(Debug)]
pub struct FailedGroup {
    pub sequence: Option<u64>,
    pub reason: ArmorError,
}

/// Totals and failures from one decode.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub groups_recovered: u64,
    pub bytes_recovered: u64,
    /// Fragments dropped for a bad checksum, a foreign tag or an out-of-range index.
    pub fragments_discarded: u64,
    pub failed: Vec<FailedGroup>,
    /// At least one boundary was found.
    pub boundary_seen: bool,
    /// The stream ended on a terminal boundary.
    pub clean_end: bool,
}

impl DecodeReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.clean_end
    }

    /// Turns a partial decode into the first error that made it partial.
    pub fn ensure_complete(mut self) -> Result<Self, ArmorError> {
        if !self.failed.is_empty() {
            return Err(self.failed.swap_remove(0).reason);
        }

        if !self.clean_end {
            return Err(ArmorError::BoundaryNotFound);
        }

        Ok(self)
    }

    pub fn summary(&self) -> String {
        let mut line = format!("{} group(s) recovered, {} unrecoverable, {} fragment(s) discarded", self.groups_recovered, self.failed.len(), self.fragments_discarded);

        if !self.failed.is_empty() {
            let ids: Vec<String> = self.failed.iter().map(|f| f.sequence.map_or_else(|| "?".to_string(), |s| s.to_string())).collect();
            line.push_str(&format!(" (failed: {})", ids.join(", ")));
        }

        if !self.clean_end {
            line.push_str(if self.boundary_seen { ", stream truncated" } else { ", no boundary found" });
        }

        line
    }
}

impl Display for DecodeReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
