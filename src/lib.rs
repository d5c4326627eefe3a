//! Sane Armor - resilient container framing.
//!
//! Wraps an arbitrary byte stream so it survives bit rot and truncation:
//! - 512-byte blocks sealed with CRC-32/Koopman
//! - Reed-Solomon erasure coding across fragments of each group
//! - Escaped telomere boundaries for resynchronisation after damage

pub mod app;
pub mod armor;
pub mod config;
pub mod encoding;
pub mod error;
pub mod file;
pub mod types;
pub mod ui;
pub mod worker;
