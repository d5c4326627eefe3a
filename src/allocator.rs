//! Global allocator for the binary.
//!
//! Encoding and decoding allocate one short-lived buffer per fragment and
//! per group, so the binary uses mimalloc instead of the system allocator.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
