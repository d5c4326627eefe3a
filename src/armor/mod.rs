//! The armor framing.
//!
//! An armored stream is a sequence of groups separated by telomeres, runs of
//! marker bytes that never occur unescaped inside a group:
//!
//! ```text
//! TELOMERE [meta frame][fragment 0]..[fragment n-1] TELOMERE [meta frame].. TELOMERE
//! ```
//!
//! Each group carries up to `required_shards` sealed blocks of input, spread
//! over `required_shards + redundant_shards` erasure-coded fragments. Every
//! frame is a shard tag, a body and a CRC-32/Koopman checksum, so damage is
//! detected per fragment and repaired from parity, and a decoder that loses
//! its place resynchronises at the next telomere.

pub mod assembler;
pub mod block;
pub mod checksum;
pub mod meta;
pub mod reconstructor;
pub mod scanner;
pub mod shard;
pub mod slice;
pub mod telomere;
