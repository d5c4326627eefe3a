//! CRC-32 with Koopman's polynomial.
//!
//! Every checksum in the stream uses this function and is stored big-endian.

use crc::{Algorithm, Crc, Digest};

use crate::config::CHECKSUM_SIZE;

/// CRC-32/KOOPMAN: polynomial 0x741B8CD7, reflected, all-ones init and xorout.
pub const CRC_32_KOOPMAN: Algorithm<u32> = Algorithm { width: 32, poly: 0x741b_8cd7, init: 0xffff_ffff, refin: true, refout: true, xorout: 0xffff_ffff, check: 0x2d3d_d0ae, residue: 0x0843_323b };

/// Shared table-driven instance.
pub static KOOPMAN: Crc<u32> = Crc::<u32>::new(&CRC_32_KOOPMAN);

/// Running checksum state.
pub type Running = Digest<'static, u32>;

#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    KOOPMAN.checksum(data)
}

#[inline]
pub fn checksum_bytes(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    checksum(data).to_be_bytes()
}

/// Compares `stored` (big-endian) against the checksum of `data`.
#[inline]
pub fn matches(data: &[u8], stored: &[u8]) -> bool {
    stored.len() == CHECKSUM_SIZE && checksum_bytes(data) == stored
}
