//! Integer packing for IPv4 source addresses.
//!
//! Counters are plain `u64`s, so addresses are stored in their big-endian
//! `u32` form and converted back only for display.

use std::net::Ipv4Addr;

/// Pack an address into its network-order integer form.
pub fn encode_addr(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

/// Unpack an address previously produced by [`encode_addr`].
pub fn decode_addr(bits: u32) -> Ipv4Addr {
    Ipv4Addr::from(bits)
}
