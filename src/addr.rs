//! Address codec
//!
//! Pure conversions between dotted-decimal IPv4 strings, hex strings and
//! 32-bit integers, plus loopback lookup and default connection naming.
//! Stateless; the connection/framing core only calls these to present or
//! parse addresses, never for framing decisions.

use std::net::Ipv4Addr;

use crate::error::{NetError, Result};

/// Encode an IPv4 address string into a single integer
///
/// e.g. "127.0.0.1" into 2130706433
pub fn ipv4_to_dec(ip: &str) -> Result<u32> {
    let addr: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|_| NetError::Addr(format!("not a dotted-decimal IPv4 address: {ip}")))?;
    Ok(u32::from(addr))
}

/// Decode a 32-bit integer into its IPv4 address string
///
/// e.g. 2130706433 into "127.0.0.1"
pub fn dec_to_ipv4(dec: u32) -> String {
    Ipv4Addr::from(dec).to_string()
}

/// Convert an IPv4 address string to its hex representation
///
/// e.g. "127.0.0.1" into "0x7F000001"
pub fn ipv4_to_hex(ip: &str) -> Result<String> {
    Ok(format!("0x{:08X}", ipv4_to_dec(ip)?))
}

/// Convert a hexadecimal IPv4 string into dotted-decimal form
///
/// Accepts hex strings with or without a leading `0x`.
/// e.g. "0x7F000001" into "127.0.0.1"
pub fn hex_str_to_ipv4(hex: &str) -> Result<String> {
    Ok(dec_to_ipv4(hex_to_dec(hex)?))
}

/// Parse a hexadecimal string (with or without `0x`) into an integer
pub fn hex_to_dec(hex: &str) -> Result<u32> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16)
        .map_err(|_| NetError::Addr(format!("not a hexadecimal string: {hex}")))
}

/// Format an integer as a hexadecimal string
///
/// e.g. 2130706433 into "0x7F000001"
pub fn dec_to_hex(dec: u32) -> String {
    format!("0x{dec:X}")
}

/// The IPv4 loopback address string for the local machine
pub fn my_ip() -> String {
    Ipv4Addr::LOCALHOST.to_string()
}

/// Default registry name for a connection: `"<host>:<port>"`
pub fn name_for_connection(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}
