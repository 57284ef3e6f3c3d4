// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Shared validation utilities for settings and runtime checks.

use std::net::Ipv4Addr;

/// More listeners than this says nothing extra about broadcast delivery and
/// mostly risks exhausting the machine in a mistyped settings file.
pub const MAX_LISTENERS: usize = 32;

/// Result type for validation functions
pub type ValidationResult = Result<(), String>;

/// Check if an IPv4 address is a valid unicast address.
///
/// Returns `false` for multicast, broadcast, and unspecified (0.0.0.0)
/// addresses.
#[inline]
pub fn is_valid_unicast(addr: Ipv4Addr) -> bool {
    !addr.is_multicast() && !addr.is_broadcast() && !addr.is_unspecified()
}

/// Validate that the selected source address can appear as the source of a
/// broadcast datagram.
///
/// The interface scan should never yield anything else, but a bad scan result
/// would otherwise surface as every listener silently dropping everything.
pub fn validate_source_addr(addr: Ipv4Addr) -> ValidationResult {
    if is_valid_unicast(addr) {
        Ok(())
    } else {
        Err(format!(
            "source address must be a valid unicast address, got {}",
            addr
        ))
    }
}

/// Validate a port number.
///
/// Port 0 is rejected: the sender and every listener must agree on one
/// concrete port, so an OS-assigned ephemeral port cannot work here.
pub fn validate_port(port: u16, context: &str) -> ValidationResult {
    if port == 0 {
        return Err(format!(
            "{} cannot be 0; valid port range is 1-65535",
            context
        ));
    }
    Ok(())
}

/// Validate the listener process count.
pub fn validate_listener_count(count: usize) -> ValidationResult {
    if count == 0 {
        return Err("listener count cannot be 0; nothing would be verified".to_string());
    }
    if count > MAX_LISTENERS {
        return Err(format!(
            "listener count {} exceeds maximum of {}",
            count, MAX_LISTENERS
        ));
    }
    Ok(())
}
