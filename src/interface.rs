//! Interface address enumeration
//!
//! Reads the addresses bound to a named interface through `getifaddrs(3)`.

use std::ffi::CStr;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::debug;

use crate::error::{Error, Result};

/// Lists every IPv4 and IPv6 address bound to `name`
///
/// An interface that does not exist, or has no addresses, yields an empty
/// list rather than an error.
///
/// # Errors
///
/// Returns a network error when `getifaddrs` itself fails.
pub fn interface_addresses(name: &str) -> Result<Vec<IpAddr>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        let err = std::io::Error::last_os_error();
        return Err(Error::network(format!("getifaddrs: {err}")));
    }

    let mut addrs = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_name.is_null() || entry.ifa_addr.is_null() {
            continue;
        }
        let ifname = unsafe { CStr::from_ptr(entry.ifa_name) };
        if ifname.to_bytes() != name.as_bytes() {
            continue;
        }

        if let Some(addr) = unsafe { sockaddr_to_ip(entry.ifa_addr) } {
            addrs.push(addr);
        }
    }

    unsafe { libc::freeifaddrs(head) };
    debug!("Interface {}: {} address(es)", name, addrs.len());
    Ok(addrs)
}

/// Converts an `AF_INET`/`AF_INET6` socket address; other families give `None`
///
/// # Safety
///
/// `sa` must point to a valid `sockaddr` whose storage matches its family.
unsafe fn sockaddr_to_ip(sa: *const libc::sockaddr) -> Option<IpAddr> {
    match i32::from((*sa).sa_family) {
        libc::AF_INET => {
            let sin = &*(sa as *const libc::sockaddr_in);
            Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(sa as *const libc::sockaddr_in6);
            Some(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_interface_is_empty() {
        let addrs = interface_addresses("alidns-sync-test-none0").unwrap();
        assert!(addrs.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_loopback_has_ipv4_loopback() {
        let addrs = interface_addresses("lo").unwrap();
        assert!(addrs.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_sockaddr_in_conversion() {
        let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_addr.s_addr = u32::from(Ipv4Addr::new(203, 0, 113, 5)).to_be();

        let ip = unsafe { sockaddr_to_ip(&sin as *const _ as *const libc::sockaddr) };
        assert_eq!(ip, Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5))));
    }

    #[test]
    fn test_sockaddr_in6_conversion() {
        let expected: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sin6.sin6_addr.s6_addr = expected.octets();

        let ip = unsafe { sockaddr_to_ip(&sin6 as *const _ as *const libc::sockaddr) };
        assert_eq!(ip, Some(IpAddr::V6(expected)));
    }
}
