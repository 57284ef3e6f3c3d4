// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Interface selection and broadcast socket construction.

use anyhow::{Context, Result};
use pnet::datalink::NetworkInterface;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

/// Pick the source address for the run: the first IPv4 address on an
/// interface that is up and not loopback, in OS enumeration order.
///
/// Both roles call this independently and must agree on the result; the
/// listeners' source filter compares datagram origins against it. Fails if
/// the host has no broadcast-capable interface at all.
pub fn probe_source_addr() -> Result<Ipv4Addr> {
    first_external_ipv4(&pnet::datalink::interfaces())
        .context("no external IPv4 interface available for broadcast")
}

fn first_external_ipv4(interfaces: &[NetworkInterface]) -> Option<Ipv4Addr> {
    for iface in interfaces {
        if iface.is_loopback() || !iface.is_up() {
            continue;
        }
        for ipnet in &iface.ips {
            if let IpAddr::V4(ip) = ipnet.ip() {
                return Some(ip);
            }
        }
    }
    None
}

/// Sender socket: bound to the chosen source address on the shared port,
/// with the broadcast and address-reuse options set.
pub fn broadcast_send_socket(source: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("failed to create send socket")?;
    socket.set_reuse_address(true)?;
    socket
        .bind(&SocketAddrV4::new(source, port).into())
        .with_context(|| format!("failed to bind send socket to {}:{}", source, port))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into()).context("failed to register send socket")
}

/// Receiver socket: the shared port on all interfaces, with address and
/// port reuse set so every listener (and the port-sharing senders of other
/// runs) can bind it concurrently. Broadcast datagrams are delivered to
/// every socket sharing the port.
pub fn broadcast_recv_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("failed to create receive socket")?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .with_context(|| format!("failed to bind receive socket to port {}", port))?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into()).context("failed to register receive socket")
}

/// Environments where limited broadcast is known to be unavailable.
///
/// Inside a FreeBSD jail the process sees no broadcast-capable interface,
/// so a run there is skipped rather than failed.
pub fn skip_reason() -> Option<&'static str> {
    #[cfg(target_os = "freebsd")]
    if in_jail() {
        return Some("limited broadcast is unavailable inside a FreeBSD jail");
    }
    None
}

#[cfg(target_os = "freebsd")]
fn in_jail() -> bool {
    let name = b"security.jail.jailed\0";
    let mut jailed: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::size_t;
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr() as *const libc::c_char,
            &mut jailed as *mut libc::c_int as *mut libc::c_void,
            &mut len,
            std::ptr::null(),
            0,
        )
    };
    rc == 0 && jailed == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

    fn iface(name: &str, flags: u32, ips: Vec<IpNetwork>) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips,
            flags,
        }
    }

    fn v4(addr: &str) -> IpNetwork {
        IpNetwork::V4(Ipv4Network::new(addr.parse().unwrap(), 24).unwrap())
    }

    fn v6(addr: &str) -> IpNetwork {
        IpNetwork::V6(Ipv6Network::new(addr.parse().unwrap(), 64).unwrap())
    }

    const UP: u32 = libc::IFF_UP as u32;
    const LOOPBACK: u32 = libc::IFF_LOOPBACK as u32;

    #[test]
    fn test_skips_loopback() {
        let interfaces = vec![
            iface("lo", UP | LOOPBACK, vec![v4("127.0.0.1")]),
            iface("eth0", UP, vec![v4("10.0.0.2")]),
        ];
        assert_eq!(
            first_external_ipv4(&interfaces),
            Some("10.0.0.2".parse().unwrap())
        );
    }

    #[test]
    fn test_skips_down_interfaces() {
        let interfaces = vec![
            iface("eth0", 0, vec![v4("10.0.0.2")]),
            iface("eth1", UP, vec![v4("192.168.1.9")]),
        ];
        assert_eq!(
            first_external_ipv4(&interfaces),
            Some("192.168.1.9".parse().unwrap())
        );
    }

    #[test]
    fn test_skips_ipv6_only_interfaces() {
        let interfaces = vec![
            iface("eth0", UP, vec![v6("fe80::1")]),
            iface("eth1", UP, vec![v6("fe80::2"), v4("172.16.0.4")]),
        ];
        assert_eq!(
            first_external_ipv4(&interfaces),
            Some("172.16.0.4".parse().unwrap())
        );
    }

    #[test]
    fn test_none_when_no_candidate() {
        let interfaces = vec![
            iface("lo", UP | LOOPBACK, vec![v4("127.0.0.1")]),
            iface("eth0", UP, vec![v6("fe80::1")]),
        ];
        assert_eq!(first_external_ipv4(&interfaces), None);
    }

    #[test]
    fn test_first_match_wins() {
        let interfaces = vec![
            iface("eth0", UP, vec![v4("10.0.0.2")]),
            iface("eth1", UP, vec![v4("10.0.0.3")]),
        ];
        assert_eq!(
            first_external_ipv4(&interfaces),
            Some("10.0.0.2".parse().unwrap())
        );
    }
}
