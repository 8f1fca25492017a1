//! Per-packet decoded state shared between codec layers.
//!
//! A [`Packet`] is owned exclusively by the worker that dequeued it; codecs
//! mutate named fields only. Header and option records borrow from the
//! caller's packet buffer, so their lifetime equals the packet's processing
//! scope and the hot path allocates nothing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use vedette_wire::{
    csum::Pseudoheader,
    tcp::{TCP_MAX_OPT_BYTES, TcpHdr},
};

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;

/// Protocol bit asserted once the TCP layer decodes cleanly.
pub const PROTO_BIT_TCP: u16 = 0x0001;

/// Error flag recorded when the TCP checksum does not verify.
pub const PKT_ERR_CKSUM_TCP: u16 = 0x0001;

/// Decode flag: the current decode path sits inside an encapsulation whose
/// integrity cannot be assumed (Teredo, ESP). Suppresses checksum events.
pub const DECODE_UNSURE_ENCAP: u16 = 0x0001;

/// Packet flag: the packet was synthesized or rewritten by the sensor.
pub const PKT_COOKED: u16 = 0x0001;

/// Packet flag: the packet was reassembled from IP fragments.
pub const PKT_REBUILT_FRAG: u16 = 0x0002;

/// How the interface that captured this packet is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceMode {
    /// Passive tap; the sensor observes but cannot hold traffic.
    #[default]
    Passive,
    /// On the data path; the sensor may drop or modify packets.
    Inline,
}

/// Narrow view of the already-decoded IP layer, as far as the transport
/// codecs consume it: version, endpoint addresses, the IPv4 identification,
/// and the pseudoheader for checksum computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpLayer {
    V4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        id: u16,
    },
    V6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
    },
}

impl IpLayer {
    pub fn is_v4(&self) -> bool {
        matches!(self, IpLayer::V4 { .. })
    }

    pub fn src(&self) -> IpAddr {
        match *self {
            IpLayer::V4 { src, .. } => IpAddr::V4(src),
            IpLayer::V6 { src, .. } => IpAddr::V6(src),
        }
    }

    pub fn dst(&self) -> IpAddr {
        match *self {
            IpLayer::V4 { dst, .. } => IpAddr::V4(dst),
            IpLayer::V6 { dst, .. } => IpAddr::V6(dst),
        }
    }

    /// IPv4 identification field; zero for IPv6, which carries none.
    pub fn id(&self) -> u16 {
        match *self {
            IpLayer::V4 { id, .. } => id,
            IpLayer::V6 { .. } => 0,
        }
    }

    /// Builds the TCP pseudoheader for a segment of `len` bytes.
    pub fn pseudoheader(&self, len: u32) -> Pseudoheader {
        match *self {
            IpLayer::V4 { src, dst, .. } => Pseudoheader::V4 {
                src: src.octets(),
                dst: dst.octets(),
                proto: IPPROTO_TCP,
                len: len as u16,
            },
            IpLayer::V6 { src, dst } => Pseudoheader::V6 {
                src: src.octets(),
                dst: dst.octets(),
                proto: IPPROTO_TCP,
                len,
            },
        }
    }
}

/// One decoded TCP option. `len` is the payload length (on-wire length minus
/// two for variable options, zero for EOL/NOP); `data` borrows the payload
/// bytes from the segment when there are any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpOption<'a> {
    pub kind: u8,
    pub len: u8,
    pub data: Option<&'a [u8]>,
}

/// Per-packet decoded state.
#[derive(Debug)]
pub struct Packet<'a> {
    /// The IP layer below, decoded by the caller.
    pub ip: IpLayer,
    /// Deployment mode of the capture interface for this packet.
    pub iface_mode: InterfaceMode,

    /// TCP header view, present after a successful decode.
    pub tcph: Option<TcpHdr<'a>>,
    /// Source port, host byte order.
    pub sp: u16,
    /// Destination port, host byte order.
    pub dp: u16,
    /// Decoded options; only the first `tcp_option_count` entries are valid.
    pub tcp_options: [TcpOption<'a>; TCP_MAX_OPT_BYTES],
    pub tcp_option_count: u8,
    /// Segment payload after the TCP header.
    pub data: &'a [u8],
    pub dsize: u16,

    pub proto_bits: u16,
    pub error_flags: u16,
    pub decode_flags: u16,
    pub packet_flags: u16,
}

impl<'a> Packet<'a> {
    pub fn new(ip: IpLayer) -> Self {
        Self {
            ip,
            iface_mode: InterfaceMode::default(),
            tcph: None,
            sp: 0,
            dp: 0,
            tcp_options: [TcpOption::default(); TCP_MAX_OPT_BYTES],
            tcp_option_count: 0,
            data: &[],
            dsize: 0,
            proto_bits: 0,
            error_flags: 0,
            decode_flags: 0,
            packet_flags: 0,
        }
    }

    pub fn unsure_encap(&self) -> bool {
        self.decode_flags & DECODE_UNSURE_ENCAP != 0
    }

    pub fn was_cooked(&self) -> bool {
        self.packet_flags & PKT_COOKED != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v4_layer() -> IpLayer {
        IpLayer::V4 {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 2),
            id: 413,
        }
    }

    #[test]
    fn test_new_packet_is_blank() {
        let p = Packet::new(v4_layer());
        assert!(p.tcph.is_none());
        assert_eq!(p.tcp_option_count, 0);
        assert_eq!(p.dsize, 0);
        assert!(p.data.is_empty());
        assert_eq!(p.proto_bits, 0);
        assert_eq!(p.iface_mode, InterfaceMode::Passive);
    }

    #[test]
    fn test_ip_layer_accessors() {
        let v4 = v4_layer();
        assert!(v4.is_v4());
        assert_eq!(v4.id(), 413);
        assert_eq!(v4.dst(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        let v6 = IpLayer::V6 {
            src: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
            dst: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2),
        };
        assert!(!v6.is_v4());
        assert_eq!(v6.id(), 0);
    }

    #[test]
    fn test_pseudoheader_carries_segment_length() {
        match v4_layer().pseudoheader(123) {
            Pseudoheader::V4 { proto, len, .. } => {
                assert_eq!(proto, IPPROTO_TCP);
                assert_eq!(len, 123);
            }
            Pseudoheader::V6 { .. } => panic!("expected a v4 pseudoheader"),
        }
    }

    #[test]
    fn test_flag_helpers() {
        let mut p = Packet::new(v4_layer());
        assert!(!p.unsure_encap());
        assert!(!p.was_cooked());
        p.decode_flags |= DECODE_UNSURE_ENCAP;
        p.packet_flags |= PKT_COOKED;
        assert!(p.unsure_encap());
        assert!(p.was_cooked());
    }
}
