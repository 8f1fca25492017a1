//! Decoder event catalogue and the sink codecs raise events through.
//!
//! The sink is an injected collaborator so hosts can route events into their
//! alert pipeline and tests can substitute a capturing implementation.

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::packet::Packet;

/// Anomaly events the TCP codec can raise while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpEvent {
    DgramLtTcphdr,
    InvalidOffset,
    LargeOffset,
    OptBadLen,
    OptTruncated,
    OptTtcp,
    OptObsolete,
    OptExperimental,
    OptWscaleInvalid,
    Xmas,
    NmapXmas,
    BadUrp,
    SynFin,
    SynRst,
    MustAck,
    NoSynAckRst,
    ShaftSynflood,
    PortZero,
    DosNaptha,
    SynToMulticast,
}

impl TcpEvent {
    /// Every catalogued event, in registration order.
    pub const ALL: [TcpEvent; 20] = [
        TcpEvent::DgramLtTcphdr,
        TcpEvent::InvalidOffset,
        TcpEvent::LargeOffset,
        TcpEvent::OptBadLen,
        TcpEvent::OptTruncated,
        TcpEvent::OptTtcp,
        TcpEvent::OptObsolete,
        TcpEvent::OptExperimental,
        TcpEvent::OptWscaleInvalid,
        TcpEvent::Xmas,
        TcpEvent::NmapXmas,
        TcpEvent::BadUrp,
        TcpEvent::SynFin,
        TcpEvent::SynRst,
        TcpEvent::MustAck,
        TcpEvent::NoSynAckRst,
        TcpEvent::ShaftSynflood,
        TcpEvent::PortZero,
        TcpEvent::DosNaptha,
        TcpEvent::SynToMulticast,
    ];

    /// Rule text registered for this event.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TcpEvent::DgramLtTcphdr => "(tcp) TCP packet len is smaller than 20 bytes",
            TcpEvent::InvalidOffset => "(tcp) TCP Data Offset is less than 5",
            TcpEvent::LargeOffset => "(tcp) TCP Header length exceeds packet length",
            TcpEvent::OptBadLen => "(tcp) Tcp Options found with bad lengths",
            TcpEvent::OptTruncated => "(tcp) Truncated Tcp Options",
            TcpEvent::OptTtcp => "(tcp) T/TCP Detected",
            TcpEvent::OptObsolete => "(tcp) Obsolete TCP Options found",
            TcpEvent::OptExperimental => "(tcp) Experimental Tcp Options found",
            TcpEvent::OptWscaleInvalid => {
                "(tcp) Tcp Window Scale Option found with length > 14"
            }
            TcpEvent::Xmas => "(tcp) XMAS Attack Detected",
            TcpEvent::NmapXmas => "(tcp) Nmap XMAS Attack Detected",
            TcpEvent::BadUrp => "(tcp) TCP urgent pointer exceeds payload length or no payload",
            TcpEvent::SynFin => "(tcp) TCP SYN with FIN",
            TcpEvent::SynRst => "(tcp) TCP SYN with RST",
            TcpEvent::MustAck => "(tcp) TCP PDU missing ack for established session",
            TcpEvent::NoSynAckRst => "(tcp) TCP has no SYN, ACK, or RST",
            TcpEvent::ShaftSynflood => "(tcp) DDOS shaft synflood",
            TcpEvent::PortZero => "(tcp) BAD-TRAFFIC TCP port 0 traffic",
            TcpEvent::DosNaptha => "(decode) DOS NAPTHA Vulnerability Detected",
            TcpEvent::SynToMulticast => "(decode) Bad Traffic SYN to multicast address",
        }
    }
}

impl std::fmt::Display for TcpEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sink for decoder events and active-response requests.
pub trait EventSink: Send + Sync {
    /// Fire-and-forget decoder event raised while decoding `packet`.
    fn emit(&self, packet: &Packet<'_>, event: TcpEvent);

    /// Request an active-response drop of the current packet.
    fn request_drop(&self);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _packet: &Packet<'_>, _event: TcpEvent) {}

    fn request_drop(&self) {}
}

/// Sink that records emitted events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TcpEvent>>,
    drop_requests: AtomicUsize,
}

impl MemorySink {
    /// Events emitted so far, in emission order.
    pub fn events(&self) -> Vec<TcpEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn drop_requests(&self) -> usize {
        self.drop_requests.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.drop_requests.store(0, Ordering::Relaxed);
    }
}

impl EventSink for MemorySink {
    fn emit(&self, _packet: &Packet<'_>, event: TcpEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    fn request_drop(&self) {
        self.drop_requests.fetch_add(1, Ordering::Relaxed);
    }
}
