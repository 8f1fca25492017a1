//! TCP transport-layer codec.
//!
//! Decodes the TCP header and option list from untrusted bytes, verifies the
//! checksum over an IPv4/IPv6 pseudoheader, raises anomaly events for
//! malformed or evasion-shaped segments, and synthesizes RST/FIN/PUSH
//! response segments with recomputed checksums.
//!
//! Per RFC 793 section 3.1 a TCP must tolerate any option it does not
//! implement and survive illegal option lengths without crashing. The walker
//! here goes further and keeps the cleanly parsed prefix when it hits a bad
//! option, which is what BSD and Linux stacks do on receive.

use std::{
    net::IpAddr,
    sync::{Arc, PoisonError, RwLock},
};

use ip_network::IpNetwork;
use ip_network_table::IpNetworkTable;
use tracing::{debug, warn};
use vedette_wire::{
    csum::tcp_checksum,
    tcp::{
        TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_NORESERVED, TCP_FLAG_PSH, TCP_FLAG_RST, TCP_FLAG_SYN,
        TCP_FLAG_URG, TCP_HDR_LEN, TCP_MAX_OPT_BYTES, TCP_OLEN_CC, TCP_OLEN_ECHO, TCP_OLEN_MAXSEG,
        TCP_OLEN_MD5SIG, TCP_OLEN_SACKOK, TCP_OLEN_TIMESTAMP, TCP_OLEN_WSCALE, TCP_OPT_AUTH,
        TCP_OPT_BUBBA, TCP_OPT_CC, TCP_OPT_CC_ECHO, TCP_OPT_CC_NEW, TCP_OPT_ECHO,
        TCP_OPT_ECHOREPLY, TCP_OPT_EOL, TCP_OPT_MAXSEG, TCP_OPT_MD5SIG, TCP_OPT_NOP, TCP_OPT_SACK,
        TCP_OPT_SACKOK, TCP_OPT_SKEETER, TCP_OPT_TIMESTAMP, TCP_OPT_UNASSIGNED, TCP_OPT_WSCALE,
        TcpHdr, TcpHdrMut,
    },
};

use crate::{
    codec::{Codec, CodecPlugin, EncBuffer, EncState, EncodeFlags, EncodeType},
    conf::DecoderConf,
    error::{Result, VedetteError},
    events::{EventSink, TcpEvent},
    packet::{
        IPPROTO_TCP, InterfaceMode, PKT_ERR_CKSUM_TCP, PKT_REBUILT_FRAG, PROTO_BIT_TCP, Packet,
        TcpOption,
    },
    profiler::{self, Stage},
};

/// Codec name used for registration and rule text.
pub const TCP_CODEC_NAME: &str = "tcp";

/// Destinations a SYN should never target. Compiled once at module load,
/// read-only afterwards.
const SYN_TO_MULTICAST_LIST: &str = "[232.0.0.0/8,233.0.0.0/8,239.0.0.0/8]";

static SYN_TO_MULTICAST_DST: RwLock<Option<IpNetworkTable<()>>> = RwLock::new(None);

/// Plugin descriptor for the TCP codec.
pub static TCP_CODEC_PLUGIN: CodecPlugin = CodecPlugin {
    name: TCP_CODEC_NAME,
    pinit,
    pterm,
    ctor,
};

fn ctor(conf: Arc<DecoderConf>, events: Arc<dyn EventSink>) -> Arc<dyn Codec> {
    Arc::new(TcpCodec::new(conf, events))
}

/// Compiles the SYN-to-multicast destination variable. Runs once at module
/// load; failure is terminal for the process.
pub fn pinit() -> Result<()> {
    let table = compile_ip_list(SYN_TO_MULTICAST_LIST)?;
    *SYN_TO_MULTICAST_DST
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(table);
    Ok(())
}

/// Releases the SYN-to-multicast destination variable at module unload.
pub fn pterm() {
    *SYN_TO_MULTICAST_DST
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn compile_ip_list(list: &str) -> Result<IpNetworkTable<()>> {
    let inner = list.trim().trim_start_matches('[').trim_end_matches(']');
    let mut table = IpNetworkTable::new();
    for item in inner.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let network = item
            .parse::<IpNetwork>()
            .map_err(|e| VedetteError::MulticastVar(format!("{item}: {e}")))?;
        table.insert(network, ());
    }
    Ok(table)
}

fn syn_to_multicast_dst(ip: IpAddr) -> bool {
    SYN_TO_MULTICAST_DST
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .is_some_and(|table| table.longest_match(ip).is_some())
}

/// Expected on-wire length for a TCP option kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectedLen {
    Fixed(u8),
    Variable,
}

/// Outcome of validating one option against its kind's length rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptStatus<'a> {
    Ok {
        skip: u8,
        len: u8,
        data: Option<&'a [u8]>,
    },
    BadLen,
    Trunc,
}

/// Checks one option's length byte against the rule for its kind. `opt` runs
/// from the kind byte to the end of the option region.
fn validate_option(opt: &[u8], expected: ExpectedLen) -> OptStatus<'_> {
    let Some(&len_byte) = opt.get(1) else {
        // the kind byte sits at the end of the region with no length behind it
        return OptStatus::Trunc;
    };
    if len_byte == 0 {
        return OptStatus::BadLen;
    }
    match expected {
        ExpectedLen::Fixed(expected_len) => {
            if expected_len < 2 {
                return OptStatus::BadLen;
            }
            if usize::from(expected_len) > opt.len() {
                return OptStatus::Trunc;
            }
            if len_byte != expected_len {
                return OptStatus::BadLen;
            }
        }
        ExpectedLen::Variable => {
            // RFC 793: the length byte counts itself and the kind byte
            if len_byte < 2 {
                return OptStatus::BadLen;
            }
            if usize::from(len_byte) > opt.len() {
                return OptStatus::Trunc;
            }
        }
    }
    let data = if len_byte == 2 {
        None
    } else {
        Some(&opt[2..usize::from(len_byte)])
    };
    OptStatus::Ok {
        skip: len_byte,
        len: len_byte - 2,
        data,
    }
}

/// TCP codec with its injected collaborators.
pub struct TcpCodec {
    conf: Arc<DecoderConf>,
    events: Arc<dyn EventSink>,
}

impl TcpCodec {
    pub fn new(conf: Arc<DecoderConf>, events: Arc<dyn EventSink>) -> Self {
        Self { conf, events }
    }

    /// Walks the option region, recording cleanly parsed options on `p` and
    /// raising option anomalies. A region longer than [`TCP_MAX_OPT_BYTES`]
    /// clears the header reference; the caller treats that as decode failure.
    fn decode_options<'p>(&self, region: &'p [u8], p: &mut Packet<'p>) {
        profiler::bump(Stage::Options);

        if region.len() > TCP_MAX_OPT_BYTES {
            // the caller derives the region from the 4-bit data offset, so
            // this cannot happen unless it mis-sliced
            warn!(
                "tcp option region of {} bytes exceeds the {} byte maximum",
                region.len(),
                TCP_MAX_OPT_BYTES
            );
            p.tcph = None;
            return;
        }

        let mut idx = 0usize;
        let mut count = 0usize;
        let mut done = false;
        let mut experimental_option_found = false;
        let mut obsolete_option_found = false;
        let mut ttcp_found = false;

        while idx < region.len() && count < TCP_MAX_OPT_BYTES && !done {
            let bytes = &region[idx..];
            let kind = bytes[0];

            let status = match kind {
                TCP_OPT_EOL => {
                    done = true;
                    OptStatus::Ok {
                        skip: 1,
                        len: 0,
                        data: None,
                    }
                }
                TCP_OPT_NOP => OptStatus::Ok {
                    skip: 1,
                    len: 0,
                    data: None,
                },
                TCP_OPT_MAXSEG => validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_MAXSEG)),
                TCP_OPT_SACKOK => validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_SACKOK)),
                TCP_OPT_WSCALE => {
                    let status = validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_WSCALE));
                    if let OptStatus::Ok {
                        data: Some(data), ..
                    } = status
                    {
                        if data[0] > 14 {
                            self.events.emit(p, TcpEvent::OptWscaleInvalid);
                        }
                    }
                    status
                }
                // both echo options use the same length
                TCP_OPT_ECHO | TCP_OPT_ECHOREPLY => {
                    obsolete_option_found = true;
                    validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_ECHO))
                }
                TCP_OPT_MD5SIG => {
                    // obsoleted by TCP-AO (RFC 5925)
                    obsolete_option_found = true;
                    validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_MD5SIG))
                }
                TCP_OPT_AUTH => {
                    // RFC 5925 section 2.2: at least four bytes
                    match bytes.get(1) {
                        Some(&len_byte) if len_byte < 4 => OptStatus::BadLen,
                        _ => validate_option(bytes, ExpectedLen::Variable),
                    }
                }
                TCP_OPT_SACK => match validate_option(bytes, ExpectedLen::Variable) {
                    OptStatus::Ok { data: None, .. } => OptStatus::BadLen,
                    status => status,
                },
                TCP_OPT_CC_ECHO => {
                    ttcp_found = true;
                    validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_CC))
                }
                // all three T/TCP connection-count options share a length
                TCP_OPT_CC | TCP_OPT_CC_NEW => {
                    validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_CC))
                }
                TCP_OPT_TIMESTAMP => validate_option(bytes, ExpectedLen::Fixed(TCP_OLEN_TIMESTAMP)),
                TCP_OPT_SKEETER | TCP_OPT_BUBBA | TCP_OPT_UNASSIGNED => {
                    obsolete_option_found = true;
                    validate_option(bytes, ExpectedLen::Variable)
                }
                // trailer checksum, SCPS, selective negative acks, record
                // boundaries, corruption, partial order, alternate checksum,
                // SNAP, and anything unknown
                _ => {
                    experimental_option_found = true;
                    validate_option(bytes, ExpectedLen::Variable)
                }
            };

            match status {
                OptStatus::Ok { skip, len, data } => {
                    p.tcp_options[count] = TcpOption { kind, len, data };
                    count += 1;
                    idx += usize::from(skip);
                }
                OptStatus::BadLen | OptStatus::Trunc => {
                    let event = if matches!(status, OptStatus::BadLen) {
                        TcpEvent::OptBadLen
                    } else {
                        TcpEvent::OptTruncated
                    };
                    self.events.emit(p, event);
                    // keep the options cleanly parsed before the bad one,
                    // the way BSD and Linux receivers do
                    p.tcp_option_count = count as u8;
                    return;
                }
            }
        }

        p.tcp_option_count = count as u8;

        if experimental_option_found {
            self.events.emit(p, TcpEvent::OptExperimental);
        } else if obsolete_option_found {
            self.events.emit(p, TcpEvent::OptObsolete);
        } else if ttcp_found {
            self.events.emit(p, TcpEvent::OptTtcp);
        }
    }

    /// Trailing anomaly checks run once the packet record is filled.
    fn misc_tests(&self, p: &Packet<'_>, tcph: &TcpHdr<'_>) {
        if tcph.flags() & TCP_FLAG_NORESERVED == TCP_FLAG_SYN && tcph.seq() == 674711609 {
            self.events.emit(p, TcpEvent::ShaftSynflood);
        }

        if p.sp == 0 || p.dp == 0 {
            self.events.emit(p, TcpEvent::PortZero);
        }
    }
}

impl Codec for TcpCodec {
    fn name(&self) -> &'static str {
        TCP_CODEC_NAME
    }

    fn protocol_ids(&self) -> &'static [u8] {
        &[IPPROTO_TCP]
    }

    fn decode<'p>(
        &self,
        raw: &'p [u8],
        p: &mut Packet<'p>,
        lyr_len: &mut u16,
        _next_proto: &mut Option<u8>,
    ) -> bool {
        profiler::bump(Stage::Decode);
        let raw_len = raw.len();

        let Some(tcph) = TcpHdr::new(raw) else {
            debug!("tcp packet (len = {raw_len}) cannot contain 20 byte header");
            p.tcph = None;
            self.events.emit(p, TcpEvent::DgramLtTcphdr);
            return false;
        };
        p.tcph = Some(tcph);

        let hlen = tcph.hdr_len();
        *lyr_len = hlen as u16;

        if hlen < TCP_HDR_LEN {
            debug!(
                "tcp data offset {} below the 20 byte minimum",
                tcph.data_offset()
            );
            p.tcph = None;
            self.events.emit(p, TcpEvent::InvalidOffset);
            return false;
        }

        if hlen > raw_len {
            debug!("tcp header length {hlen} exceeds the {raw_len} byte segment");
            p.tcph = None;
            self.events.emit(p, TcpEvent::LargeOffset);
            return false;
        }

        // Checksum before the anomaly checks: on encrypted or encapsulated
        // traffic a bad sum would make every later alert a false positive.
        if self.conf.tcp_checksums {
            let pseudo = p.ip.pseudoheader(raw_len as u32);
            let csum = tcp_checksum(&pseudo, raw);
            if csum != 0 {
                if p.unsure_encap() {
                    p.tcph = None;
                    return false;
                }

                p.error_flags |= PKT_ERR_CKSUM_TCP;
                debug!("bad tcp checksum, residual {csum:#06x}");

                if self.conf.inline_mode && self.conf.tcp_checksum_drops {
                    debug!("dropping bad packet (tcp checksum)");
                    self.events.request_drop();
                }
            }
        }

        let flags = tcph.flags();

        const XMAS_SET: u8 = TCP_FLAG_FIN | TCP_FLAG_PSH | TCP_FLAG_URG;
        const XMAS_COMPANION_SET: u8 = TCP_FLAG_SYN | TCP_FLAG_ACK | TCP_FLAG_RST;
        if flags & XMAS_SET == XMAS_SET {
            if flags & XMAS_COMPANION_SET == XMAS_COMPANION_SET {
                self.events.emit(p, TcpEvent::Xmas);
            } else {
                self.events.emit(p, TcpEvent::NmapXmas);
            }
            // keep decoding, there may be valid data inside
        }

        if flags & TCP_FLAG_SYN != 0 {
            if flags == TCP_FLAG_SYN && tcph.seq() == 6060842 && p.ip.id() == 413 {
                self.events.emit(p, TcpEvent::DosNaptha);
            }

            if syn_to_multicast_dst(p.ip.dst()) {
                self.events.emit(p, TcpEvent::SynToMulticast);
            }
            if flags & TCP_FLAG_RST != 0 {
                self.events.emit(p, TcpEvent::SynRst);
            }
            if flags & TCP_FLAG_FIN != 0 {
                self.events.emit(p, TcpEvent::SynFin);
            }
        } else if flags & (TCP_FLAG_ACK | TCP_FLAG_RST) == 0 {
            self.events.emit(p, TcpEvent::NoSynAckRst);
        }

        if flags & (TCP_FLAG_FIN | TCP_FLAG_PSH | TCP_FLAG_URG) != 0 && flags & TCP_FLAG_ACK == 0 {
            self.events.emit(p, TcpEvent::MustAck);
        }

        p.sp = tcph.src_port();
        p.dp = tcph.dst_port();

        let opt_len = hlen - TCP_HDR_LEN;
        if opt_len > 0 {
            debug!("{opt_len} bytes of tcp options");
            self.decode_options(&raw[TCP_HDR_LEN..hlen], p);
            if p.tcph.is_none() {
                return false;
            }
        } else {
            p.tcp_option_count = 0;
        }

        p.data = &raw[hlen..];
        p.dsize = u16::try_from(raw_len - hlen).unwrap_or(u16::MAX);

        if flags & TCP_FLAG_URG != 0 && (p.dsize == 0 || tcph.urg_ptr() > p.dsize) {
            self.events.emit(p, TcpEvent::BadUrp);
        }

        p.proto_bits |= PROTO_BIT_TCP;
        self.misc_tests(p, &tcph);

        true
    }

    // Response segments are sent statelessly, so per RFC 793 the
    // acknowledgeable sequence numbers are derived from the segment being
    // answered rather than from tracked connection state.
    fn encode(&self, enc: &mut EncState<'_>, out: &mut EncBuffer<'_>, raw_in: &[u8]) -> bool {
        profiler::bump(Stage::Encode);

        let Some(hi) = TcpHdr::new(raw_in) else {
            return false;
        };
        let hlen = hi.hdr_len();
        if hlen < TCP_HDR_LEN || hlen > raw_in.len() {
            return false;
        }

        let attach_payload = matches!(enc.kind, EncodeType::TcpFin | EncodeType::TcpPush);

        // working backward through the response: payload first, then header
        if attach_payload {
            if let Some(payload) = enc.payload.filter(|pl| !pl.is_empty()) {
                if !out.grow(payload.len()) {
                    return false;
                }
                out.bytes_mut()[..payload.len()].copy_from_slice(payload);
            }
        }

        if !out.grow(hlen) {
            return false;
        }
        // keep the original option bytes; the field writes below cover the rest
        out.bytes_mut()[..hlen].copy_from_slice(&raw_in[..hlen]);

        // SYN and FIN consume one sequence number
        let ctl: u32 = if hi.flags() & TCP_FLAG_SYN != 0 { 1 } else { 0 };
        let dsize = u32::from(enc.pkt.dsize);

        let (sport, dport, mut seq, ack) = if !enc.flags.reverse {
            // seq depends on whether the original data passes or drops
            let seq = if enc.pkt.iface_mode == InterfaceMode::Inline {
                hi.seq()
            } else {
                hi.seq().wrapping_add(dsize).wrapping_add(ctl)
            };
            (hi.src_port(), hi.dst_port(), seq, hi.ack())
        } else {
            (
                hi.dst_port(),
                hi.src_port(),
                hi.ack(),
                hi.seq().wrapping_add(dsize).wrapping_add(ctl),
            )
        };

        if let Some(delta) = enc.flags.seq_delta {
            seq = seq.wrapping_add(delta as u32);
        }

        {
            let Some(mut ho) = TcpHdrMut::new(out.bytes_mut()) else {
                return false;
            };
            ho.set_src_port(sport);
            ho.set_dst_port(dport);
            ho.set_seq(seq);
            ho.set_ack(ack);
            ho.set_data_offset((TCP_HDR_LEN / 4) as u8); // no options in the response
            ho.set_window(0);
            ho.set_urg_ptr(0);
            match enc.kind {
                EncodeType::TcpFin => ho.set_flags(TCP_FLAG_ACK | TCP_FLAG_FIN),
                EncodeType::TcpPush => {
                    ho.set_flags(TCP_FLAG_ACK | TCP_FLAG_PSH);
                    ho.set_window(65535);
                }
                EncodeType::TcpRst => ho.set_flags(TCP_FLAG_RST | TCP_FLAG_ACK),
            }
            ho.set_checksum(0);
        }

        // outer layers checksum against this protocol number
        enc.proto = IPPROTO_TCP;

        let pseudo = enc.pkt.ip.pseudoheader(out.len() as u32);
        let csum = tcp_checksum(&pseudo, out.bytes());
        let Some(mut ho) = TcpHdrMut::new(out.bytes_mut()) else {
            return false;
        };
        ho.set_checksum(csum);

        true
    }

    fn update(&self, p: &Packet<'_>, layer: &mut [u8], len: &mut u32) -> bool {
        profiler::bump(Stage::Update);

        let Some(h) = TcpHdr::new(layer) else {
            return false;
        };
        *len += h.hdr_len() as u32 + u32::from(p.dsize);

        // cooked packets carry trusted checksums unless rebuilt from fragments
        if !p.was_cooked() || p.packet_flags & PKT_REBUILT_FRAG != 0 {
            let seg_len = *len as usize;
            if layer.len() < seg_len {
                return false;
            }
            if let Some(mut h) = TcpHdrMut::new(layer) {
                h.set_checksum(0);
            }
            let pseudo = p.ip.pseudoheader(*len);
            let csum = tcp_checksum(&pseudo, &layer[..seg_len]);
            if let Some(mut h) = TcpHdrMut::new(layer) {
                h.set_checksum(csum);
            }
        }

        true
    }

    fn format<'p>(
        &self,
        flags: EncodeFlags,
        src_layer: &[u8],
        c: &mut Packet<'p>,
        layer: &'p mut [u8],
    ) {
        if flags.reverse {
            if let (Some(ph), Some(mut ch)) =
                (TcpHdr::new(src_layer), TcpHdrMut::new(&mut *layer))
            {
                ch.set_src_port(ph.dst_port());
                ch.set_dst_port(ph.src_port());
            }
        }

        let view: &'p [u8] = layer;
        if let Some(ch) = TcpHdr::new(view) {
            c.sp = ch.src_port();
            c.dp = ch.dst_port();
            c.tcph = Some(ch);
        }
    }
}
