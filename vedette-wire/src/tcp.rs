//! TCP header, which is present after the IP header.
//!    0                   1                   2                   3
//!    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |          Source Port          |       Destination Port        |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |                        Sequence Number                        |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |                    Acknowledgment Number                      |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |  Data |     |N|C|E|U|A|P|R|S|F|                               |
//!   | Offset| Rsrv|S|R|C|R|C|S|S|Y|I|            Window             |
//!   |       |     | |W|E|G|K|H|T|N|N|                               |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |           Checksum            |         Urgent Pointer        |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |                            Options                            |
//!   /                              ...                              /
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |                             data                              |
//!   /                              ...                              /
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Field layout per RFC 793, options per RFC 793/7323/2018/5925. All fields
//! are stored in network byte order (big-endian). The [`TcpHdr`] and
//! [`TcpHdrMut`] views read and write fields at fixed byte offsets with
//! explicit endian conversion, so the underlying packet buffer needs no
//! alignment.

/// The length of the TCP header base structure.
pub const TCP_HDR_LEN: usize = 20;

/// Upper bound on the option region: `(15 * 4) - TCP_HDR_LEN`.
pub const TCP_MAX_OPT_BYTES: usize = 40;

/// TCP flag masks
pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;
pub const TCP_FLAG_URG: u8 = 0x20;
pub const TCP_FLAG_ECE: u8 = 0x40;
pub const TCP_FLAG_CWR: u8 = 0x80;

/// Flag mask excluding ECE and CWR, the former reserved bits.
pub const TCP_FLAG_NORESERVED: u8 =
    TCP_FLAG_FIN | TCP_FLAG_SYN | TCP_FLAG_RST | TCP_FLAG_PSH | TCP_FLAG_ACK | TCP_FLAG_URG;

/// TCP option kinds, per the IANA "TCP Option Kind Numbers" registry.
pub const TCP_OPT_EOL: u8 = 0;
pub const TCP_OPT_NOP: u8 = 1;
pub const TCP_OPT_MAXSEG: u8 = 2;
pub const TCP_OPT_WSCALE: u8 = 3;
pub const TCP_OPT_SACKOK: u8 = 4;
pub const TCP_OPT_SACK: u8 = 5;
pub const TCP_OPT_ECHO: u8 = 6;
pub const TCP_OPT_ECHOREPLY: u8 = 7;
pub const TCP_OPT_TIMESTAMP: u8 = 8;
pub const TCP_OPT_PARTIAL_PERM: u8 = 9;
pub const TCP_OPT_PARTIAL_SVC: u8 = 10;
pub const TCP_OPT_CC: u8 = 11;
pub const TCP_OPT_CC_NEW: u8 = 12;
pub const TCP_OPT_CC_ECHO: u8 = 13;
pub const TCP_OPT_ALTCSUM: u8 = 14;
pub const TCP_OPT_SKEETER: u8 = 16;
pub const TCP_OPT_BUBBA: u8 = 17;
pub const TCP_OPT_TRAILER_CSUM: u8 = 18;
pub const TCP_OPT_MD5SIG: u8 = 19;
pub const TCP_OPT_SCPS: u8 = 20;
pub const TCP_OPT_SELNEGACK: u8 = 21;
pub const TCP_OPT_RECORDBOUND: u8 = 22;
pub const TCP_OPT_CORRUPTION: u8 = 23;
pub const TCP_OPT_SNAP: u8 = 24;
pub const TCP_OPT_UNASSIGNED: u8 = 25;
pub const TCP_OPT_AUTH: u8 = 29;

/// Fixed on-wire lengths for options that have one.
pub const TCP_OLEN_MAXSEG: u8 = 4;
pub const TCP_OLEN_WSCALE: u8 = 3;
pub const TCP_OLEN_SACKOK: u8 = 2;
pub const TCP_OLEN_ECHO: u8 = 6;
pub const TCP_OLEN_TIMESTAMP: u8 = 10;
pub const TCP_OLEN_CC: u8 = 6;
pub const TCP_OLEN_MD5SIG: u8 = 18;

/// Borrowed view of a TCP header laid over a raw packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHdr<'a> {
    bytes: &'a [u8],
}

impl<'a> TcpHdr<'a> {
    /// Lays the view over `bytes`. Returns `None` when fewer than
    /// [`TCP_HDR_LEN`] bytes are available.
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < TCP_HDR_LEN {
            return None;
        }
        Some(Self { bytes })
    }

    /// Returns the source port from network byte order.
    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Returns the destination port from network byte order.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Returns the sequence number from network byte order.
    #[inline]
    pub fn seq(&self) -> u32 {
        u32::from_be_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    /// Returns the acknowledgment sequence number from network byte order.
    #[inline]
    pub fn ack(&self) -> u32 {
        u32::from_be_bytes([self.bytes[8], self.bytes[9], self.bytes[10], self.bytes[11]])
    }

    /// Returns the data offset value (header length in 32-bit words).
    #[inline]
    pub fn data_offset(&self) -> u8 {
        (self.bytes[12] >> 4) & 0x0F
    }

    /// Returns the header length in bytes.
    #[inline]
    pub fn hdr_len(&self) -> usize {
        usize::from(self.data_offset()) * 4
    }

    /// Returns the TCP flags.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.bytes[13]
    }

    /// Returns the window size from network byte order.
    #[inline]
    pub fn window(&self) -> u16 {
        u16::from_be_bytes([self.bytes[14], self.bytes[15]])
    }

    /// Returns the checksum from network byte order.
    #[inline]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.bytes[16], self.bytes[17]])
    }

    /// Returns the urgent pointer from network byte order.
    #[inline]
    pub fn urg_ptr(&self) -> u16 {
        u16::from_be_bytes([self.bytes[18], self.bytes[19]])
    }
}

/// Mutable view of a TCP header, used when synthesizing segments.
#[derive(Debug)]
pub struct TcpHdrMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> TcpHdrMut<'a> {
    /// Lays the view over `bytes`. Returns `None` when fewer than
    /// [`TCP_HDR_LEN`] bytes are available.
    pub fn new(bytes: &'a mut [u8]) -> Option<Self> {
        if bytes.len() < TCP_HDR_LEN {
            return None;
        }
        Some(Self { bytes })
    }

    /// Writes the source port in network byte order.
    #[inline]
    pub fn set_src_port(&mut self, port: u16) {
        self.bytes[0..2].copy_from_slice(&port.to_be_bytes());
    }

    /// Writes the destination port in network byte order.
    #[inline]
    pub fn set_dst_port(&mut self, port: u16) {
        self.bytes[2..4].copy_from_slice(&port.to_be_bytes());
    }

    /// Writes the sequence number in network byte order.
    #[inline]
    pub fn set_seq(&mut self, seq: u32) {
        self.bytes[4..8].copy_from_slice(&seq.to_be_bytes());
    }

    /// Writes the acknowledgment sequence number in network byte order.
    #[inline]
    pub fn set_ack(&mut self, ack: u32) {
        self.bytes[8..12].copy_from_slice(&ack.to_be_bytes());
    }

    /// Writes the data offset in 32-bit words, clearing the reserved bits.
    #[inline]
    pub fn set_data_offset(&mut self, words: u8) {
        self.bytes[12] = (words & 0x0F) << 4;
    }

    /// Writes the TCP flags.
    #[inline]
    pub fn set_flags(&mut self, flags: u8) {
        self.bytes[13] = flags;
    }

    /// Writes the window size in network byte order.
    #[inline]
    pub fn set_window(&mut self, window: u16) {
        self.bytes[14..16].copy_from_slice(&window.to_be_bytes());
    }

    /// Writes the checksum in network byte order.
    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        self.bytes[16..18].copy_from_slice(&checksum.to_be_bytes());
    }

    /// Writes the urgent pointer in network byte order.
    #[inline]
    pub fn set_urg_ptr(&mut self, urg_ptr: u16) {
        self.bytes[18..20].copy_from_slice(&urg_ptr.to_be_bytes());
    }
}
