//! Codec capability surface and dispatch.
//!
//! Each protocol codec exposes the same capability set — decode, encode,
//! update, format — and is found by table lookup keyed on the IP protocol
//! number it registered for.

pub mod tcp;

use std::{collections::HashMap, sync::Arc};

use crate::{conf::DecoderConf, error::Result, events::EventSink, packet::Packet};

/// Kind of response segment to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeType {
    TcpRst,
    TcpFin,
    TcpPush,
}

/// Direction and sequence adjustment for an encode request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeFlags {
    /// Swap endpoints relative to the source packet.
    pub reverse: bool,
    /// Signed adjustment applied to the synthesized sequence number.
    pub seq_delta: Option<i32>,
}

/// State threaded through the encoders while building a response packet.
pub struct EncState<'p> {
    pub kind: EncodeType,
    pub flags: EncodeFlags,
    /// Payload appended to FIN and PUSH responses.
    pub payload: Option<&'p [u8]>,
    /// Source packet the response answers.
    pub pkt: &'p Packet<'p>,
    /// Protocol number of the innermost encoded layer, recorded for outer
    /// layers to checksum against.
    pub proto: u8,
}

impl<'p> EncState<'p> {
    pub fn new(kind: EncodeType, flags: EncodeFlags, pkt: &'p Packet<'p>) -> Self {
        Self {
            kind,
            flags,
            payload: None,
            pkt,
            proto: 0,
        }
    }
}

/// Output buffer for encoders. Layers are written innermost-first, so the
/// used region grows backward from the end of the caller's storage. A grow
/// that would pass the front of the storage fails and leaves the contents
/// unchanged.
#[derive(Debug)]
pub struct EncBuffer<'b> {
    data: &'b mut [u8],
    base: usize,
}

impl<'b> EncBuffer<'b> {
    pub fn new(data: &'b mut [u8]) -> Self {
        let base = data.len();
        Self { data, base }
    }

    /// Reserves `n` more bytes at the front of the used region.
    #[must_use]
    pub fn grow(&mut self, n: usize) -> bool {
        if n > self.base {
            return false;
        }
        self.base -= n;
        true
    }

    /// The used region, innermost layer first.
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.base..]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.base..]
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.base
    }

    pub fn is_empty(&self) -> bool {
        self.base == self.data.len()
    }
}

/// Capability set every protocol codec exposes.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// IP protocol numbers this codec decodes.
    fn protocol_ids(&self) -> &'static [u8];

    /// Decodes one layer from `raw`, mutating `p` and setting `lyr_len` to
    /// the bytes this layer consumed. `next_proto` names the encapsulated
    /// protocol when the layer is not terminal. Returns `false` on decode
    /// failure, in which case the layer's reference on `p` is cleared and
    /// `lyr_len` must not be trusted.
    fn decode<'p>(
        &self,
        raw: &'p [u8],
        p: &mut Packet<'p>,
        lyr_len: &mut u16,
        next_proto: &mut Option<u8>,
    ) -> bool;

    /// Synthesizes a response layer into `out`, answering the source packet
    /// held by `enc`. `raw_in` is this layer's header in the source packet.
    /// Returns `false` when the output buffer refuses to grow, leaving `out`
    /// unchanged.
    fn encode(&self, enc: &mut EncState<'_>, out: &mut EncBuffer<'_>, raw_in: &[u8]) -> bool;

    /// Recomputes derived fields after a later stage edited the payload.
    /// `layer` spans this layer's header through the end of the segment;
    /// `len` accumulates the byte count the caller is rebuilding.
    fn update(&self, p: &Packet<'_>, layer: &mut [u8], len: &mut u32) -> bool;

    /// Refreshes a cloned layer. `src_layer` is the matching layer in the
    /// packet the clone was made from; a reversed clone gets its endpoints
    /// swapped.
    fn format<'p>(
        &self,
        flags: EncodeFlags,
        src_layer: &[u8],
        c: &mut Packet<'p>,
        layer: &'p mut [u8],
    );
}

/// Registry mapping IP protocol numbers to their codec.
#[derive(Default)]
pub struct CodecRegistry {
    by_proto: HashMap<u8, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `codec` under each protocol id it reports.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        for &proto in codec.protocol_ids() {
            self.by_proto.insert(proto, Arc::clone(&codec));
        }
    }

    pub fn get(&self, proto: u8) -> Option<&Arc<dyn Codec>> {
        self.by_proto.get(&proto)
    }
}

/// Descriptor a codec registers itself with. `pinit` runs once at module
/// load and its failure is terminal; `pterm` is the paired teardown at
/// module unload.
pub struct CodecPlugin {
    pub name: &'static str,
    pub pinit: fn() -> Result<()>,
    pub pterm: fn(),
    pub ctor: fn(Arc<DecoderConf>, Arc<dyn EventSink>) -> Arc<dyn Codec>,
}
