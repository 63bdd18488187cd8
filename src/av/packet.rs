use bytes::Bytes;

/// One logical packet of an elementary stream.
///
/// `granulepos` is -1 when the packet carries no position of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Bytes,
    pub granulepos: i64,
    pub packetno: i64,
    pub bos: bool,
    pub eos: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            granulepos: 0,
            packetno: 0,
            bos: false,
            eos: false,
        }
    }

    pub fn with_granulepos(mut self, granulepos: i64) -> Self {
        self.granulepos = granulepos;
        self
    }

    pub fn with_packetno(mut self, packetno: i64) -> Self {
        self.packetno = packetno;
        self
    }

    pub fn with_bos(mut self, bos: bool) -> Self {
        self.bos = bos;
        self
    }

    pub fn with_eos(mut self, eos: bool) -> Self {
        self.eos = eos;
        self
    }

    /// First payload byte, which carries the packet type and lacing bits.
    pub fn flags(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<ogg::Packet> for Packet {
    fn from(packet: ogg::Packet) -> Self {
        let granulepos = if packet.last_in_page() {
            packet.absgp_page() as i64
        } else {
            -1
        };
        Packet {
            bos: packet.first_in_stream(),
            eos: packet.last_in_stream(),
            granulepos,
            packetno: 0,
            data: Bytes::from(packet.data),
        }
    }
}
