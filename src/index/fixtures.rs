use byteorder::{LittleEndian, WriteBytesExt};

/// Little-endian byte builder for synthetic index buffers.
#[derive(Default)]
pub(crate) struct IndexBuilder {
    buf: Vec<u8>,
}

impl IndexBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub(crate) fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.write_u32::<LittleEndian>(v).unwrap();
        self
    }

    pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.write_u64::<LittleEndian>(v).unwrap();
        self
    }

    pub(crate) fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    /// u32 unit count followed by UTF-16LE units.
    pub(crate) fn utf16(&mut self, s: &str) -> &mut Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.u32(units.len() as u32);
        for u in units {
            self.buf.write_u16::<LittleEndian>(u).unwrap();
        }
        self
    }

    /// `seq` byte, 4 reserved zero bytes, then the raw GUID.
    pub(crate) fn record_tail(&mut self, seq: u8, guid: &[u8; 16]) -> &mut Self {
        self.u8(seq).bytes(&[0; 4]).bytes(guid)
    }

    pub(crate) fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        self.buf.clone()
    }
}
