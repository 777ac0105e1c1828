//! Template-style DER helpers for the fixed structures the pipeline emits.
//!
//! The pipeline never needs a general ASN.1 codec. It writes extension
//! values, GeneralNames and a couple of PKCS#7/CMMF envelopes by filling
//! variable fields into known TLV shapes, and reads back only what it wrote.

use thiserror::Error;

// Universal tags
pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTF8_STRING: u8 = 0x0C;
pub const TAG_PRINTABLE_STRING: u8 = 0x13;
pub const TAG_IA5_STRING: u8 = 0x16;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// Context-specific tag number `n`, primitive form.
pub const fn context_primitive(n: u8) -> u8 {
    0x80 | n
}

/// Context-specific tag number `n`, constructed form.
pub const fn context_constructed(n: u8) -> u8 {
    0xA0 | n
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("unsupported length encoding {0:#04x}")]
    UnsupportedLength(u8),
    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("{0} trailing bytes after value")]
    TrailingData(usize),
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
    #[error("invalid string value: {0}")]
    InvalidString(String),
}

/// Encode a DER length field into the buffer: short form below 128,
/// otherwise the minimal big-endian long form.
pub fn encode_length(buf: &mut Vec<u8>, len: usize) {
    if len < 128 {
        buf.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.push(0x80 | (bytes.len() - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

/// Write a DER TLV (tag-length-value) to a buffer.
pub fn write_tlv(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    buf.push(tag);
    encode_length(buf, value.len());
    buf.extend_from_slice(value);
}

/// Return a fresh TLV.
pub fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.len() + 4);
    write_tlv(&mut buf, tag, value);
    buf
}

/// Encode a u64 as an ASN.1 INTEGER.
/// Handles leading zero byte for positive integers whose MSB is set.
pub fn encode_integer_u64(buf: &mut Vec<u8>, value: u64) {
    buf.push(TAG_INTEGER);

    if value == 0 {
        buf.push(0x01);
        buf.push(0x00);
        return;
    }

    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 && bytes[start] == 0 {
        start += 1;
    }

    let needs_leading_zero = bytes[start] & 0x80 != 0;
    let len = 8 - start + usize::from(needs_leading_zero);

    buf.push(len as u8);
    if needs_leading_zero {
        buf.push(0x00);
    }
    buf.extend_from_slice(&bytes[start..]);
}

/// Encode `true`/`false` as an ASN.1 BOOLEAN.
pub fn encode_boolean(buf: &mut Vec<u8>, value: bool) {
    buf.extend_from_slice(&[TAG_BOOLEAN, 0x01, if value { 0xFF } else { 0x00 }]);
}

/// Encode the content octets of a dotted-decimal OID (no tag or length).
pub fn encode_oid(dotted: &str) -> Result<Vec<u8>, DerError> {
    let invalid = || DerError::InvalidOid(dotted.to_string());
    let arcs = dotted
        .split('.')
        .map(|arc| arc.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(invalid());
    }

    let mut out = Vec::with_capacity(arcs.len() + 2);
    let first = arcs[0]
        .checked_mul(40)
        .and_then(|v| v.checked_add(arcs[1]))
        .ok_or_else(invalid)?;
    encode_base128(&mut out, first);
    for arc in &arcs[2..] {
        encode_base128(&mut out, *arc);
    }
    Ok(out)
}

fn encode_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut stack = [0u8; 10];
    let mut n = 0;
    loop {
        stack[n] = (value & 0x7F) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0x00 } else { 0x80 };
        out.push(stack[i] | continuation);
    }
}

/// Decode the content octets of an OID into dotted-decimal text.
pub fn decode_oid(content: &[u8]) -> Result<String, DerError> {
    if content.is_empty() {
        return Err(DerError::InvalidOid("empty".into()));
    }
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    for (i, byte) in content.iter().enumerate() {
        if value > u64::MAX >> 7 {
            return Err(DerError::InvalidOid("arc overflow".into()));
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let (first, second) = match value {
                    v if v < 40 => (0, v),
                    v if v < 80 => (1, v - 40),
                    v => (2, v - 80),
                };
                arcs.push(first);
                arcs.push(second);
            } else {
                arcs.push(value);
            }
            value = 0;
        } else if i == content.len() - 1 {
            return Err(DerError::Truncated);
        }
    }
    Ok(arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

/// Read a DER length encoding, returning (length, bytes_consumed).
pub fn read_length(data: &[u8]) -> Result<(usize, usize), DerError> {
    let first = *data.first().ok_or(DerError::Truncated)?;
    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    let count = (first & 0x7F) as usize;
    if count == 0 || count > std::mem::size_of::<usize>() {
        return Err(DerError::UnsupportedLength(first));
    }
    let digits = data.get(1..=count).ok_or(DerError::Truncated)?;
    let len = digits.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((len, 1 + count))
}

/// One decoded TLV borrowed from its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Sequential reader over concatenated TLVs.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the next TLV, whatever its tag.
    pub fn read_any(&mut self) -> Result<Tlv<'a>, DerError> {
        let tag = *self.data.first().ok_or(DerError::Truncated)?;
        let (len, header) = read_length(&self.data[1..])?;
        let start = 1 + header;
        let end = start.checked_add(len).ok_or(DerError::Truncated)?;
        if end > self.data.len() {
            return Err(DerError::Truncated);
        }
        let value = &self.data[start..end];
        self.data = &self.data[end..];
        Ok(Tlv { tag, value })
    }

    /// Read the next TLV and require `tag`.
    pub fn read_expected(&mut self, tag: u8) -> Result<&'a [u8], DerError> {
        let tlv = self.read_any()?;
        if tlv.tag != tag {
            return Err(DerError::UnexpectedTag {
                expected: tag,
                found: tlv.tag,
            });
        }
        Ok(tlv.value)
    }

    /// Require that nothing is left.
    pub fn finish(self) -> Result<(), DerError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(DerError::TrailingData(self.data.len()))
        }
    }
}

/// Check that `der` is exactly one SEQUENCE TLV with nothing trailing.
pub fn ensure_single_sequence(der: &[u8]) -> Result<(), DerError> {
    let mut reader = Reader::new(der);
    reader.read_expected(TAG_SEQUENCE)?;
    reader.finish()
}
