#![forbid(unsafe_code)]
//! Encoding and cursor utilities shared by the column codecs.

pub mod ord {
    //! Order-preserving encoders for numeric and string column components.

    use core::convert::TryInto;

    const U64_LEN: usize = core::mem::size_of::<u64>();
    const SIGN_BIT: u64 = 1 << 63;
    const STR_TERMINATOR: u8 = 0x00;
    const STR_ESCAPE: u8 = 0xFF;

    /// Appends `v` in big-endian order so byte comparison matches numeric order.
    pub fn push_u64(dst: &mut Vec<u8>, v: u64) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Decodes a u64 from big-endian byte order.
    pub fn get_u64_be(src: &[u8]) -> Option<u64> {
        let head = src.get(..U64_LEN)?;
        let bytes: [u8; U64_LEN] = head.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Appends a signed i64 with the sign bit flipped so negatives sort first.
    pub fn push_i64(dst: &mut Vec<u8>, v: i64) {
        push_u64(dst, (v as u64) ^ SIGN_BIT);
    }

    /// Decodes a signed i64 written by [`push_i64`].
    pub fn get_i64_be(src: &[u8]) -> Option<i64> {
        get_u64_be(src).map(|flipped| (flipped ^ SIGN_BIT) as i64)
    }

    /// Appends an f64 with order preservation (NaN not allowed).
    pub fn push_f64(dst: &mut Vec<u8>, v: f64) {
        debug_assert!(!v.is_nan(), "NaN column values are not allowed");
        push_u64(dst, encode_f64_bits(v));
    }

    /// Decodes an f64 written by [`push_f64`].
    pub fn get_f64_be(src: &[u8]) -> Option<f64> {
        get_u64_be(src).map(|bits| f64::from_bits(decode_f64_bits(bits)))
    }

    /// Appends a string so that encoded strings compare like the raw bytes.
    ///
    /// Zero bytes are escaped as `0x00 0xFF` and the value ends with `0x00 0x00`,
    /// which keeps a prefix sorting before every extension of it.
    pub fn push_str(dst: &mut Vec<u8>, s: &str) {
        for &b in s.as_bytes() {
            dst.push(b);
            if b == STR_TERMINATOR {
                dst.push(STR_ESCAPE);
            }
        }
        dst.push(STR_TERMINATOR);
        dst.push(STR_TERMINATOR);
    }

    /// Splits an escaped string, returning it and the number of bytes consumed.
    pub fn split_str(src: &[u8]) -> Option<(String, usize)> {
        let mut out = Vec::new();
        let mut idx = 0;
        loop {
            let b = *src.get(idx)?;
            if b != STR_TERMINATOR {
                out.push(b);
                idx += 1;
                continue;
            }
            match *src.get(idx + 1)? {
                STR_TERMINATOR => break,
                STR_ESCAPE => {
                    out.push(STR_TERMINATOR);
                    idx += 2;
                }
                _ => return None,
            }
        }
        let s = String::from_utf8(out).ok()?;
        Some((s, idx + 2))
    }

    fn encode_f64_bits(v: f64) -> u64 {
        let bits = v.to_bits();
        if bits & SIGN_BIT != 0 {
            !bits
        } else {
            bits ^ SIGN_BIT
        }
    }

    fn decode_f64_bits(encoded: u64) -> u64 {
        if encoded & SIGN_BIT != 0 {
            encoded ^ SIGN_BIT
        } else {
            !encoded
        }
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing column payloads.

    use core::fmt;

    use crate::types::{PenumbraError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or(PenumbraError::Corruption("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(PenumbraError::Corruption("column truncated"));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        pub fn take_u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        pub fn take_u64(&mut self) -> Result<u64> {
            let bytes = self.take(8)?;
            super::ord::get_u64_be(bytes).ok_or(PenumbraError::Corruption("u64 truncated"))
        }

        /// Returns the unread tail without advancing.
        pub fn rest(&self) -> &'a [u8] {
            &self.buf[self.off..]
        }

        pub fn advance(&mut self, n: usize) -> Result<()> {
            self.take(n).map(|_| ())
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
