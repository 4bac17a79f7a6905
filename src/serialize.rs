// Copyright (c) 2019 Chaintope Inc.

use crate::errors::Error;
use serde::de;
use serde::de::{Unexpected, Visitor};
use std::fmt;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base32 without padding, as used for addresses and transaction ids.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in data {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

pub fn base32_decode(s: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in s.trim_end_matches('=').bytes() {
        let value = match BASE32_ALPHABET.iter().position(|a| *a == c) {
            Some(v) => v as u32,
            None => {
                return Err(Error::InvalidAddress(format!(
                    "'{}' is not a base32 character",
                    c as char
                )))
            }
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Ok(out)
}

/// Writer for the msgpack subset the node's canonical encoding uses:
/// maps, strings, unsigned integers and binary blobs.
pub struct MsgPackWriter {
    buf: Vec<u8>,
}

impl MsgPackWriter {
    pub fn new() -> Self {
        MsgPackWriter { buf: Vec::new() }
    }

    pub fn map(&mut self, len: usize) -> &mut Self {
        if len < 16 {
            self.buf.push(0x80 | len as u8);
        } else {
            self.buf.push(0xde);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        let len = s.len();
        if len < 32 {
            self.buf.push(0xa0 | len as u8);
        } else if len <= 0xff {
            self.buf.push(0xd9);
            self.buf.push(len as u8);
        } else {
            self.buf.push(0xda);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn uint(&mut self, v: u64) -> &mut Self {
        if v < 0x80 {
            self.buf.push(v as u8);
        } else if v <= 0xff {
            self.buf.push(0xcc);
            self.buf.push(v as u8);
        } else if v <= 0xffff {
            self.buf.push(0xcd);
            self.buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if v <= 0xffff_ffff {
            self.buf.push(0xce);
            self.buf.extend_from_slice(&(v as u32).to_be_bytes());
        } else {
            self.buf.push(0xcf);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    pub fn bin(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len <= 0xff {
            self.buf.push(0xc4);
            self.buf.push(len as u8);
        } else if len <= 0xffff {
            self.buf.push(0xc5);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xc6);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(data);
        self
    }

    /// Appends bytes that are already msgpack encoded.
    pub fn raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(encoded);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub struct Base64StrVisitor {
    /// Bytes size of a input. None allows variable size.
    static_size: Option<usize>,
}

impl Base64StrVisitor {
    pub fn with_size(s: usize) -> Self {
        Base64StrVisitor {
            static_size: Some(s),
        }
    }
}

impl<'de> Visitor<'de> for Base64StrVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string should be a base64 string")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match base64::decode(s) {
            Ok(v) => match self.static_size {
                Some(size) if size != v.len() => Err(de::Error::invalid_length(v.len(), &self)),
                _ => Ok(v),
            },
            Err(_) => Err(de::Error::invalid_value(Unexpected::Str(s), &self)),
        }
    }
}
