// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::errors::Error;
use crate::serialize::{base32_decode, base32_encode};
use bip39::Language;
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha512_256};
use std::fmt;
use std::str::FromStr;

const MNEMONIC_WORDS: usize = 25;

/// Account address: the ed25519 public key. Its text form is the base32 of the
/// key followed by a 4 byte checksum.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Address([u8; 32]);

impl Address {
    const LEN: usize = 32;
    const CHECKSUM_LEN: usize = 4;

    pub fn from_slice(sl: &[u8]) -> Result<Address, Error> {
        if sl.len() != Self::LEN {
            Err(Error::InvalidLength(Self::LEN, sl.len()))
        } else {
            let mut ret = [0; 32];
            ret.copy_from_slice(sl);
            Ok(Address(ret))
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn checksum(&self) -> [u8; 4] {
        let hash = Sha512_256::digest(&self.0[..]);
        let mut ret = [0; 4];
        ret.copy_from_slice(&hash[(hash.len() - Self::CHECKSUM_LEN)..]);
        ret
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = self.0.to_vec();
        data.extend_from_slice(&self.checksum());
        write!(f, "{}", base32_encode(&data))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = base32_decode(s)?;
        if decoded.len() != Self::LEN + Self::CHECKSUM_LEN {
            return Err(Error::InvalidAddress(format!(
                "'{}' decodes to {} bytes, expected {}",
                s,
                decoded.len(),
                Self::LEN + Self::CHECKSUM_LEN
            )));
        }
        let address = Address::from_slice(&decoded[..Self::LEN])?;
        if address.checksum()[..] != decoded[Self::LEN..] {
            return Err(Error::InvalidAddress(format!(
                "'{}' has an invalid checksum",
                s
            )));
        }
        Ok(address)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A keypair able to sign for its own address, or for any address rekeyed to it.
pub struct Account {
    signing_key: SigningKey,
}

impl Account {
    pub fn generate() -> Account {
        let mut rng = OsRng;
        Account {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Account {
        Account {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restores an account from its 25 word mnemonic.
    pub fn from_mnemonic(phrase: &str) -> Result<Account, Error> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if words.len() != MNEMONIC_WORDS {
            return Err(Error::InvalidMnemonic(format!(
                "expected {} words, got {}",
                MNEMONIC_WORDS,
                words.len()
            )));
        }

        let mut indexes = Vec::with_capacity(MNEMONIC_WORDS);
        for word in &words {
            match Language::English.find_word(word) {
                Some(i) => indexes.push(i),
                None => {
                    return Err(Error::InvalidMnemonic(format!(
                        "'{}' is not in the word list",
                        word
                    )))
                }
            }
        }

        let checksum = indexes.pop().unwrap_or_default();
        let mut bytes = from_uint11(&indexes);
        // 24 words carry 264 bits; the trailing byte must be padding.
        if bytes.len() != 33 || bytes[32] != 0 {
            return Err(Error::InvalidMnemonic(
                "words do not decode to a 32 byte key".to_string(),
            ));
        }
        bytes.truncate(32);
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);

        if checksum_index(&seed) != checksum {
            return Err(Error::InvalidMnemonic("checksum word mismatch".to_string()));
        }
        Ok(Account::from_seed(&seed))
    }

    pub fn mnemonic(&self) -> String {
        let seed = self.signing_key.to_bytes();
        let list = Language::English.word_list();
        let mut words: Vec<&str> = to_uint11(&seed)
            .into_iter()
            .map(|i| list[i as usize])
            .collect();
        words.push(list[checksum_index(&seed) as usize]);
        words.join(" ")
    }

    pub fn address(&self) -> Address {
        Address(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.address())
    }
}

fn checksum_index(seed: &[u8; 32]) -> u16 {
    let hash = Sha512_256::digest(&seed[..]);
    to_uint11(&hash[..2])[0]
}

/// Packs bytes little-endian into 11 bit groups.
fn to_uint11(bytes: &[u8]) -> Vec<u16> {
    let mut out = Vec::new();
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in bytes {
        buffer |= u32::from(*byte) << bits;
        bits += 8;
        if bits >= 11 {
            out.push((buffer & 0x7ff) as u16);
            buffer >>= 11;
            bits -= 11;
        }
    }
    if bits != 0 {
        out.push((buffer & 0x7ff) as u16);
    }
    out
}

fn from_uint11(groups: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for group in groups {
        buffer |= u32::from(*group) << bits;
        bits += 11;
        while bits >= 8 {
            out.push((buffer & 0xff) as u8);
            buffer >>= 8;
            bits -= 8;
        }
    }
    if bits != 0 {
        out.push((buffer & 0xff) as u8);
    }
    out
}
