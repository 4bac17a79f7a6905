// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::confirmation::{Round, TxId};
use crate::key::{Account, Address};
use crate::serialize::{base32_encode, Base64StrVisitor, MsgPackWriter};
use ed25519_dalek::Signature;
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha512_256};

/// Domain separation prefix for transaction ids and signatures.
const TX_TAG: &[u8] = b"TX";
/// How many rounds after `first_valid` the node still accepts a transaction.
pub const VALIDITY_WINDOW: Round = 1000;
/// Bytes a signature envelope adds to the encoded transaction.
const SIGNATURE_OVERHEAD: usize = 75;

/// Parameters the node suggests for new transactions.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SuggestedParams {
    /// Fee per byte, in microAlgos.
    pub fee: u64,
    #[serde(rename = "min-fee")]
    pub min_fee: u64,
    #[serde(rename = "genesis-id")]
    pub genesis_id: String,
    #[serde(rename = "genesis-hash", deserialize_with = "deserialize_genesis_hash")]
    pub genesis_hash: [u8; 32],
    #[serde(rename = "last-round")]
    pub last_round: Round,
}

fn deserialize_genesis_hash<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    let v = deserializer.deserialize_str(Base64StrVisitor::with_size(32))?;
    let mut ret = [0u8; 32];
    ret.copy_from_slice(&v);
    Ok(ret)
}

enum Field {
    Uint(u64),
    Str(String),
    Bin(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub fee: u64,
    pub first_valid: Round,
    pub last_valid: Round,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    /// Hands signing authority of `sender` to this address.
    pub rekey_to: Option<Address>,
    /// Sends whatever is left in `sender` here and closes it.
    pub close_remainder_to: Option<Address>,
}

impl PaymentTransaction {
    pub fn new(
        sender: Address,
        receiver: Address,
        amount: u64,
        params: &SuggestedParams,
    ) -> PaymentTransaction {
        let mut txn = PaymentTransaction {
            sender,
            receiver,
            amount,
            fee: params.min_fee,
            first_valid: params.last_round,
            last_valid: params.last_round + VALIDITY_WINDOW,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            rekey_to: None,
            close_remainder_to: None,
        };
        txn.fee = txn.estimate_fee(params);
        txn
    }

    pub fn rekey_to(mut self, authority: Address, params: &SuggestedParams) -> Self {
        self.rekey_to = Some(authority);
        self.fee = self.estimate_fee(params);
        self
    }

    pub fn close_remainder_to(mut self, to: Address, params: &SuggestedParams) -> Self {
        self.close_remainder_to = Some(to);
        self.fee = self.estimate_fee(params);
        self
    }

    /// Per byte fee on the signed size, but never below the minimum fee.
    fn estimate_fee(&self, params: &SuggestedParams) -> u64 {
        let size = (self.encode().len() + SIGNATURE_OVERHEAD) as u64;
        std::cmp::max(params.min_fee, params.fee * size)
    }

    /// Canonical msgpack: keys sorted, zero values left out.
    pub fn encode(&self) -> Vec<u8> {
        let mut fields: Vec<(&str, Field)> = Vec::new();
        if self.amount != 0 {
            fields.push(("amt", Field::Uint(self.amount)));
        }
        if let Some(to) = self.close_remainder_to {
            fields.push(("close", Field::Bin(to.as_bytes().to_vec())));
        }
        if self.fee != 0 {
            fields.push(("fee", Field::Uint(self.fee)));
        }
        if self.first_valid != 0 {
            fields.push(("fv", Field::Uint(self.first_valid)));
        }
        if !self.genesis_id.is_empty() {
            fields.push(("gen", Field::Str(self.genesis_id.clone())));
        }
        fields.push(("gh", Field::Bin(self.genesis_hash.to_vec())));
        if self.last_valid != 0 {
            fields.push(("lv", Field::Uint(self.last_valid)));
        }
        if self.receiver.as_bytes() != &[0u8; 32] {
            fields.push(("rcv", Field::Bin(self.receiver.as_bytes().to_vec())));
        }
        if let Some(authority) = self.rekey_to {
            fields.push(("rekey", Field::Bin(authority.as_bytes().to_vec())));
        }
        fields.push(("snd", Field::Bin(self.sender.as_bytes().to_vec())));
        fields.push(("type", Field::Str("pay".to_string())));
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let mut w = MsgPackWriter::new();
        w.map(fields.len());
        for (key, value) in &fields {
            w.str(key);
            match value {
                Field::Uint(v) => w.uint(*v),
                Field::Str(s) => w.str(s),
                Field::Bin(b) => w.bin(b),
            };
        }
        w.into_bytes()
    }

    fn bytes_to_sign(&self) -> Vec<u8> {
        let mut data = TX_TAG.to_vec();
        data.extend_from_slice(&self.encode());
        data
    }

    pub fn id(&self) -> TxId {
        TxId::new(base32_encode(&Sha512_256::digest(&self.bytes_to_sign())))
    }

    /// Signs with `signer`. When `signer` is not the sender, the sender must
    /// have been rekeyed to it, and the envelope names it as the authorizer.
    pub fn sign(&self, signer: &Account) -> SignedTransaction {
        let signer_address = signer.address();
        SignedTransaction {
            signature: signer.sign(&self.bytes_to_sign()),
            auth_address: if signer_address != self.sender {
                Some(signer_address)
            } else {
                None
            },
            transaction: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction: PaymentTransaction,
    pub signature: Signature,
    pub auth_address: Option<Address>,
}

impl SignedTransaction {
    pub fn id(&self) -> TxId {
        self.transaction.id()
    }

    /// Bytes accepted by the node's raw transaction endpoint.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = MsgPackWriter::new();
        match self.auth_address {
            Some(authority) => {
                w.map(3).str("sgnr").bin(authority.as_bytes());
            }
            None => {
                w.map(2);
            }
        }
        w.str("sig").bin(&self.signature.to_bytes());
        w.str("txn").raw(&self.transaction.encode());
        w.into_bytes()
    }
}
