// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::confirmation::{ConfirmationStatus, Round, TxId};
use crate::errors::Error;
use crate::key::Address;
use crate::transaction::SuggestedParams;
use log::Level::Trace;
use log::{log_enabled, trace};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const API_TOKEN_HEADER: &str = "X-Algo-API-Token";
const BINARY_CONTENT_TYPE: &str = "application/x-binary";
/// The node answers wait-for-block-after within about a minute even when no
/// block arrives, so the request timeout must be above that.
const REQUEST_TIMEOUT_SECS: u64 = 90;

/// The node operations the confirmation waiter depends on.
pub trait LedgerApi {
    /// Latest finalized round known to the node.
    fn current_round(&self) -> Result<Round, Error>;
    fn status_of(&self, txid: &TxId) -> Result<ConfirmationStatus, Error>;
    /// Blocks until `round` or a later one is finalized, or until the node
    /// stops waiting. Returns the node's latest round, which is below `round`
    /// in the second case.
    fn await_round(&self, round: Round) -> Result<Round, Error>;
}

/// Everything else the account workflow asks of the node.
pub trait AlgodApi: LedgerApi {
    fn suggested_params(&self) -> Result<SuggestedParams, Error>;
    fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxId, Error>;
    fn account_information(&self, address: &Address) -> Result<AccountInformation, Error>;
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NodeStatus {
    #[serde(rename = "last-round")]
    pub last_round: Round,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PendingTransactionInfo {
    #[serde(rename = "confirmed-round", default)]
    pub confirmed_round: Option<Round>,
    #[serde(rename = "pool-error", default)]
    pub pool_error: String,
}

impl PendingTransactionInfo {
    pub fn status(&self) -> ConfirmationStatus {
        match self.confirmed_round {
            Some(round) if round > 0 => ConfirmationStatus::Confirmed(round),
            _ if !self.pool_error.is_empty() => {
                ConfirmationStatus::Failed(self.pool_error.clone())
            }
            _ => ConfirmationStatus::Pending,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountInformation {
    pub address: Address,
    pub amount: u64,
    #[serde(rename = "min-balance", default)]
    pub min_balance: u64,
    #[serde(rename = "auth-addr", default)]
    pub auth_addr: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct SendTransactionResult {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

pub struct Rpc {
    client: Client,
    url: String,
    token: String,
}

impl Rpc {
    pub fn new(url: String, token: String) -> Result<Rpc, Error> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Rpc {
            client,
            url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn test_connection(&self) -> Result<(), Error> {
        self.get::<NodeStatus>("/v2/status")?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = format!("{}{}", self.url, path);
        trace!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header(API_TOKEN_HEADER, &self.token)
            .send()?;
        Self::parse(resp)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &[u8]) -> Result<T, Error> {
        let url = format!("{}{}", self.url, path);
        if log_enabled!(Trace) {
            trace!("POST {} body: {}", url, hex::encode(body));
        }
        let resp = self
            .client
            .post(&url)
            .header(API_TOKEN_HEADER, &self.token)
            .header(CONTENT_TYPE, BINARY_CONTENT_TYPE)
            .body(body.to_vec())
            .send()?;
        Self::parse(resp)
    }

    fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
        let status = resp.status();
        let text = resp.text()?;
        trace!("response: {} {}", status, text);

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(ErrorResponse { message }) => message,
                Err(_) => text,
            };
            return Err(Error::Node {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl LedgerApi for Rpc {
    fn current_round(&self) -> Result<Round, Error> {
        Ok(self.get::<NodeStatus>("/v2/status")?.last_round)
    }

    fn status_of(&self, txid: &TxId) -> Result<ConfirmationStatus, Error> {
        let path = format!("/v2/transactions/pending/{}", txid);
        match self.get::<PendingTransactionInfo>(&path) {
            Ok(info) => Ok(info.status()),
            Err(Error::Node { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(
                ConfirmationStatus::Failed("transaction not found".to_string()),
            ),
            Err(e) => Err(e),
        }
    }

    fn await_round(&self, round: Round) -> Result<Round, Error> {
        // Answers once a block after the given round exists, or when the
        // node's own wait limit expires.
        let path = format!("/v2/status/wait-for-block-after/{}", round.saturating_sub(1));
        Ok(self.get::<NodeStatus>(&path)?.last_round)
    }
}

impl AlgodApi for Rpc {
    fn suggested_params(&self) -> Result<SuggestedParams, Error> {
        self.get("/v2/transactions/params")
    }

    fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxId, Error> {
        let result: SendTransactionResult = self.post("/v2/transactions", signed)?;
        Ok(TxId::new(result.tx_id))
    }

    fn account_information(&self, address: &Address) -> Result<AccountInformation, Error> {
        self.get(&format!("/v2/accounts/{}", address))
    }
}
