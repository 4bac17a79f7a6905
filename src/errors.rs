// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Json(serde_json::error::Error),
    /// The node answered with a non-success status code.
    Node { status: u16, message: String },
    InvalidLength(usize, usize),
    InvalidArgs(String),
    InvalidAddress(String),
    InvalidMnemonic(String),
    InvalidTomlFormat(toml::de::Error),
    ConfigFileIOError(std::io::Error),
    /// A stop signal handler could not be installed.
    SignalHandler(std::io::Error),
    /// The node will never include the transaction (expired, evicted, rejected).
    TerminalRejection(String),
    /// The round or wall-clock bound given to the waiter was reached.
    Timeout { rounds: u64, elapsed: Duration },
    /// Transient node failures outlasted the retry budget.
    NodeUnavailable { attempts: u32, last: Box<Error> },
    /// The stop signal was raised while waiting. Holds what raised it.
    Cancelled(&'static str),
    InsufficientFunds { balance: u64, fee: u64 },
    /// A workflow step ran before the step it depends on.
    PreconditionFailed(String),
    Step { step: &'static str, source: Box<Error> },
}

impl Error {
    /// Errors worth asking the node again for: transport failures and 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::Node { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn step(step: &'static str) -> impl FnOnce(Error) -> Error {
        move |source| Error::Step {
            step,
            source: Box::new(source),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Step { step, source } => write!(f, "Error {}: {}", step, source),
            Error::TerminalRejection(reason) => write!(f, "TerminalRejection: {}", reason),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Http(e)
    }
}

impl From<serde_json::error::Error> for Error {
    fn from(e: serde_json::error::Error) -> Error {
        Error::Json(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Error {
        Error::InvalidTomlFormat(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::ConfigFileIOError(e)
    }
}
