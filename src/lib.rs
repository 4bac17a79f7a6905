// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

pub mod command_args;
pub mod confirmation;
pub mod errors;
pub mod key;
pub mod rpc;
pub mod serialize;
pub mod signal;
pub mod transaction;
pub mod workflow;

#[cfg(test)]
pub mod tests;
