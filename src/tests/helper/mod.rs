use crate::rpc::AccountInformation;
use crate::key::Address;
use crate::transaction::SuggestedParams;

pub mod node;
pub mod rpc;

pub fn enable_log(log_level: Option<log::Level>) {
    if let Some(level) = log_level {
        std::env::set_var("RUST_LOG", level.to_string());
    } else {
        std::env::set_var("RUST_LOG", "TRACE");
    }

    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parameters as a fresh local network hands them out.
pub fn suggested_params(last_round: u64) -> SuggestedParams {
    SuggestedParams {
        fee: 0,
        min_fee: 1000,
        genesis_id: "dockernet-v1".to_string(),
        genesis_hash: [0xbf; 32],
        last_round,
    }
}

pub fn account_info(address: Address, amount: u64, auth_addr: Option<Address>) -> AccountInformation {
    AccountInformation {
        address,
        amount,
        min_balance: 100_000,
        auth_addr,
    }
}
