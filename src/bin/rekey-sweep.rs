// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use rekey_sweep::command_args::{get_options, AlgodConfig, CommandArgs};
use rekey_sweep::errors::Error;
use rekey_sweep::key::Account;
use rekey_sweep::rpc::Rpc;
use rekey_sweep::signal::set_stop_signal_handler;
use rekey_sweep::workflow::AccountManager;

/// Creates two accounts on the node, funds them from the dispenser, rekeys
/// A to B and sweeps A into B.
/// command example:
/// ./target/debug/rekey-sweep --algod-host=http://localhost --algod-port=4001 --dispenser-mnemonic="..." --max-rounds=20
fn main() {
    let matches = get_options().get_matches();
    let configs = match CommandArgs::load(matches) {
        Ok(c) => c,
        Err(e) => exit_with(e),
    };

    let general_config = configs.general_config();
    if !general_config.log_quiet() {
        let env_value = format!("rekey_sweep={}", general_config.log_level());
        std::env::set_var("RUST_LOG", env_value);
        env_logger::init();
    }

    if let Err(e) = run(&configs) {
        exit_with(e);
    }
}

fn run(configs: &CommandArgs) -> Result<(), Error> {
    let stop_signal = set_stop_signal_handler()?;

    let dispenser = Account::from_mnemonic(configs.dispenser_config().mnemonic()?)?;
    log::info!("Dispenser: {}", dispenser.address());

    let workflow_config = configs.workflow_config();
    let rpc = connect_rpc(&configs.algod_config())?;
    let mut manager = AccountManager::new(
        rpc,
        dispenser,
        workflow_config.funding_amount()?,
        workflow_config.wait_options()?,
    );
    manager.stop_handler(stop_signal);

    let report = manager.run()?;
    println!("Initial balances:\n{}", report.initial);
    println!("After funding:\n{}", report.funded);
    println!("Swept {} microAlgos from Account A to Account B", report.swept);
    println!("Final balances:\n{}", report.last);
    Ok(())
}

fn connect_rpc(algod_config: &AlgodConfig) -> Result<Rpc, Error> {
    let url = algod_config.url();
    let rpc = Rpc::new(url.clone(), algod_config.token().to_string())?;
    rpc.test_connection().map_err(|e| {
        log::error!(
            "algod connect failed. Please confirm algod connection info. url: {}",
            url
        );
        e
    })?;
    Ok(rpc)
}

fn exit_with(e: Error) -> ! {
    log::error!("{}", e);
    eprintln!("{}", e);
    std::process::exit(1);
}
