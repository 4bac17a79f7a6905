// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

//! Creates two accounts, funds them, rekeys A to B and sweeps A into B.

use crate::confirmation::{ConfirmationWaiter, Round, TxId, WaitOptions};
use crate::errors::Error;
use crate::key::Account;
use crate::rpc::AlgodApi;
use crate::signal::StopSignal;
use crate::transaction::{PaymentTransaction, SignedTransaction};
use std::fmt;

pub const DEFAULT_FUNDING_AMOUNT: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub a: u64,
    pub b: u64,
}

impl fmt::Display for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Account A balance: {} microAlgos\nAccount B balance: {} microAlgos",
            self.a, self.b
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub initial: Balances,
    pub funded: Balances,
    pub swept: u64,
    pub last: Balances,
}

pub struct AccountManager<T: AlgodApi> {
    rpc: T,
    dispenser: Account,
    accounts: Option<(Account, Account)>,
    funding_amount: u64,
    wait_options: WaitOptions,
    stop_signal: Option<StopSignal>,
    rekey_round: Option<Round>,
}

impl<T: AlgodApi> AccountManager<T> {
    pub fn new(rpc: T, dispenser: Account, funding_amount: u64, wait_options: WaitOptions) -> Self {
        AccountManager {
            rpc,
            dispenser,
            accounts: None,
            funding_amount,
            wait_options,
            stop_signal: None,
            rekey_round: None,
        }
    }

    pub fn stop_handler(&mut self, stop_signal: StopSignal) {
        self.stop_signal = Some(stop_signal);
    }

    pub fn rpc(&self) -> &T {
        &self.rpc
    }

    pub fn create_accounts(&mut self) {
        self.set_accounts(Account::generate(), Account::generate());
    }

    pub fn set_accounts(&mut self, a: Account, b: Account) {
        log::info!("Created Account A: {}", a.address());
        log::info!("Created Account B: {}", b.address());
        self.accounts = Some((a, b));
        self.rekey_round = None;
    }

    pub fn accounts(&self) -> Result<(&Account, &Account), Error> {
        match &self.accounts {
            Some((a, b)) => Ok((a, b)),
            None => Err(Error::PreconditionFailed(
                "accounts are not created yet".to_string(),
            )),
        }
    }

    pub fn balances(&self) -> Result<Balances, Error> {
        let (a, b) = self.accounts()?;
        let balances = Balances {
            a: self.rpc.account_information(&a.address())?.amount,
            b: self.rpc.account_information(&b.address())?.amount,
        };
        log::info!("Account A balance: {} microAlgos", balances.a);
        log::info!("Account B balance: {} microAlgos", balances.b);
        Ok(balances)
    }

    /// Pays `funding_amount` from the dispenser to both accounts.
    pub fn fund_accounts(&self) -> Result<(), Error> {
        self.fund().map_err(Error::step("funding accounts"))?;
        log::info!(
            "Successfully funded both accounts with {} microAlgos each",
            self.funding_amount
        );
        Ok(())
    }

    fn fund(&self) -> Result<(), Error> {
        let (a, b) = self.accounts()?;
        let params = self.rpc.suggested_params()?;
        let dispenser = self.dispenser.address();

        let txn_a = PaymentTransaction::new(dispenser, a.address(), self.funding_amount, &params);
        let txn_b = PaymentTransaction::new(dispenser, b.address(), self.funding_amount, &params);

        let txid_a = self.submit(&txn_a.sign(&self.dispenser))?;
        let txid_b = self.submit(&txn_b.sign(&self.dispenser))?;
        self.waiter().wait(&txid_a)?;
        self.waiter().wait(&txid_b)?;
        Ok(())
    }

    /// Makes Account B the signing authority of Account A.
    pub fn rekey_account_a(&mut self) -> Result<Round, Error> {
        let round = self.rekey().map_err(Error::step("rekeying account"))?;
        self.rekey_round = Some(round);
        log::info!("Successfully rekeyed Account A to Account B in round {}", round);
        Ok(round)
    }

    fn rekey(&self) -> Result<Round, Error> {
        let (a, b) = self.accounts()?;
        let params = self.rpc.suggested_params()?;
        let txn = PaymentTransaction::new(a.address(), a.address(), 0, &params)
            .rekey_to(b.address(), &params);
        let txid = self.submit(&txn.sign(a))?;
        self.waiter().wait(&txid)
    }

    /// Moves everything held by Account A to Account B, signed with B's key.
    /// Returns the amount moved.
    pub fn transfer(&self) -> Result<u64, Error> {
        let swept = self.sweep().map_err(Error::step("transferring Algos"))?;
        log::info!(
            "Successfully transferred {} microAlgos from Account A to Account B",
            swept
        );
        Ok(swept)
    }

    fn sweep(&self) -> Result<u64, Error> {
        let (a, b) = self.accounts()?;
        let rekey_round = self.rekey_round.ok_or_else(|| {
            Error::PreconditionFailed("Account A must be rekeyed before the transfer".to_string())
        })?;

        let info = self.rpc.account_information(&a.address())?;
        if info.auth_addr != Some(b.address()) {
            return Err(Error::PreconditionFailed(format!(
                "Account A is authorized by {:?}, expected {} (rekeyed in round {})",
                info.auth_addr,
                b.address(),
                rekey_round
            )));
        }

        let params = self.rpc.suggested_params()?;
        let txn = PaymentTransaction::new(a.address(), b.address(), 0, &params)
            .close_remainder_to(b.address(), &params);
        if info.amount <= txn.fee {
            return Err(Error::InsufficientFunds {
                balance: info.amount,
                fee: txn.fee,
            });
        }

        let txid = self.submit(&txn.sign(b))?;
        self.waiter().wait(&txid)?;
        Ok(info.amount - txn.fee)
    }

    /// Runs every step in order, reporting balances along the way. Fresh
    /// accounts are generated unless some were set before.
    pub fn run(&mut self) -> Result<WorkflowReport, Error> {
        if self.accounts.is_none() {
            self.create_accounts();
        }
        let initial = self.balances()?;

        self.fund_accounts()?;
        let funded = self.balances()?;

        self.rekey_account_a()?;
        let swept = self.transfer()?;

        let last = self.balances()?;
        Ok(WorkflowReport {
            initial,
            funded,
            swept,
            last,
        })
    }

    fn submit(&self, signed: &SignedTransaction) -> Result<TxId, Error> {
        let txid = self.rpc.send_raw_transaction(&signed.encode())?;
        log::debug!("Submitted transaction {} (local id {})", txid, signed.id());
        Ok(txid)
    }

    fn waiter(&self) -> ConfirmationWaiter<T> {
        let mut waiter = ConfirmationWaiter::new(&self.rpc, self.wait_options.clone());
        if let Some(stop_signal) = &self.stop_signal {
            waiter.stop_handler(stop_signal.clone());
        }
        waiter
    }
}
