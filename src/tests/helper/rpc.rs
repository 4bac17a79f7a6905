use crate::confirmation::{ConfirmationStatus, Round, TxId};
use crate::errors::Error;
use crate::key::Address;
use crate::rpc::{AccountInformation, AlgodApi, LedgerApi};
use crate::signal::StopSignal;
use crate::transaction::SuggestedParams;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Mock for Rpc
///
/// ## Example
///
/// ```ignore
/// // create instance.
/// let mut rpc = MockRpc::new();
///
/// // set stubs, they are answered in the order they were set.
/// rpc.should_call_current_round(Ok(100));
/// rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
/// rpc.should_call_await_round(Ok(101));
/// rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(101)));
///
/// // use rpc here ...
///
/// // check are there any remaining stub
/// rpc.assert();
/// ```
#[derive(Debug)]
pub struct MockRpc {
    current_round_results: RefCell<VecDeque<Result<Round, Error>>>,
    status_of_results: RefCell<VecDeque<Result<ConfirmationStatus, Error>>>,
    await_round_results: RefCell<VecDeque<Result<Round, Error>>>,
    suggested_params_results: RefCell<VecDeque<Result<SuggestedParams, Error>>>,
    send_raw_transaction_results: RefCell<VecDeque<Result<TxId, Error>>>,
    account_information_results: RefCell<VecDeque<Result<AccountInformation, Error>>>,
    awaited_rounds: RefCell<Vec<Round>>,
    status_calls: Cell<usize>,
    sent_transactions: RefCell<Vec<Vec<u8>>>,
    stop_on_await_round: Option<StopSignal>,
}

impl MockRpc {
    pub fn new() -> Self {
        MockRpc {
            current_round_results: RefCell::new(VecDeque::new()),
            status_of_results: RefCell::new(VecDeque::new()),
            await_round_results: RefCell::new(VecDeque::new()),
            suggested_params_results: RefCell::new(VecDeque::new()),
            send_raw_transaction_results: RefCell::new(VecDeque::new()),
            account_information_results: RefCell::new(VecDeque::new()),
            awaited_rounds: RefCell::new(Vec::new()),
            status_calls: Cell::new(0),
            sent_transactions: RefCell::new(Vec::new()),
            stop_on_await_round: None,
        }
    }

    pub fn assert(&self) {
        assert!(
            self.current_round_results.borrow().is_empty(),
            "current_round should be called once or more, but not."
        );
        assert!(
            self.status_of_results.borrow().is_empty(),
            "status_of should be called once or more, but not."
        );
        assert!(
            self.await_round_results.borrow().is_empty(),
            "await_round should be called once or more, but not."
        );
        assert!(
            self.suggested_params_results.borrow().is_empty(),
            "suggested_params should be called once or more, but not."
        );
        assert!(
            self.send_raw_transaction_results.borrow().is_empty(),
            "send_raw_transaction should be called once or more, but not."
        );
        assert!(
            self.account_information_results.borrow().is_empty(),
            "account_information should be called once or more, but not."
        );
    }

    pub fn should_call_current_round(&mut self, result: Result<Round, Error>) {
        self.current_round_results.borrow_mut().push_front(result);
    }

    pub fn should_call_status_of(&mut self, result: Result<ConfirmationStatus, Error>) {
        self.status_of_results.borrow_mut().push_front(result);
    }

    pub fn should_call_await_round(&mut self, result: Result<Round, Error>) {
        self.await_round_results.borrow_mut().push_front(result);
    }

    pub fn should_call_suggested_params(&mut self, result: Result<SuggestedParams, Error>) {
        self.suggested_params_results.borrow_mut().push_front(result);
    }

    pub fn should_call_send_raw_transaction(&mut self, result: Result<TxId, Error>) {
        self.send_raw_transaction_results
            .borrow_mut()
            .push_front(result);
    }

    pub fn should_call_account_information(&mut self, result: Result<AccountInformation, Error>) {
        self.account_information_results
            .borrow_mut()
            .push_front(result);
    }

    /// Stubs one confirmation wait that sees the transaction confirmed one round later.
    pub fn should_confirm_next_round(&mut self, current: Round) {
        self.should_call_current_round(Ok(current));
        self.should_call_status_of(Ok(ConfirmationStatus::Pending));
        self.should_call_await_round(Ok(current + 1));
        self.should_call_status_of(Ok(ConfirmationStatus::Confirmed(current + 1)));
    }

    /// Raises `stop_signal` whenever await_round is called, as a signal
    /// arriving while the caller is blocked would.
    pub fn stop_on_await_round(&mut self, stop_signal: StopSignal) {
        self.stop_on_await_round = Some(stop_signal);
    }

    pub fn awaited_rounds(&self) -> Vec<Round> {
        self.awaited_rounds.borrow().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.get()
    }

    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.sent_transactions.borrow().clone()
    }
}

impl LedgerApi for MockRpc {
    fn current_round(&self) -> Result<Round, Error> {
        self.current_round_results
            .borrow_mut()
            .pop_back()
            .expect("Unexpected RPC call method=current_round")
    }

    fn status_of(&self, txid: &TxId) -> Result<ConfirmationStatus, Error> {
        self.status_calls.set(self.status_calls.get() + 1);
        self.status_of_results
            .borrow_mut()
            .pop_back()
            .unwrap_or_else(|| panic!("Unexpected RPC call method=status_of, args(txid={})", txid))
    }

    fn await_round(&self, round: Round) -> Result<Round, Error> {
        self.awaited_rounds.borrow_mut().push(round);
        if let Some(stop_signal) = &self.stop_on_await_round {
            stop_signal.stop();
        }
        self.await_round_results
            .borrow_mut()
            .pop_back()
            .unwrap_or_else(|| panic!("Unexpected RPC call method=await_round, args(round={})", round))
    }
}

impl AlgodApi for MockRpc {
    fn suggested_params(&self) -> Result<SuggestedParams, Error> {
        self.suggested_params_results
            .borrow_mut()
            .pop_back()
            .expect("Unexpected RPC call method=suggested_params")
    }

    fn send_raw_transaction(&self, signed: &[u8]) -> Result<TxId, Error> {
        self.sent_transactions.borrow_mut().push(signed.to_vec());
        self.send_raw_transaction_results
            .borrow_mut()
            .pop_back()
            .unwrap_or_else(|| {
                panic!(
                    "Unexpected RPC call method=send_raw_transaction, args(signed={})",
                    hex::encode(signed)
                )
            })
    }

    fn account_information(&self, address: &Address) -> Result<AccountInformation, Error> {
        self.account_information_results
            .borrow_mut()
            .pop_back()
            .unwrap_or_else(|| {
                panic!(
                    "Unexpected RPC call method=account_information, args(address={})",
                    address
                )
            })
    }
}
