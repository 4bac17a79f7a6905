// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::errors::Error;
use crate::rpc::LedgerApi;
use crate::signal::StopSignal;
use std::fmt;
use std::time::{Duration, Instant};

pub type Round = u64;

pub const DEFAULT_MAX_ROUNDS: u64 = 1000;
pub const DEFAULT_NODE_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 500;

/// Transaction id assigned by the node when the transaction was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxId(String);

impl TxId {
    pub fn new<S: Into<String>>(id: S) -> TxId {
        TxId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    /// Included at the round. Terminal.
    Confirmed(Round),
    /// The node will never include it. Terminal.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitOptions {
    /// Give up once this many rounds passed without confirmation.
    pub max_rounds: Option<u64>,
    /// Give up after this much wall-clock time.
    pub timeout: Option<Duration>,
    /// Retries for a transient node failure before it surfaces as `NodeUnavailable`.
    pub max_node_retries: u32,
    /// Delay before the first retry; doubles for every further one.
    pub retry_backoff: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        WaitOptions {
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            timeout: None,
            max_node_retries: DEFAULT_NODE_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MILLIS),
        }
    }
}

impl WaitOptions {
    /// Waits as long as it takes. A transaction dropped without a pool error
    /// hangs the caller forever.
    pub fn unbounded() -> Self {
        WaitOptions {
            max_rounds: None,
            ..WaitOptions::default()
        }
    }

    pub fn max_rounds(mut self, rounds: u64) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, max_node_retries: u32, retry_backoff: Duration) -> Self {
        self.max_node_retries = max_node_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_rounds.is_some() || self.timeout.is_some()
    }
}

/// Polls the node once per round until a transaction is confirmed or can no
/// longer be.
pub struct ConfirmationWaiter<'a, T: LedgerApi> {
    ledger: &'a T,
    options: WaitOptions,
    stop_signal: Option<StopSignal>,
}

impl<'a, T: LedgerApi> ConfirmationWaiter<'a, T> {
    pub fn new(ledger: &'a T, options: WaitOptions) -> Self {
        ConfirmationWaiter {
            ledger,
            options,
            stop_signal: None,
        }
    }

    pub fn stop_handler(&mut self, stop_signal: StopSignal) {
        self.stop_signal = Some(stop_signal);
    }

    /// Returns the round the transaction was confirmed in.
    pub fn wait(&self, txid: &TxId) -> Result<Round, Error> {
        if !self.options.is_bounded() {
            log::warn!(
                "Waiting for {} without a round or time limit. A dropped transaction blocks forever.",
                txid
            );
        }

        let started = Instant::now();
        let start_round = self.call_node(|| self.ledger.current_round())?;
        let mut last_observed_round = start_round;
        log::debug!("Waiting for {} from round {}", txid, start_round);

        loop {
            self.check_stop_signal()?;

            match self.call_node(|| self.ledger.status_of(txid))? {
                ConfirmationStatus::Confirmed(round) => {
                    log::info!("Transaction {} confirmed in round {}", txid, round);
                    return Ok(round);
                }
                ConfirmationStatus::Failed(reason) => {
                    log::warn!("Transaction {} rejected: {}", txid, reason);
                    return Err(Error::TerminalRejection(reason));
                }
                ConfirmationStatus::Pending => {}
            }

            let rounds = last_observed_round - start_round;
            let elapsed = started.elapsed();
            let out_of_rounds = self.options.max_rounds.map_or(false, |max| rounds >= max);
            let out_of_time = self.options.timeout.map_or(false, |max| elapsed >= max);
            if out_of_rounds || out_of_time {
                log::warn!(
                    "Gave up on {} after {} rounds ({:?}).",
                    txid,
                    rounds,
                    elapsed
                );
                return Err(Error::Timeout { rounds, elapsed });
            }

            self.check_stop_signal()?;
            let next_round = last_observed_round + 1;
            log::trace!("{} is pending, waiting for round {}", txid, next_round);
            let reported = self.call_node(|| self.ledger.await_round(next_round))?;
            if reported < next_round {
                // The node gave up waiting. No round passed, so only the
                // stop signal and the wall-clock bound can have changed.
                log::debug!(
                    "Node still at round {} while waiting for round {}",
                    reported,
                    next_round
                );
                continue;
            }
            last_observed_round = reported;
        }
    }

    fn check_stop_signal(&self) -> Result<(), Error> {
        match self.stop_signal.as_ref().and_then(|s| s.raised()) {
            Some(by) => {
                log::warn!("Stopped waiting by {}.", by);
                Err(Error::Cancelled(by))
            }
            None => Ok(()),
        }
    }

    /// Runs a node call, retrying transient failures with exponential backoff.
    fn call_node<R, F>(&self, mut call: F) -> Result<R, Error>
    where
        F: FnMut() -> Result<R, Error>,
    {
        let mut attempts: u32 = 0;
        let mut backoff = self.options.retry_backoff;
        loop {
            attempts += 1;
            match call() {
                Ok(r) => return Ok(r),
                Err(e) if e.is_transient() => {
                    if attempts > self.options.max_node_retries {
                        return Err(Error::NodeUnavailable {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                    log::warn!(
                        "Node call failed ({}), retry {}/{} in {:?}",
                        e,
                        attempts,
                        self.options.max_node_retries,
                        backoff
                    );
                    match &self.stop_signal {
                        Some(stop_signal) => stop_signal.sleep(backoff)?,
                        None => std::thread::sleep(backoff),
                    }
                    backoff = backoff.checked_mul(2).unwrap_or(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helper::rpc::MockRpc;

    fn txid() -> TxId {
        TxId::new("WC4OFN3XHMBCCXFW3DVUJBOCZGYRKNXVQZBFCJJNPFQGTEEMHHDQ")
    }

    fn fast_options() -> WaitOptions {
        WaitOptions::default().retries(3, Duration::from_millis(0))
    }

    fn unavailable() -> Error {
        Error::Node {
            status: 503,
            message: "node is catching up".to_string(),
        }
    }

    #[test]
    fn test_confirmed_after_three_rounds() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(101));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(102));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(103));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(103)));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        assert_eq!(waiter.wait(&txid()).unwrap(), 103);
        assert_eq!(rpc.awaited_rounds(), vec![101, 102, 103]);
        assert_eq!(rpc.status_calls(), 4);
        rpc.assert();
    }

    #[test]
    fn test_confirmed_on_first_check_does_not_wait() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(99)));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        assert_eq!(waiter.wait(&txid()).unwrap(), 99);
        assert!(rpc.awaited_rounds().is_empty());
        rpc.assert();
    }

    #[test]
    fn test_failed_on_first_check() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Failed(
            "transaction expired".to_string(),
        )));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        match waiter.wait(&txid()) {
            Err(Error::TerminalRejection(reason)) => assert_eq!(reason, "transaction expired"),
            other => panic!("expected TerminalRejection, got {:?}", other),
        }
        assert!(rpc.awaited_rounds().is_empty());
        rpc.assert();
    }

    #[test]
    fn test_failed_after_pending_stops_polling() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(7));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(8));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Failed(
            "evicted from pool".to_string(),
        )));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        assert!(matches!(
            waiter.wait(&txid()),
            Err(Error::TerminalRejection(_))
        ));
        rpc.assert();
    }

    #[test]
    fn test_round_bound_times_out_after_exact_advances() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(101));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(102));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options().max_rounds(2));
        match waiter.wait(&txid()) {
            Err(Error::Timeout { rounds, .. }) => assert_eq!(rounds, 2),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(rpc.awaited_rounds(), vec![101, 102]);
        rpc.assert();
    }

    #[test]
    fn test_node_jumping_ahead_counts_towards_bound() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(105));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options().max_rounds(3));
        match waiter.wait(&txid()) {
            Err(Error::Timeout { rounds, .. }) => assert_eq!(rounds, 5),
            other => panic!("expected Timeout, got {:?}", other),
        }
        rpc.assert();
    }

    #[test]
    fn test_awaited_rounds_never_decrease() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(50));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(53));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(54));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(54)));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        assert_eq!(waiter.wait(&txid()).unwrap(), 54);
        let awaited = rpc.awaited_rounds();
        assert_eq!(awaited, vec![51, 54]);
        assert!(awaited.windows(2).all(|w| w[0] < w[1]));
        rpc.assert();
    }

    #[test]
    fn test_stalled_node_does_not_count_as_round_advance() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        // The node's wait expired without a new block.
        rpc.should_call_await_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(101));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(102));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options().max_rounds(2));
        match waiter.wait(&txid()) {
            Err(Error::Timeout { rounds, .. }) => assert_eq!(rounds, 2),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(rpc.awaited_rounds(), vec![101, 101, 102]);
        rpc.assert();
    }

    #[test]
    fn test_cancelled_while_node_is_stalled() {
        let stop_signal = StopSignal::new();
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(100));
        rpc.stop_on_await_round(stop_signal.clone());

        let mut waiter = ConfirmationWaiter::new(&rpc, WaitOptions::unbounded());
        waiter.stop_handler(stop_signal);
        assert!(matches!(waiter.wait(&txid()), Err(Error::Cancelled(_))));
        rpc.assert();
    }

    #[test]
    fn test_wall_clock_bound() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(1));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));

        let options = WaitOptions::unbounded()
            .retries(0, Duration::from_millis(0))
            .timeout(Duration::from_secs(0));
        let waiter = ConfirmationWaiter::new(&rpc, options);
        match waiter.wait(&txid()) {
            Err(Error::Timeout { rounds, .. }) => assert_eq!(rounds, 0),
            other => panic!("expected Timeout, got {:?}", other),
        }
        rpc.assert();
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Err(unavailable()));
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Err(unavailable()));
        rpc.should_call_status_of(Err(unavailable()));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Err(unavailable()));
        rpc.should_call_await_round(Ok(101));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(101)));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        assert_eq!(waiter.wait(&txid()).unwrap(), 101);
        rpc.assert();
    }

    #[test]
    fn test_node_unavailable_after_retry_budget() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        for _ in 0..4 {
            rpc.should_call_status_of(Err(unavailable()));
        }

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        match waiter.wait(&txid()) {
            Err(Error::NodeUnavailable { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.is_transient());
            }
            other => panic!("expected NodeUnavailable, got {:?}", other),
        }
        rpc.assert();
    }

    #[test]
    fn test_permanent_node_error_is_not_retried() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Err(Error::Node {
            status: 401,
            message: "Invalid API Token".to_string(),
        }));

        let waiter = ConfirmationWaiter::new(&rpc, fast_options());
        match waiter.wait(&txid()) {
            Err(Error::Node { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected Node error, got {:?}", other),
        }
        rpc.assert();
    }

    #[test]
    fn test_cancelled_is_not_timeout() {
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));

        let stop_signal = StopSignal::new();
        stop_signal.stop();
        let mut waiter = ConfirmationWaiter::new(&rpc, fast_options());
        waiter.stop_handler(stop_signal);
        match waiter.wait(&txid()) {
            Err(Error::Cancelled(by)) => assert_eq!(by, "stop request"),
            other => panic!("expected Cancelled, got {:?}", other),
        }
        rpc.assert();
    }

    #[test]
    fn test_cancelled_during_wait_for_round() {
        let stop_signal = StopSignal::new();
        let mut rpc = MockRpc::new();
        rpc.should_call_current_round(Ok(100));
        rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
        rpc.should_call_await_round(Ok(101));
        rpc.stop_on_await_round(stop_signal.clone());

        let mut waiter = ConfirmationWaiter::new(&rpc, fast_options());
        waiter.stop_handler(stop_signal);
        assert!(matches!(waiter.wait(&txid()), Err(Error::Cancelled(_))));
        assert_eq!(rpc.status_calls(), 1);
        rpc.assert();
    }

    #[test]
    fn test_independent_waiters_in_parallel() {
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut rpc = MockRpc::new();
                    rpc.should_call_current_round(Ok(10 * i));
                    rpc.should_call_status_of(Ok(ConfirmationStatus::Pending));
                    rpc.should_call_await_round(Ok(10 * i + 1));
                    rpc.should_call_status_of(Ok(ConfirmationStatus::Confirmed(10 * i + 1)));
                    let waiter = ConfirmationWaiter::new(&rpc, fast_options());
                    let round = waiter.wait(&TxId::new(format!("TX{}", i))).unwrap();
                    rpc.assert();
                    round
                })
            })
            .collect();

        let rounds: Vec<Round> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(rounds, vec![1, 11, 21, 31]);
    }
}
