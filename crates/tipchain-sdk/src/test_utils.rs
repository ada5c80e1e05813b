// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators for testing the viewer.
//!
//! All fakes record their calls in a shared [`CallLog`], so tests can assert on the order in
//! which the viewer talks to them.

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use tipchain_core::{TipId, messages::Notification};
use tokio::sync::{Semaphore, watch};

use crate::{
    contract::{ContractGateway, PendingTip, TipReceipt},
    error::{GatewayError, NotifyError},
    notify::Notifier,
};

/// A call made to one of the fakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// [`ContractGateway::get_chain`] was called.
    GetChain(TipId),
    /// [`ContractGateway::tip`] was called with this signer.
    Tip(Address),
    /// [`PendingTip::confirm`] was called for this transaction.
    Confirm(TxHash),
    /// [`Notifier::send`] was called.
    Notify(Notification),
}

/// An ordered record of calls, shared between fakes.
#[derive(Debug, Clone)]
pub struct CallLog {
    calls: Arc<watch::Sender<Vec<Call>>>,
}

impl Default for CallLog {
    fn default() -> Self {
        Self {
            calls: Arc::new(watch::channel(Vec::new()).0),
        }
    }
}

impl CallLog {
    /// Appends `call` to the log.
    pub fn record(&self, call: Call) {
        self.calls.send_modify(|calls| calls.push(call));
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// The number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(call)).count()
    }

    /// Waits until at least `n` calls match `predicate`.
    pub async fn wait_for(&self, n: usize, predicate: impl Fn(&Call) -> bool) {
        let mut receiver = self.calls.subscribe();
        receiver
            .wait_for(|calls| calls.iter().filter(|call| predicate(call)).count() >= n)
            .await
            .expect("the log owns the sender");
    }
}

/// The step of a tip at which a [`FakeGateway`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipStage {
    /// The `tip()` call is rejected.
    Submit,
    /// The transaction reverts.
    Confirm,
    /// The chain read after the confirmation fails.
    Reload,
}

/// A contract gateway backed by an in-memory chain.
///
/// A confirmed tip appends its signer to the chain.
#[derive(Debug)]
pub struct FakeGateway {
    chain: Arc<Mutex<Vec<Address>>>,
    log: CallLog,
    read_gate: Option<Arc<Semaphore>>,
    fail_reads: Arc<AtomicBool>,
    fail_at: Mutex<Option<TipStage>>,
    next_tx: AtomicU8,
}

impl FakeGateway {
    /// Creates a gateway whose chain holds `addresses`.
    pub fn new(addresses: Vec<Address>, log: CallLog) -> Self {
        Self {
            chain: Arc::new(Mutex::new(addresses)),
            log,
            read_gate: None,
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_at: Mutex::new(None),
            next_tx: AtomicU8::new(1),
        }
    }

    /// Makes every chain read wait for a permit released with [`FakeGateway::release_reads`].
    pub fn with_read_gate(mut self) -> Self {
        self.read_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `n` gated chain reads complete.
    pub fn release_reads(&self, n: usize) {
        if let Some(gate) = &self.read_gate {
            gate.add_permits(n);
        }
    }

    /// Makes chain reads fail, or succeed again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes the next tips fail at `stage`.
    pub fn fail_tips_at(&self, stage: TipStage) {
        *self.fail_at.lock().expect("critical section shouldnt panic") = Some(stage);
    }

    /// The current chain.
    pub fn addresses(&self) -> Vec<Address> {
        self.chain
            .lock()
            .expect("critical section shouldnt panic")
            .clone()
    }
}

#[async_trait]
impl ContractGateway for FakeGateway {
    async fn get_chain(&self, tip_id: TipId) -> Result<Vec<Address>, GatewayError> {
        self.log.record(Call::GetChain(tip_id));
        if let Some(gate) = &self.read_gate {
            gate.acquire()
                .await
                .map_err(|error| GatewayError::Unavailable(error.to_string()))?
                .forget();
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("reads are failing".to_owned()));
        }
        Ok(self.addresses())
    }

    async fn tip(&self, signer: Address) -> Result<Box<dyn PendingTip>, GatewayError> {
        self.log.record(Call::Tip(signer));
        let fail_at = *self.fail_at.lock().expect("critical section shouldnt panic");
        if fail_at == Some(TipStage::Submit) {
            return Err(GatewayError::Rejected("user rejected the request".to_owned()));
        }

        let tx_hash = TxHash::with_last_byte(self.next_tx.fetch_add(1, Ordering::SeqCst));
        let pending = if fail_at == Some(TipStage::Confirm) {
            FakePendingTip::reverting(tx_hash)
        } else {
            FakePendingTip::confirming(TipReceipt {
                tx_hash,
                block_number: Some(1),
            })
            .appending(signer, Arc::clone(&self.chain))
        };
        let pending = pending.logging_to(self.log.clone());
        let pending = if fail_at == Some(TipStage::Reload) {
            pending.failing_reads_after(Arc::clone(&self.fail_reads))
        } else {
            pending
        };
        Ok(Box::new(pending))
    }
}

/// A submitted tip with a predetermined outcome.
#[derive(Debug)]
pub struct FakePendingTip {
    tx_hash: TxHash,
    receipt: Option<TipReceipt>,
    append: Option<(Address, Arc<Mutex<Vec<Address>>>)>,
    log: Option<CallLog>,
    fail_reads: Option<Arc<AtomicBool>>,
}

impl FakePendingTip {
    /// A tip that confirms with `receipt`.
    pub fn confirming(receipt: TipReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            receipt: Some(receipt),
            append: None,
            log: None,
            fail_reads: None,
        }
    }

    /// A tip whose transaction reverts.
    pub fn reverting(tx_hash: TxHash) -> Self {
        Self {
            tx_hash,
            receipt: None,
            append: None,
            log: None,
            fail_reads: None,
        }
    }

    fn appending(mut self, signer: Address, chain: Arc<Mutex<Vec<Address>>>) -> Self {
        self.append = Some((signer, chain));
        self
    }

    fn logging_to(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    fn failing_reads_after(mut self, fail_reads: Arc<AtomicBool>) -> Self {
        self.fail_reads = Some(fail_reads);
        self
    }
}

#[async_trait]
impl PendingTip for FakePendingTip {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn confirm(self: Box<Self>) -> Result<TipReceipt, GatewayError> {
        if let Some(log) = &self.log {
            log.record(Call::Confirm(self.tx_hash));
        }
        let Some(receipt) = self.receipt else {
            return Err(GatewayError::Reverted {
                tx_hash: self.tx_hash,
            });
        };
        if let Some((signer, chain)) = &self.append {
            chain
                .lock()
                .expect("critical section shouldnt panic")
                .push(*signer);
        }
        if let Some(fail_reads) = &self.fail_reads {
            fail_reads.store(true, Ordering::SeqCst);
        }
        Ok(receipt)
    }
}

/// A notifier that records what it sends.
#[derive(Debug, Default)]
pub struct FakeNotifier {
    log: CallLog,
    gate: Option<Arc<Semaphore>>,
    fail: AtomicBool,
}

impl FakeNotifier {
    /// Creates a notifier recording into `log`.
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            gate: None,
            fail: AtomicBool::new(false),
        }
    }

    /// Makes every send wait for a permit released with [`FakeNotifier::release_sends`].
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `n` gated sends complete.
    pub fn release_sends(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Makes every send fail, or succeed again.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.log.record(Call::Notify(notification.clone()));
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|error| NotifyError::Other(error.to_string()))?
                .forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Other("the host is unreachable".to_owned()));
        }
        Ok(())
    }
}
