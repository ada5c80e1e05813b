// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The chain viewer: loads a tip chain, exposes it as view state, and submits tips.
//!
//! A [`ChainViewer`] runs at most one sequence at a time. Its [`Phase`] is guarded by a token
//! that returns the viewer to [`Phase::Idle`] when the sequence ends. Loads requested while a
//! sequence runs are coalesced into a single follow-up load; tips requested while a sequence runs
//! are rejected with [`ViewerError::Busy`].
//!
//! Every state change is published on a [`watch`] channel. After [`ChainViewer::unmount`], no
//! further change is published and all in-flight sequences end with [`ViewerError::Unmounted`].

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Instant,
};

use alloy::primitives::Address;
use tipchain_core::{ChainEntry, TipId, chain_from_addresses, messages::Notification};
use tipchain_utils::metrics::{Registry, with_label};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    contract::{ContractGateway, TipReceipt},
    error::{GatewayError, NotifyError, ViewerError},
    metrics::{self, ViewerMetricSet},
    notify::Notifier,
    wallet::WalletSession,
};

/// Settings of a [`ChainViewer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerConfig {
    /// The chain to display.
    pub tip_id: TipId,
}

/// The state rendered by front-ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// The chain as of the last successful load.
    pub chain: Vec<ChainEntry>,
    /// True while a chain read is in flight.
    pub loading: bool,
    /// True while a tip, including its confirmation, reload and notification, is in flight.
    pub tip_in_progress: bool,
    /// The error of the last operation, if it failed.
    pub error: Option<ViewerError>,
}

/// The sequence a viewer is currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Nothing is in flight.
    #[default]
    Idle,
    /// The chain is being read.
    Loading,
    /// A tip is being submitted, confirmed, or followed up on.
    Tipping,
}

/// The result of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The chain was read; it has the given number of entries.
    Loaded(usize),
    /// Another sequence was in flight; a follow-up load runs when it ends.
    Queued,
}

#[derive(Debug, Default)]
struct Machine {
    phase: Phase,
    reload_pending: bool,
}

/// Why a step of a sequence did not complete.
#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error("the viewer was unmounted")]
    Unmounted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Holds the viewer's phase for the duration of one sequence.
struct PhaseGuard<'a> {
    machine: &'a Mutex<Machine>,
    armed: bool,
}

impl PhaseGuard<'_> {
    fn set(&self, phase: Phase) {
        lock(self.machine).phase = phase;
    }

    /// Ends the sequence, unless a follow-up load was queued.
    ///
    /// Checking the queue and returning to [`Phase::Idle`] happen under one lock, so a load
    /// queued concurrently is either picked up here or enters a fresh sequence itself. If a load
    /// was queued, the request is consumed, the phase becomes [`Phase::Loading`], and the guard
    /// is handed back.
    fn finish(mut self) -> Option<Self> {
        let mut machine = lock(self.machine);
        if std::mem::take(&mut machine.reload_pending) {
            machine.phase = Phase::Loading;
            drop(machine);
            return Some(self);
        }
        machine.phase = Phase::Idle;
        drop(machine);
        self.armed = false;
        None
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.machine).phase = Phase::Idle;
        }
    }
}

fn lock(machine: &Mutex<Machine>) -> std::sync::MutexGuard<'_, Machine> {
    machine.lock().expect("critical section shouldnt panic")
}

/// Displays a tip chain and submits tips for the connected account.
pub struct ChainViewer {
    config: ViewerConfig,
    wallet: Arc<dyn WalletSession>,
    gateway: Arc<dyn ContractGateway>,
    notifier: Arc<dyn Notifier>,
    metrics: ViewerMetricSet,
    machine: Mutex<Machine>,
    state: watch::Sender<ViewState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ChainViewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainViewer")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .field("mounted", &!self.cancel.is_cancelled())
            .finish()
    }
}

impl ChainViewer {
    /// Creates a viewer with an empty chain. Call [`ChainViewer::mount`] to start following the
    /// wallet's account.
    pub fn new(
        config: ViewerConfig,
        wallet: Arc<dyn WalletSession>,
        gateway: Arc<dyn ContractGateway>,
        notifier: Arc<dyn Notifier>,
        registry: &Registry,
    ) -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            config,
            wallet,
            gateway,
            notifier,
            metrics: ViewerMetricSet::new(registry),
            machine: Mutex::new(Machine::default()),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// The current view state.
    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// A receiver that observes every published view state.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// The sequence currently in flight.
    pub fn phase(&self) -> Phase {
        lock(&self.machine).phase
    }

    /// Whether [`ChainViewer::unmount`] has been called.
    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Starts following the wallet's account: loads now if an account is connected, and again
    /// whenever a different account connects.
    ///
    /// The returned task ends when the viewer is unmounted or the wallet session goes away.
    pub fn mount(self: &Arc<Self>) -> JoinHandle<()> {
        let viewer = Arc::clone(self);
        let mut accounts = self.wallet.subscribe();

        tokio::spawn(async move {
            let initial = *accounts.borrow_and_update();
            viewer.on_account_changed(initial).await;

            loop {
                tokio::select! {
                    _ = viewer.cancel.cancelled() => break,
                    changed = accounts.changed() => {
                        if changed.is_err() {
                            tracing::debug!("wallet session closed; stopping account watcher");
                            break;
                        }
                        let account = *accounts.borrow_and_update();
                        viewer.on_account_changed(account).await;
                    }
                }
            }
            tracing::debug!("account watcher stopped");
        })
    }

    /// Cancels every in-flight sequence; the view state is frozen from now on.
    pub fn unmount(&self) {
        tracing::debug!("unmounting chain viewer");
        self.cancel.cancel();
    }

    /// Reacts to a change of the connected account.
    pub async fn on_account_changed(&self, account: Option<Address>) {
        let Some(account) = account else {
            tracing::debug!("no account connected");
            return;
        };
        match self.load_chain().await {
            Ok(outcome) => tracing::debug!(%account, ?outcome, "loaded chain for account"),
            Err(error) => tracing::debug!(%account, %error, "chain load for account failed"),
        }
    }

    /// Reads the chain and replaces the displayed chain with it.
    ///
    /// No account is needed. On failure the displayed chain is kept and the error state is set
    /// to [`ViewerError::LoadFailed`].
    pub async fn load_chain(&self) -> Result<LoadOutcome, ViewerError> {
        self.ensure_mounted()?;
        let Some(guard) = self.try_enter_or_queue() else {
            with_label!(self.metrics.chain_loads, metrics::QUEUED).inc();
            tracing::debug!("sequence in flight; queued a follow-up load");
            return Ok(LoadOutcome::Queued);
        };

        let result = self.load_and_report().await;
        self.run_pending_reloads(guard).await;
        result
    }

    /// Submits a tip from the connected account, waits for it to be confirmed, reloads the chain,
    /// and sends the success notification, in that order.
    ///
    /// Any failure along the way sets the error state to [`ViewerError::TipFailed`] and skips
    /// the remaining steps.
    pub async fn submit_tip(&self) -> Result<TipReceipt, ViewerError> {
        self.ensure_mounted()?;
        let Some(account) = self.wallet.account() else {
            self.update(|state| state.error = Some(ViewerError::NoAccount))
                .map_err(|_| ViewerError::Unmounted)?;
            with_label!(self.metrics.tips, metrics::NO_ACCOUNT).inc();
            return Err(ViewerError::NoAccount);
        };
        let Some(guard) = self.try_enter(Phase::Tipping) else {
            with_label!(self.metrics.tips, metrics::BUSY).inc();
            tracing::debug!("sequence in flight; rejecting tip");
            return Err(ViewerError::Busy);
        };

        self.update(|state| {
            state.tip_in_progress = true;
            state.error = None;
        })
        .map_err(|_| ViewerError::Unmounted)?;

        let result = match self.tip_sequence(account, &guard).await {
            Ok(receipt) => {
                with_label!(self.metrics.tips, metrics::SUCCESS).inc();
                tracing::info!(tx_hash = %receipt.tx_hash, %account, "tip confirmed");
                Ok(receipt)
            }
            Err(StepError::Unmounted) => return Err(ViewerError::Unmounted),
            Err(error) => {
                with_label!(self.metrics.tips, metrics::FAILURE).inc();
                tracing::warn!(%error, %account, "failed to send tip");
                self.update(|state| state.error = Some(ViewerError::TipFailed))
                    .map_err(|_| ViewerError::Unmounted)?;
                Err(ViewerError::TipFailed)
            }
        };

        self.update(|state| state.tip_in_progress = false)
            .map_err(|_| ViewerError::Unmounted)?;
        self.run_pending_reloads(guard).await;
        result
    }

    async fn tip_sequence(
        &self,
        account: Address,
        guard: &PhaseGuard<'_>,
    ) -> Result<TipReceipt, StepError> {
        let pending = self.until_unmounted(self.gateway.tip(account)).await??;
        tracing::debug!(tx_hash = %pending.tx_hash(), "tip submitted; waiting for confirmation");

        let submitted_at = Instant::now();
        let receipt = self.until_unmounted(pending.confirm()).await??;
        self.metrics
            .tip_confirmation_seconds
            .observe(submitted_at.elapsed().as_secs_f64());

        guard.set(Phase::Loading);
        let n_entries = self.refresh().await?;
        guard.set(Phase::Tipping);
        tracing::debug!(n_entries, "reloaded chain after tip");

        self.until_unmounted(self.notifier.send(&Notification::tip_sent()))
            .await??;
        Ok(receipt)
    }

    /// Runs one load and maps its failure into the user-facing error state.
    async fn load_and_report(&self) -> Result<LoadOutcome, ViewerError> {
        match self.refresh().await {
            Ok(n_entries) => {
                with_label!(self.metrics.chain_loads, metrics::SUCCESS).inc();
                Ok(LoadOutcome::Loaded(n_entries))
            }
            Err(StepError::Unmounted) => Err(ViewerError::Unmounted),
            Err(error) => {
                with_label!(self.metrics.chain_loads, metrics::FAILURE).inc();
                tracing::warn!(%error, tip_id = %self.config.tip_id, "failed to load chain data");
                self.update(|state| state.error = Some(ViewerError::LoadFailed))
                    .map_err(|_| ViewerError::Unmounted)?;
                Err(ViewerError::LoadFailed)
            }
        }
    }

    /// Reads the chain with `loading` set, replacing the chain on success.
    ///
    /// Consumes any pending reload request, since this read observes every tip made before it.
    async fn refresh(&self) -> Result<usize, StepError> {
        lock(&self.machine).reload_pending = false;
        self.update(|state| {
            state.loading = true;
            state.error = None;
        })?;

        let result = self
            .until_unmounted(self.gateway.get_chain(self.config.tip_id))
            .await?;

        match result {
            Ok(addresses) => {
                let chain = chain_from_addresses(&addresses);
                let n_entries = chain.len();
                self.update(|state| {
                    state.chain = chain;
                    state.loading = false;
                })?;
                self.metrics
                    .chain_length
                    .set(i64::try_from(n_entries).unwrap_or(i64::MAX));
                Ok(n_entries)
            }
            Err(error) => {
                self.update(|state| state.loading = false)?;
                Err(error.into())
            }
        }
    }

    /// Runs the follow-up loads requested while the current sequence was in flight, then ends
    /// the sequence.
    async fn run_pending_reloads(&self, mut guard: PhaseGuard<'_>) {
        while !self.cancel.is_cancelled() {
            let Some(next) = guard.finish() else {
                return;
            };
            guard = next;
            tracing::debug!("running queued follow-up load");
            if let Err(error) = self.load_and_report().await {
                tracing::debug!(%error, "queued follow-up load failed");
            }
        }
    }

    fn try_enter(&self, phase: Phase) -> Option<PhaseGuard<'_>> {
        let mut machine = lock(&self.machine);
        if machine.phase != Phase::Idle {
            return None;
        }
        machine.phase = phase;
        Some(self.guard())
    }

    /// Starts a load sequence, or queues a follow-up load if another sequence is in flight.
    fn try_enter_or_queue(&self) -> Option<PhaseGuard<'_>> {
        let mut machine = lock(&self.machine);
        if machine.phase != Phase::Idle {
            machine.reload_pending = true;
            return None;
        }
        machine.phase = Phase::Loading;
        Some(self.guard())
    }

    fn guard(&self) -> PhaseGuard<'_> {
        PhaseGuard {
            machine: &self.machine,
            armed: true,
        }
    }

    fn ensure_mounted(&self) -> Result<(), ViewerError> {
        if self.cancel.is_cancelled() {
            return Err(ViewerError::Unmounted);
        }
        Ok(())
    }

    /// Applies `change` to the view state unless the viewer was unmounted.
    fn update(&self, change: impl FnOnce(&mut ViewState)) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            return Err(StepError::Unmounted);
        }
        self.state.send_modify(change);
        Ok(())
    }

    /// Awaits `future` unless the viewer is unmounted first.
    async fn until_unmounted<F: Future>(&self, future: F) -> Result<F::Output, StepError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StepError::Unmounted),
            output = future => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::predicate;

    use super::*;
    use crate::{
        contract::{MockContractGateway, PendingTip},
        notify::MockNotifier,
        test_utils::FakePendingTip,
        wallet::LocalWallet,
    };

    const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn addresses(count: u8) -> Vec<Address> {
        (1..=count).map(Address::with_last_byte).collect()
    }

    fn viewer(
        wallet: LocalWallet,
        gateway: MockContractGateway,
        notifier: MockNotifier,
    ) -> ChainViewer {
        ChainViewer::new(
            ViewerConfig {
                tip_id: TipId::from(5),
            },
            Arc::new(wallet),
            Arc::new(gateway),
            Arc::new(notifier),
            &Registry::default(),
        )
    }

    fn connected_wallet() -> LocalWallet {
        LocalWallet::from_private_keys([KEY_0]).expect("valid key")
    }

    #[tokio::test]
    async fn load_reads_configured_chain() {
        let mut gateway = MockContractGateway::new();
        gateway
            .expect_get_chain()
            .with(predicate::eq(TipId::from(5)))
            .times(1)
            .returning(|_| Ok(addresses(3)));
        let viewer = viewer(LocalWallet::disconnected(), gateway, MockNotifier::new());

        let outcome = viewer.load_chain().await.expect("load succeeds");

        assert_eq!(outcome, LoadOutcome::Loaded(2));
        let state = viewer.snapshot();
        assert_eq!(state.chain, chain_from_addresses(&addresses(3)));
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(viewer.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_chain() {
        let mut gateway = MockContractGateway::new();
        let mut calls = 0;
        gateway.expect_get_chain().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(addresses(4))
            } else {
                Err(GatewayError::Unavailable("node down".to_owned()))
            }
        });
        let viewer = viewer(LocalWallet::disconnected(), gateway, MockNotifier::new());

        viewer.load_chain().await.expect("first load succeeds");
        let error = viewer.load_chain().await.expect_err("second load fails");

        assert_eq!(error, ViewerError::LoadFailed);
        let state = viewer.snapshot();
        assert_eq!(state.chain, chain_from_addresses(&addresses(4)));
        assert!(!state.loading);
        assert_eq!(state.error, Some(ViewerError::LoadFailed));
        assert_eq!(
            state.error.map(|error| error.to_string()).as_deref(),
            Some("Failed to load chain data")
        );
    }

    #[tokio::test]
    async fn tip_without_account_never_calls_gateway() {
        let mut gateway = MockContractGateway::new();
        gateway.expect_tip().never();
        gateway.expect_get_chain().never();
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();
        let viewer = viewer(LocalWallet::disconnected(), gateway, notifier);
        let before = viewer.snapshot();

        let error = viewer.submit_tip().await.expect_err("no account connected");

        assert_eq!(error, ViewerError::NoAccount);
        let state = viewer.snapshot();
        assert_eq!(state.error, Some(ViewerError::NoAccount));
        assert_eq!(state.loading, before.loading);
        assert!(!state.tip_in_progress);
        assert_eq!(viewer.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn successful_tip_reloads_and_notifies() {
        let wallet = connected_wallet();
        let account = wallet.account().expect("connected");
        let receipt = TipReceipt {
            tx_hash: alloy::primitives::TxHash::with_last_byte(1),
            block_number: Some(10),
        };

        let mut sequence = mockall::Sequence::new();
        let mut gateway = MockContractGateway::new();
        gateway
            .expect_tip()
            .with(predicate::eq(account))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(move |_| Ok(Box::new(FakePendingTip::confirming(receipt)) as Box<dyn PendingTip>));
        gateway
            .expect_get_chain()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(addresses(2)));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|notification| *notification == Notification::tip_sent())
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let viewer = viewer(wallet, gateway, notifier);

        let confirmed = viewer.submit_tip().await.expect("tip succeeds");

        assert_eq!(confirmed, receipt);
        let state = viewer.snapshot();
        assert_eq!(state.chain, chain_from_addresses(&addresses(2)));
        assert!(!state.tip_in_progress);
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn rejected_submission_skips_reload_and_notification() {
        let mut gateway = MockContractGateway::new();
        gateway
            .expect_tip()
            .times(1)
            .returning(|_| Err(GatewayError::Rejected("user denied".to_owned())));
        gateway.expect_get_chain().never();
        let mut notifier = MockNotifier::new();
        notifier.expect_send().never();
        let viewer = viewer(connected_wallet(), gateway, notifier);

        let error = viewer.submit_tip().await.expect_err("submission is rejected");

        assert_eq!(error, ViewerError::TipFailed);
        let state = viewer.snapshot();
        assert_eq!(state.error, Some(ViewerError::TipFailed));
        assert!(!state.tip_in_progress);
    }

    #[tokio::test]
    async fn failed_notification_is_a_tip_failure() {
        let mut gateway = MockContractGateway::new();
        gateway.expect_tip().times(1).returning(|_| {
            Ok(Box::new(FakePendingTip::confirming(TipReceipt {
                tx_hash: Default::default(),
                block_number: None,
            })) as Box<dyn PendingTip>)
        });
        gateway
            .expect_get_chain()
            .times(1)
            .returning(|_| Ok(addresses(3)));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(1)
            .returning(|_| Err(NotifyError::Other("host unavailable".to_owned())));
        let viewer = viewer(connected_wallet(), gateway, notifier);

        let error = viewer.submit_tip().await.expect_err("notification fails");

        assert_eq!(error, ViewerError::TipFailed);
        let state = viewer.snapshot();
        assert_eq!(state.chain.len(), 2, "the reload before the notification is kept");
        assert_eq!(state.error, Some(ViewerError::TipFailed));
    }

    #[tokio::test]
    async fn unmounted_viewer_rejects_operations() {
        let mut gateway = MockContractGateway::new();
        gateway.expect_get_chain().never();
        gateway.expect_tip().never();
        let viewer = viewer(connected_wallet(), gateway, MockNotifier::new());

        viewer.unmount();

        assert!(viewer.is_unmounted());
        assert_eq!(viewer.load_chain().await, Err(ViewerError::Unmounted));
        assert_eq!(viewer.submit_tip().await, Err(ViewerError::Unmounted));
        assert_eq!(viewer.snapshot(), ViewState::default());
    }

    #[tokio::test]
    async fn load_queued_as_sequence_ends_still_runs() {
        let mut gateway = MockContractGateway::new();
        gateway
            .expect_get_chain()
            .times(1)
            .returning(|_| Ok(addresses(2)));
        let viewer = viewer(LocalWallet::disconnected(), gateway, MockNotifier::new());
        let guard = viewer.try_enter(Phase::Tipping).expect("viewer is idle");

        assert_eq!(viewer.load_chain().await, Ok(LoadOutcome::Queued));
        viewer.run_pending_reloads(guard).await;

        assert_eq!(viewer.phase(), Phase::Idle);
        assert_eq!(viewer.snapshot().chain.len(), 1);
        assert!(!lock(&viewer.machine).reload_pending);
    }

    #[test]
    fn queued_load_is_picked_up_by_finishing_sequence() {
        let viewer = viewer(
            LocalWallet::disconnected(),
            MockContractGateway::new(),
            MockNotifier::new(),
        );
        let guard = viewer.try_enter(Phase::Tipping).expect("viewer is idle");
        assert!(viewer.try_enter_or_queue().is_none());

        let guard = guard.finish().expect("the queued load keeps the sequence alive");

        assert_eq!(viewer.phase(), Phase::Loading);
        assert!(!lock(&viewer.machine).reload_pending);
        drop(guard);
        assert_eq!(viewer.phase(), Phase::Idle);
    }

    #[test]
    fn finished_sequence_lets_next_load_enter() {
        let viewer = viewer(
            LocalWallet::disconnected(),
            MockContractGateway::new(),
            MockNotifier::new(),
        );
        let guard = viewer.try_enter(Phase::Loading).expect("viewer is idle");

        assert!(guard.finish().is_none());
        assert_eq!(viewer.phase(), Phase::Idle);

        let next = viewer.try_enter_or_queue().expect("nothing is in flight");
        assert_eq!(viewer.phase(), Phase::Loading);
        assert!(!lock(&viewer.machine).reload_pending);
        drop(next);
    }
}
