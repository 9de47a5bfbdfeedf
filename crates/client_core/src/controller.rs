use std::{sync::Arc, time::Duration};

use chain_integration::{ChainError, ContractProxy, WalletProvider};
use chrono::Utc;
use shared::{
    domain::{Address, ChainId, MintAction, PresalePhase, TxHash},
    error::{ErrorCode, ErrorNotice},
    protocol::{AccountEvent, DisplaySnapshot, TxReceipt},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    polling::{spawn_periodic, PollingHandle},
    session::{SessionRecord, WriteKind},
};

pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub contract_address: Address,
    pub expected_chain_id: ChainId,
    pub poll_interval: Duration,
}

impl SessionSettings {
    pub fn from_client_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        Ok(Self {
            contract_address: settings.contract()?,
            expected_chain_id: settings.expected_chain_id(),
            poll_interval: settings.poll_interval(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet provider available; install or enable a wallet to continue")]
    ProviderUnavailable,
    #[error("could not read wallet accounts: {0}")]
    AccountReadFailed(String),
    #[error("wallet is not connected")]
    NotConnected,
    #[error("{action} is not available while the page shows '{current}'")]
    ActionUnavailable {
        action: WriteKind,
        current: MintAction,
    },
    #[error("another transaction is still awaiting confirmation")]
    WriteInFlight,
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("transaction reverted: {0}")]
    TransactionReverted(String),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::ProviderUnavailable => ErrorCode::ProviderUnavailable,
            SessionError::AccountReadFailed(_) => ErrorCode::ReadFailure,
            SessionError::NotConnected => ErrorCode::NotConnected,
            SessionError::ActionUnavailable { .. } => ErrorCode::ActionUnavailable,
            SessionError::WriteInFlight => ErrorCode::WriteInFlight,
            SessionError::TransactionRejected(_) => ErrorCode::TransactionRejected,
            SessionError::TransactionReverted(_) => ErrorCode::TransactionReverted,
        }
    }

    pub fn notice(&self) -> ErrorNotice {
        ErrorNotice::new(self.code(), self.to_string())
    }
}

fn map_write_error(err: ChainError) -> SessionError {
    match err {
        ChainError::Unavailable => SessionError::ProviderUnavailable,
        ChainError::Rejected(message) => SessionError::TransactionRejected(message),
        // Revert reasons (including "not whitelisted" and "sold out") are not
        // parsed; transport failures after submission are reported the same way.
        other => SessionError::TransactionReverted(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(DisplaySnapshot),
    Notice(String),
    Error(ErrorNotice),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub failed_reads: Vec<&'static str>,
    pub changed: bool,
}

impl RefreshReport {
    fn read_failed(&mut self, read: &'static str, err: &ChainError) {
        warn!(
            read,
            code = ?ErrorCode::ReadFailure,
            "session: chain read failed, keeping last known value: {err}"
        );
        self.failed_reads.push(read);
    }

    pub fn is_complete(&self) -> bool {
        self.failed_reads.is_empty()
    }
}

#[derive(Clone)]
struct ContractBinding {
    signer: Address,
    contract: Arc<dyn ContractProxy>,
}

pub struct SessionController {
    provider: Arc<dyn WalletProvider>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    binding: RwLock<Option<ContractBinding>>,
    record: Mutex<SessionRecord>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn WalletProvider>, settings: SessionSettings) -> Arc<Self> {
        Self::new_with_clock(provider, settings, Arc::new(SystemClock))
    }

    pub fn new_with_clock(
        provider: Arc<dyn WalletProvider>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            provider,
            clock,
            settings,
            binding: RwLock::new(None),
            record: Mutex::new(SessionRecord::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn record(&self) -> SessionRecord {
        self.record.lock().await.clone()
    }

    pub async fn derived_action(&self) -> MintAction {
        self.record.lock().await.derive_action()
    }

    pub async fn display(&self) -> DisplaySnapshot {
        self.record.lock().await.display()
    }

    async fn current_binding(&self) -> Option<ContractBinding> {
        self.binding.read().await.clone()
    }

    async fn publish_state(&self) {
        let snapshot = self.display().await;
        let _ = self.events.send(SessionEvent::StateChanged(snapshot));
    }

    /// Connects to the injected wallet and loads the session. Calling it
    /// again while connected just re-runs the refresh.
    pub async fn connect(&self) -> Result<DisplaySnapshot, SessionError> {
        let signer = match self.bind_signer().await {
            Ok(signer) => signer,
            Err(err) => {
                warn!("session: connect failed: {err}");
                let _ = self.events.send(SessionEvent::Error(err.notice()));
                return Err(err);
            }
        };
        info!(%signer, contract = %self.settings.contract_address, "session: wallet connected");

        self.check_network().await;
        self.refresh().await;
        self.publish_state().await;
        Ok(self.display().await)
    }

    async fn bind_signer(&self) -> Result<Address, SessionError> {
        let accounts = match self.provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(ChainError::Unavailable) => {
                warn!("session: wallet provider unavailable");
                return Err(SessionError::ProviderUnavailable);
            }
            Err(err) => {
                warn!(
                    read = "accounts",
                    code = ?ErrorCode::ReadFailure,
                    "session: wallet account read failed: {err}"
                );
                return Err(SessionError::AccountReadFailed(err.to_string()));
            }
        };
        let Some(signer) = accounts.first().copied() else {
            warn!("session: wallet exposes no accounts");
            return Err(SessionError::ProviderUnavailable);
        };

        let contract = self
            .provider
            .contract(self.settings.contract_address, signer);
        *self.binding.write().await = Some(ContractBinding { signer, contract });
        self.record.lock().await.bind_signer(signer);
        Ok(signer)
    }

    async fn check_network(&self) {
        let expected = self.settings.expected_chain_id;
        let warning = match self.provider.chain_id().await {
            Ok(actual) if actual == expected => None,
            Ok(actual) => Some(format!(
                "wallet is on chain {actual}; switch to chain {expected}"
            )),
            Err(err) => {
                warn!("session: could not read wallet chain id: {err}");
                None
            }
        };

        if let Some(warning) = &warning {
            warn!(%expected, "session: {warning}");
            let _ = self.events.send(SessionEvent::Notice(warning.clone()));
        }
        self.record.lock().await.network_warning = warning;
    }

    /// Re-reads everything the session shows. Never fails: a failed read
    /// leaves its field untouched and is logged.
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let Some(binding) = self.current_binding().await else {
            debug!("session: refresh skipped, not connected");
            return report;
        };
        let contract = &binding.contract;

        let (owner, owned_token, started, end_time, token_id) = futures::join!(
            contract.owner(),
            contract.owner_to_token_id(binding.signer),
            contract.presale_started(),
            contract.presale_end_time(),
            contract.token_id(),
        );
        let now = self.clock.now_unix();

        let changed = {
            let mut record = self.record.lock().await;
            if record.signer != Some(binding.signer) {
                debug!("session: dropping refresh for a superseded account");
                return report;
            }
            let before = record.clone();

            match owner {
                Ok(owner) => record.reconcile_owner(owner),
                Err(err) => report.read_failed("owner", &err),
            }
            match owned_token {
                Ok(token) => record.reconcile_owned_token(token),
                Err(err) => report.read_failed("ownerToTokenId", &err),
            }
            let end_time = match end_time {
                Ok(end_time) => Some(end_time),
                Err(err) => {
                    report.read_failed("presaleEndTime", &err);
                    None
                }
            };
            match started {
                Ok(started) => apply_presale_reads(&mut record, started, end_time, now),
                Err(err) => report.read_failed("presaleStarted", &err),
            }
            match token_id {
                Ok(raw) => apply_token_counter(&mut record, raw),
                Err(err) => report.read_failed("tokenId", &err),
            }

            *record != before
        };

        report.changed = changed;
        if changed {
            self.publish_state().await;
        }
        report
    }

    /// One tick of the presale-phase poll. The end time is only read once
    /// the presale has started.
    pub async fn poll_presale_phase(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let Some(binding) = self.current_binding().await else {
            return report;
        };

        let started = match binding.contract.presale_started().await {
            Ok(started) => started,
            Err(err) => {
                report.read_failed("presaleStarted", &err);
                return report;
            }
        };
        let end_time = if started {
            match binding.contract.presale_end_time().await {
                Ok(end_time) => Some(end_time),
                Err(err) => {
                    report.read_failed("presaleEndTime", &err);
                    None
                }
            }
        } else {
            None
        };
        let now = self.clock.now_unix();

        let changed = {
            let mut record = self.record.lock().await;
            let before = record.phase;
            apply_presale_reads(&mut record, started, end_time, now);
            record.phase != before
        };
        report.changed = changed;
        if changed {
            self.publish_state().await;
        }
        report
    }

    /// One tick of the mint-counter poll.
    pub async fn poll_mint_counter(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let Some(binding) = self.current_binding().await else {
            return report;
        };

        match binding.contract.token_id().await {
            Ok(raw) => {
                let mut record = self.record.lock().await;
                let before = record.minted;
                apply_token_counter(&mut record, raw);
                report.changed = record.minted != before;
            }
            Err(err) => report.read_failed("tokenId", &err),
        }
        if report.changed {
            self.publish_state().await;
        }
        report
    }

    /// Rebinds to the wallet's new active account and reloads the
    /// address-dependent state. A wallet with no account left disconnects
    /// the session; a failed account read keeps the current binding.
    pub async fn on_account_changed(&self) -> Result<(), SessionError> {
        if !self.record.lock().await.connected {
            debug!("session: account change ignored, not connected");
            return Ok(());
        }

        match self.bind_signer().await {
            Ok(signer) => {
                info!(%signer, "session: active account changed");
                self.refresh().await;
                self.publish_state().await;
                Ok(())
            }
            Err(SessionError::ProviderUnavailable) => {
                warn!("session: lost wallet account, disconnecting");
                self.disconnect().await;
                Err(SessionError::ProviderUnavailable)
            }
            Err(err) => {
                warn!("session: keeping current account: {err}");
                Err(err)
            }
        }
    }

    pub async fn disconnect(&self) {
        *self.binding.write().await = None;
        *self.record.lock().await = SessionRecord::default();
        info!("session: disconnected");
        self.publish_state().await;
    }

    pub async fn start_presale(&self) -> Result<TxReceipt, SessionError> {
        self.submit_write(WriteKind::StartPresale).await
    }

    pub async fn presale_mint(&self) -> Result<TxReceipt, SessionError> {
        self.submit_write(WriteKind::PresaleMint).await
    }

    pub async fn public_mint(&self) -> Result<TxReceipt, SessionError> {
        self.submit_write(WriteKind::PublicMint).await
    }

    async fn submit_write(&self, kind: WriteKind) -> Result<TxReceipt, SessionError> {
        let binding = self
            .current_binding()
            .await
            .ok_or(SessionError::NotConnected)?;
        {
            let mut record = self.record.lock().await;
            if !record.connected {
                return Err(SessionError::NotConnected);
            }
            if record.pending.is_some() {
                return Err(SessionError::WriteInFlight);
            }
            let current = record.derive_action();
            if current != kind.required_action() {
                return Err(SessionError::ActionUnavailable {
                    action: kind,
                    current,
                });
            }
            record.pending = Some(kind);
        }
        self.publish_state().await;

        info!(action = %kind, value = %kind.value(), "session: submitting transaction");
        let result = execute_write(binding.contract.as_ref(), kind).await;

        {
            let mut record = self.record.lock().await;
            record.pending = None;
            if result.is_ok() && record.signer == Some(binding.signer) {
                match kind {
                    WriteKind::StartPresale => {
                        record.apply_provisional_phase(PresalePhase::PresaleActive)
                    }
                    WriteKind::PresaleMint | WriteKind::PublicMint => {
                        record.apply_provisional_minted()
                    }
                }
            }
        }
        self.publish_state().await;

        match &result {
            Ok(receipt) => info!(
                action = %kind,
                tx_hash = %receipt.tx_hash,
                block = ?receipt.block_number,
                "session: transaction confirmed"
            ),
            Err(err) => {
                warn!(action = %kind, code = ?err.code(), "session: transaction failed: {err}");
                let _ = self.events.send(SessionEvent::Error(err.notice()));
            }
        }
        result
    }

    /// Starts the presale-phase poll, the mint-counter poll, the account
    /// listener and the provider's account watcher (if any) under one handle.
    pub fn start_polling(self: &Arc<Self>) -> PollingHandle {
        let period = self.settings.poll_interval;

        let controller = Arc::clone(self);
        let presale = spawn_periodic("presale_phase", period, move || {
            let controller = Arc::clone(&controller);
            async move {
                controller.poll_presale_phase().await;
            }
        });

        let controller = Arc::clone(self);
        let counter = spawn_periodic("mint_counter", period, move || {
            let controller = Arc::clone(&controller);
            async move {
                controller.poll_mint_counter().await;
            }
        });

        let accounts = self.spawn_account_listener();
        let mut tasks = vec![presale, counter, accounts];
        tasks.extend(self.provider.spawn_account_watcher(period));
        PollingHandle::new(tasks)
    }

    fn spawn_account_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut events = self.provider.subscribe_account_changes();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AccountEvent::Changed { active }) => {
                        debug!(active = ?active, "session: account change event");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: account events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                if let Err(err) = controller.on_account_changed().await {
                    let _ = controller.events.send(SessionEvent::Error(err.notice()));
                }
            }
        })
    }
}

async fn execute_write(
    contract: &dyn ContractProxy,
    kind: WriteKind,
) -> Result<TxReceipt, SessionError> {
    let tx_hash: TxHash = match kind {
        WriteKind::StartPresale => contract.start_presale().await,
        WriteKind::PresaleMint => contract.presale_mint(kind.value()).await,
        WriteKind::PublicMint => contract.mint(kind.value()).await,
    }
    .map_err(map_write_error)?;

    info!(action = %kind, %tx_hash, "session: awaiting confirmation");
    contract
        .wait_for_confirmation(tx_hash)
        .await
        .map_err(map_write_error)
}

fn apply_presale_reads(
    record: &mut SessionRecord,
    started: bool,
    end_time: Option<u64>,
    now_unix: u64,
) {
    match PresalePhase::from_chain(started, end_time, now_unix) {
        Some(observed) => {
            let from = record.phase.value;
            if !record.reconcile_phase(observed) {
                warn!(
                    current = ?from,
                    observed = ?observed,
                    "session: ignoring presale phase read that would move backwards"
                );
            } else if from != observed {
                info!(from = ?from, to = ?observed, "session: presale phase changed");
            }
        }
        None => record.reconcile_phase_started(),
    }
}

fn apply_token_counter(record: &mut SessionRecord, raw_token_id: u64) {
    let before = record.minted;
    if !record.reconcile_token_counter(raw_token_id) {
        warn!(
            current = before,
            raw_token_id, "session: ignoring token counter read that would move backwards"
        );
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
