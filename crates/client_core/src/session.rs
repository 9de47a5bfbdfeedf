//! The in-memory session record and the reconciliation rules that are the
//! only way it changes.

use std::fmt;

use shared::{
    domain::{
        Address, CallerRole, MintAction, PresalePhase, Wei, MINT_CEILING, PRESALE_MINT_PRICE,
        PUBLIC_MINT_PRICE,
    },
    protocol::DisplaySnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Set locally after a confirmed write; the next chain read replaces it.
    Provisional,
    /// Read from the chain.
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Observed<T> {
    pub fn provisional(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Provisional,
        }
    }

    pub fn confirmed(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Confirmed,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.provenance == Provenance::Confirmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    StartPresale,
    PresaleMint,
    PublicMint,
}

impl WriteKind {
    /// The derived action that has to be showing for this write to be offered.
    pub fn required_action(self) -> MintAction {
        match self {
            WriteKind::StartPresale => MintAction::AwaitingOwnerStart,
            WriteKind::PresaleMint => MintAction::PresaleMintAvailable,
            WriteKind::PublicMint => MintAction::PublicMintAvailable,
        }
    }

    pub fn value(self) -> Wei {
        match self {
            WriteKind::StartPresale => Wei::ZERO,
            WriteKind::PresaleMint => PRESALE_MINT_PRICE,
            WriteKind::PublicMint => PUBLIC_MINT_PRICE,
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteKind::StartPresale => "start presale",
            WriteKind::PresaleMint => "presale mint",
            WriteKind::PublicMint => "public mint",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub connected: bool,
    pub signer: Option<Address>,
    /// `None` until the owner read succeeds for the current signer.
    pub role: Option<CallerRole>,
    pub phase: Observed<PresalePhase>,
    /// Tokens minted so far (`tokenId() - 1`).
    pub minted: u64,
    pub already_minted: Observed<bool>,
    pub pending: Option<WriteKind>,
    pub network_warning: Option<String>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            connected: false,
            signer: None,
            role: None,
            phase: Observed::provisional(PresalePhase::NotStarted),
            minted: 0,
            already_minted: Observed::provisional(false),
            pending: None,
            network_warning: None,
        }
    }
}

impl SessionRecord {
    /// Binds a (possibly new) signer. Address-dependent fields are cleared
    /// when the signer changes; contract-wide fields are kept.
    pub fn bind_signer(&mut self, signer: Address) {
        self.connected = true;
        if self.signer != Some(signer) {
            self.signer = Some(signer);
            self.role = None;
            self.already_minted = Observed::provisional(false);
        }
    }

    /// Role is derived at most once per signer.
    pub fn reconcile_owner(&mut self, contract_owner: Address) {
        if self.role.is_some() {
            return;
        }
        if let Some(signer) = self.signer {
            self.role = Some(CallerRole::for_caller(signer, contract_owner));
        }
    }

    /// `owned_token_id` is the caller's entry in `ownerToTokenId`; zero means
    /// the caller holds nothing.
    pub fn reconcile_owned_token(&mut self, owned_token_id: u64) {
        self.already_minted = Observed::confirmed(owned_token_id != 0);
    }

    /// Applies an authoritative phase read. Returns `false` when the read
    /// would move a confirmed phase backwards; such reads are ignored.
    pub fn reconcile_phase(&mut self, observed: PresalePhase) -> bool {
        if self.phase.is_confirmed() && observed < self.phase.value {
            return false;
        }
        self.phase = Observed::confirmed(observed);
        true
    }

    /// The presale is known to have started but its end time could not be
    /// read: confirm at least `PresaleActive`.
    pub fn reconcile_phase_started(&mut self) {
        let phase = self.phase.value.max(PresalePhase::PresaleActive);
        self.phase = Observed::confirmed(phase);
    }

    pub fn apply_provisional_phase(&mut self, phase: PresalePhase) {
        if phase > self.phase.value {
            self.phase = Observed::provisional(phase);
        }
    }

    pub fn apply_provisional_minted(&mut self) {
        self.already_minted = Observed::provisional(true);
    }

    /// Applies a raw `tokenId()` read. The counter never decreases within a
    /// session; returns `false` for a read that would.
    pub fn reconcile_token_counter(&mut self, raw_token_id: u64) -> bool {
        let minted = raw_token_id.saturating_sub(1);
        if minted < self.minted {
            return false;
        }
        self.minted = minted;
        true
    }

    pub fn derive_action(&self) -> MintAction {
        derive_action(self)
    }

    pub fn display(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            action: self.derive_action(),
            minted: self.connected.then_some(self.minted),
            ceiling: MINT_CEILING,
            busy: self.pending.is_some(),
            show_progress: self.connected && self.phase.value != PresalePhase::NotStarted,
            network_warning: self.network_warning.clone(),
        }
    }
}

/// First matching rule wins.
pub fn derive_action(record: &SessionRecord) -> MintAction {
    if !record.connected {
        return MintAction::NeedConnect;
    }
    if record.minted > MINT_CEILING {
        return MintAction::SoldOut;
    }
    if record.already_minted.value {
        return MintAction::AlreadyMinted;
    }
    match (record.role, record.phase.value) {
        (Some(CallerRole::Owner), PresalePhase::NotStarted) => MintAction::AwaitingOwnerStart,
        (_, PresalePhase::NotStarted) => MintAction::PresaleNotStarted,
        (_, PresalePhase::PresaleActive) => MintAction::PresaleMintAvailable,
        (_, PresalePhase::PresaleEnded) => MintAction::PublicMintAvailable,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
