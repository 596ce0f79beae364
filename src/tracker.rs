use crate::types::{DexError, Result, TxFailure, TxState};
use dashmap::DashMap;
use ethers::types::H256;
use tracing::debug;

/// Tracks the lifecycle of a single logical write action:
/// idle -> pending-signature -> confirming -> success | failed.
///
/// Trackers live in a [`TrackerSet`] keyed by action, so every submission of
/// the same logical action goes through the same tracker and is rejected
/// while an earlier one is in flight.
#[derive(Debug)]
pub struct TxTracker {
    /// Short label for log lines ("approve", "swap", ...)
    action: String,
    state: TxState,
}

impl TxTracker {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            state: TxState::Idle,
        }
    }

    pub fn state(&self) -> &TxState {
        &self.state
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// True while a submission is between dispatch and receipt. Callers must
    /// not reach the wallet while this holds.
    pub fn busy(&self) -> bool {
        matches!(
            self.state,
            TxState::PendingSignature | TxState::Confirming(_)
        )
    }

    /// Claim the tracker for a new submission. Rejected while an earlier
    /// submission is still in flight; a terminal state is implicitly reset.
    pub fn begin(&mut self) -> Result<()> {
        if self.busy() {
            return Err(DexError::TransactionInFlight);
        }
        debug!(action = %self.action, "tx dispatched to wallet");
        self.state = TxState::PendingSignature;
        Ok(())
    }

    /// The wallet returned a transaction hash; the tx is now in the mempool.
    pub fn confirming(&mut self, tx_hash: H256) {
        debug_assert!(matches!(self.state, TxState::PendingSignature));
        debug!(action = %self.action, tx = %format!("{:#x}", tx_hash), "tx confirming");
        self.state = TxState::Confirming(tx_hash);
    }

    /// A receipt with status 1 was observed.
    pub fn succeed(&mut self, tx_hash: H256) {
        debug!(action = %self.action, tx = %format!("{:#x}", tx_hash), "tx confirmed");
        self.state = TxState::Success(tx_hash);
    }

    /// Terminal failure: signer rejection, revert, or provider error.
    pub fn fail(&mut self, failure: TxFailure) {
        debug!(action = %self.action, %failure, "tx failed");
        self.state = TxState::Failed(failure);
    }

    /// Return to idle after a terminal state, for a fresh attempt.
    pub fn reset(&mut self) -> Result<()> {
        if self.busy() {
            return Err(DexError::TransactionInFlight);
        }
        self.state = TxState::Idle;
        Ok(())
    }
}

/// Registry of one tracker per logical action ("swap", "approve", ...),
/// shared by every flow invocation on a client. Claiming an action that is
/// already between dispatch and receipt fails, which is what keeps two
/// concurrent invocations of the same flow from both reaching the wallet.
///
/// Guards are scoped to each transition and never held across an await.
#[derive(Debug, Default)]
pub struct TrackerSet {
    trackers: DashMap<String, TxTracker>,
}

impl TrackerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the named action for a new submission
    pub fn begin(&self, action: &str) -> Result<()> {
        self.trackers
            .entry(action.to_string())
            .or_insert_with(|| TxTracker::new(action))
            .begin()
    }

    pub fn confirming(&self, action: &str, tx_hash: H256) {
        if let Some(mut tracker) = self.trackers.get_mut(action) {
            tracker.confirming(tx_hash);
        }
    }

    pub fn succeed(&self, action: &str, tx_hash: H256) {
        if let Some(mut tracker) = self.trackers.get_mut(action) {
            tracker.succeed(tx_hash);
        }
    }

    pub fn fail(&self, action: &str, failure: TxFailure) {
        if let Some(mut tracker) = self.trackers.get_mut(action) {
            tracker.fail(failure);
        }
    }

    pub fn busy(&self, action: &str) -> bool {
        self.trackers
            .get(action)
            .map(|tracker| tracker.busy())
            .unwrap_or(false)
    }

    pub fn state(&self, action: &str) -> Option<TxState> {
        self.trackers.get(action).map(|tracker| tracker.state().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_success_lifecycle() {
        let mut tracker = TxTracker::new("swap");
        assert_eq!(*tracker.state(), TxState::Idle);
        assert!(!tracker.busy());

        tracker.begin().unwrap();
        assert_eq!(*tracker.state(), TxState::PendingSignature);
        assert!(tracker.busy());

        let hash = H256::from_low_u64_be(1);
        tracker.confirming(hash);
        assert_eq!(*tracker.state(), TxState::Confirming(hash));
        assert!(tracker.busy());

        tracker.succeed(hash);
        assert_eq!(*tracker.state(), TxState::Success(hash));
        assert!(!tracker.busy());
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_busy_gating_rejects_resubmission() {
        let mut tracker = TxTracker::new("approve");
        tracker.begin().unwrap();

        // second submission while pending signature must not reach the wallet
        assert!(matches!(
            tracker.begin(),
            Err(DexError::TransactionInFlight)
        ));

        tracker.confirming(H256::from_low_u64_be(2));
        assert!(matches!(
            tracker.begin(),
            Err(DexError::TransactionInFlight)
        ));
    }

    #[test]
    fn test_user_rejection_is_terminal() {
        let mut tracker = TxTracker::new("swap");
        tracker.begin().unwrap();
        tracker.fail(TxFailure::UserRejected);

        assert_eq!(*tracker.state(), TxState::Failed(TxFailure::UserRejected));
        assert!(tracker.state().is_terminal());
        assert!(!tracker.busy());

        // a fresh attempt is allowed after the terminal state
        tracker.begin().unwrap();
        assert_eq!(*tracker.state(), TxState::PendingSignature);
    }

    #[test]
    fn test_tracker_set_rejects_duplicate_action() {
        let set = TrackerSet::new();
        set.begin("swap").unwrap();

        // a second swap claimed anywhere on the client shares the tracker
        // and must not reach the wallet
        assert!(matches!(
            set.begin("swap"),
            Err(DexError::TransactionInFlight)
        ));
        assert!(set.busy("swap"));

        set.confirming("swap", H256::from_low_u64_be(7));
        assert!(matches!(
            set.begin("swap"),
            Err(DexError::TransactionInFlight)
        ));
    }

    #[test]
    fn test_tracker_set_actions_are_independent() {
        let set = TrackerSet::new();
        set.begin("swap").unwrap();

        // the approve leg of another flow is a different logical action
        set.begin("approve").unwrap();
        assert!(set.busy("swap"));
        assert!(set.busy("approve"));
    }

    #[test]
    fn test_tracker_set_allows_fresh_attempt_after_settlement() {
        let set = TrackerSet::new();
        let hash = H256::from_low_u64_be(3);

        set.begin("swap").unwrap();
        set.confirming("swap", hash);
        set.succeed("swap", hash);
        assert_eq!(set.state("swap"), Some(TxState::Success(hash)));

        set.begin("swap").unwrap();
        assert_eq!(set.state("swap"), Some(TxState::PendingSignature));
    }

    #[test]
    fn test_reset_only_from_settled_state() {
        let mut tracker = TxTracker::new("swap");
        tracker.begin().unwrap();
        assert!(tracker.reset().is_err());

        tracker.fail(TxFailure::Reverted("out of funds".to_string()));
        tracker.reset().unwrap();
        assert_eq!(*tracker.state(), TxState::Idle);
    }
}
