use crate::gateway::Gateway;
use crate::types::{ApprovalState, Result};
use ethers::types::{Address, U256};
use tracing::debug;

/// Decides whether an approve step must run before a spend. Amounts and
/// allowances are compared as U256 in the token's base unit; this never goes
/// through floating point, so large-supply tokens compare exactly.
pub struct ApprovalGate;

impl ApprovalGate {
    /// True whenever the spender's allowance is below the required amount
    pub fn needs_approval(allowance: U256, required: U256) -> bool {
        allowance < required
    }

    /// Read the current allowance for (token, owner, spender)
    pub async fn check(
        gateway: &Gateway,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<ApprovalState> {
        let allowance = gateway.allowance(token, owner, spender).await?;
        debug!(
            token = %format!("{:#x}", token),
            spender = %format!("{:#x}", spender),
            allowance = %allowance,
            "allowance read"
        );
        Ok(ApprovalState {
            token,
            owner,
            spender,
            allowance,
        })
    }
}

/// Progress of the approval step inside a multi-step flow. Keyed by (token,
/// amount): any change to either resets the step to `Check`, so a stale
/// approval is never force-matched to a newly entered larger amount, and
/// `Ready` is only reached off a fresh allowance read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPhase {
    /// Allowance not checked yet for the current inputs
    Check,

    /// Allowance read came back short; an approve must run
    NeedsApprove,

    /// A fresh allowance read confirmed sufficiency
    Ready,
}

#[derive(Debug)]
pub struct ApprovalStep {
    token: Address,
    amount: U256,
    phase: ApprovalPhase,
}

impl ApprovalStep {
    pub fn new(token: Address, amount: U256) -> Self {
        Self {
            token,
            amount,
            phase: ApprovalPhase::Check,
        }
    }

    pub fn phase(&self) -> &ApprovalPhase {
        &self.phase
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Register the inputs the user currently has entered. A change of token
    /// or amount invalidates any progress.
    pub fn observe_inputs(&mut self, token: Address, amount: U256) {
        if token != self.token || amount != self.amount {
            debug!("approval inputs changed, resetting to check");
            self.token = token;
            self.amount = amount;
            self.phase = ApprovalPhase::Check;
        }
    }

    /// Feed in a fresh allowance read for the current inputs
    pub fn observe_allowance(&mut self, allowance: U256) {
        self.phase = if ApprovalGate::needs_approval(allowance, self.amount) {
            ApprovalPhase::NeedsApprove
        } else {
            ApprovalPhase::Ready
        };
    }

    pub fn is_ready(&self) -> bool {
        self.phase == ApprovalPhase::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_approval_exact_boundary() {
        // allowance=0, requested=100 -> approval required
        assert!(ApprovalGate::needs_approval(
            U256::zero(),
            U256::from(100u64)
        ));
        // approve to exactly 100 -> no longer required
        assert!(!ApprovalGate::needs_approval(
            U256::from(100u64),
            U256::from(100u64)
        ));
        // same allowance, requested bumped to 101 -> required again
        assert!(ApprovalGate::needs_approval(
            U256::from(100u64),
            U256::from(101u64)
        ));
    }

    #[test]
    fn test_needs_approval_large_values_compare_exactly() {
        // values beyond f64's 53-bit mantissa still compare correctly
        let allowance = U256::from_dec_str("100000000000000000000000001").unwrap();
        let required = U256::from_dec_str("100000000000000000000000002").unwrap();
        assert!(ApprovalGate::needs_approval(allowance, required));
        assert!(!ApprovalGate::needs_approval(required, allowance));
    }

    #[test]
    fn test_step_resets_on_amount_change() {
        let token = Address::from_low_u64_be(1);
        let mut step = ApprovalStep::new(token, U256::from(100u64));
        assert_eq!(*step.phase(), ApprovalPhase::Check);

        step.observe_allowance(U256::from(100u64));
        assert!(step.is_ready());

        // user edits the amount upward: progress is discarded
        step.observe_inputs(token, U256::from(101u64));
        assert_eq!(*step.phase(), ApprovalPhase::Check);

        step.observe_allowance(U256::from(100u64));
        assert_eq!(*step.phase(), ApprovalPhase::NeedsApprove);
    }

    #[test]
    fn test_step_resets_on_token_change() {
        let mut step = ApprovalStep::new(Address::from_low_u64_be(1), U256::from(100u64));
        step.observe_allowance(U256::from(200u64));
        assert!(step.is_ready());

        step.observe_inputs(Address::from_low_u64_be(2), U256::from(100u64));
        assert_eq!(*step.phase(), ApprovalPhase::Check);
    }

    #[test]
    fn test_unchanged_inputs_keep_progress() {
        let token = Address::from_low_u64_be(1);
        let mut step = ApprovalStep::new(token, U256::from(100u64));
        step.observe_allowance(U256::from(200u64));
        step.observe_inputs(token, U256::from(100u64));
        assert!(step.is_ready());
    }
}
