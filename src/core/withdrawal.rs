use super::types::WithdrawalPolicy;

/// Per-trial withdrawal accumulator. Created fresh by [`WithdrawalPolicy::start_trial`]
/// so no trial ever observes another trial's escalation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalState {
    current_amount: f64,
    active_years: u32,
}

impl WithdrawalState {
    pub fn active_years(&self) -> u32 {
        self.active_years
    }
}

impl WithdrawalPolicy {
    pub fn start_trial(&self) -> WithdrawalState {
        let current_amount = match *self {
            WithdrawalPolicy::Percentage { .. } => 0.0,
            WithdrawalPolicy::FixedWithInflation { initial_amount, .. } => initial_amount,
        };
        WithdrawalState {
            current_amount,
            active_years: 0,
        }
    }

    /// Nominal request for one active year. Call exactly once per active year.
    pub fn request(&self, state: &mut WithdrawalState, balance_pre: f64) -> f64 {
        let request = match *self {
            WithdrawalPolicy::Percentage { rate } => balance_pre * rate,
            WithdrawalPolicy::FixedWithInflation { inflation, .. } => {
                if state.active_years > 0 {
                    state.current_amount *= 1.0 + inflation;
                }
                state.current_amount
            }
        };
        state.active_years += 1;
        request
    }

    pub fn label(&self) -> &'static str {
        match self {
            WithdrawalPolicy::Percentage { .. } => "percentage",
            WithdrawalPolicy::FixedWithInflation { .. } => "fixed-inflation",
        }
    }
}

/// Caps a request at the available balance. Returns `(withdrawn, remaining)`.
pub fn apply_withdrawal(balance_pre: f64, request: f64) -> (f64, f64) {
    let withdrawn = request.max(0.0).min(balance_pre.max(0.0));
    let remaining = (balance_pre - withdrawn).max(0.0);
    (withdrawn, remaining)
}
