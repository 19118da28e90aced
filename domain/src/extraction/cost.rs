//! Cost accounting
//!
//! [`CostLedger`] enforces the run's cost budget across concurrent calls.
//! Every dispatch first reserves the model's worst-case call cost; once
//! `spent + reserved` reaches the budget, further dispatches are refused.
//! Settlement swaps the reservation for the actual cost, so the recorded
//! total never exceeds the budget by more than one call's worst-case cost.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Token usage and price of one model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd: f64,
}

impl CostInfo {
    pub fn new(input_tokens: u64, output_tokens: u64, usd: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            usd,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl Add for CostInfo {
    type Output = CostInfo;

    fn add(self, rhs: CostInfo) -> CostInfo {
        CostInfo {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            usd: self.usd + rhs.usd,
        }
    }
}

impl AddAssign for CostInfo {
    fn add_assign(&mut self, rhs: CostInfo) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for CostInfo {
    fn sum<I: Iterator<Item = CostInfo>>(iter: I) -> Self {
        iter.fold(CostInfo::zero(), Add::add)
    }
}

/// A granted budget reservation
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "a reservation must be settled or released"]
pub struct Reservation {
    amount: f64,
}

impl Reservation {
    pub fn amount(&self) -> f64 {
        self.amount
    }
}

/// Budget bookkeeping for one run
#[derive(Debug, Clone, PartialEq)]
pub struct CostLedger {
    budget: f64,
    spent: CostInfo,
    reserved: f64,
}

impl CostLedger {
    pub fn new(budget: f64) -> Self {
        Self {
            budget,
            spent: CostInfo::zero(),
            reserved: 0.0,
        }
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn spent(&self) -> CostInfo {
        self.spent
    }

    pub fn reserved(&self) -> f64 {
        self.reserved
    }

    pub fn remaining(&self) -> f64 {
        (self.budget - self.spent.usd - self.reserved).max(0.0)
    }

    /// Whether no further call may be dispatched
    pub fn is_exhausted(&self) -> bool {
        self.spent.usd + self.reserved >= self.budget
    }

    /// Reserve budget for one call, refusing once the budget is reached
    pub fn try_reserve(&mut self, worst_case: f64) -> Option<Reservation> {
        if self.is_exhausted() {
            return None;
        }
        let amount = worst_case.max(0.0);
        self.reserved += amount;
        Some(Reservation { amount })
    }

    /// Replace a reservation with the call's actual cost
    pub fn settle(&mut self, reservation: Reservation, actual: CostInfo) {
        self.reserved = (self.reserved - reservation.amount).max(0.0);
        self.spent += actual;
    }

    /// Record cost that was not preceded by a reservation
    pub fn record(&mut self, actual: CostInfo) {
        self.spent += actual;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_sum() {
        let total: CostInfo = vec![CostInfo::new(10, 5, 0.01), CostInfo::new(20, 5, 0.02)]
            .into_iter()
            .sum();
        assert_eq!(total.input_tokens, 30);
        assert_eq!(total.output_tokens, 10);
        assert!((total.usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_reservations_block_dispatch_at_budget() {
        let mut ledger = CostLedger::new(0.10);
        let a = ledger.try_reserve(0.06).unwrap();
        let b = ledger.try_reserve(0.06).unwrap();
        // spent + reserved = 0.12 >= 0.10
        assert!(ledger.try_reserve(0.01).is_none());

        ledger.settle(a, CostInfo::new(100, 10, 0.02));
        ledger.settle(b, CostInfo::new(100, 10, 0.03));
        assert!(ledger.reserved() < 1e-12);
        assert!((ledger.spent().usd - 0.05).abs() < 1e-9);
        assert!(ledger.try_reserve(0.06).is_some());
    }

    #[test]
    fn test_overrun_bounded_by_one_worst_case_call() {
        let mut ledger = CostLedger::new(0.10);
        let worst = 0.04;
        while let Some(r) = ledger.try_reserve(worst) {
            ledger.settle(r, CostInfo::new(1, 1, worst));
        }
        assert!(ledger.spent().usd <= ledger.budget() + worst + 1e-9);
        assert!(ledger.is_exhausted());
    }

    #[test]
    fn test_zero_budget_refuses_everything() {
        let mut ledger = CostLedger::new(0.0);
        assert!(ledger.try_reserve(0.0).is_none());
    }
}
