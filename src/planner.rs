use serde::Serialize;

use crate::allocation::allocate;
use crate::clock::Clock;
use crate::error::{Result, ScheduleError};
use crate::ledger::{build_ledger, Ledger, LedgerOptions};
use crate::models::{Allocation, Bid, Confirmation, GroupConfig, Member, Period};
use crate::schedule::generate_periods;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePlan {
    pub config: GroupConfig,
    pub periods: Vec<Period>,
    pub allocation: Allocation,
    pub ledger: Ledger,
}

/// Runs generation, allocation and classification for one cycle.
///
/// A cycle shorter than the active membership would leave members unpaid,
/// so it is rejected here even though `allocate` alone tolerates it.
pub fn plan_cycle(
    config: &GroupConfig,
    members: &[Member],
    bids: &[Bid],
    seed: Option<u64>,
    clock: &dyn Clock,
    confirmations: &[Confirmation],
    options: &LedgerOptions,
) -> Result<CyclePlan> {
    config.validate()?;

    let active = members.iter().filter(|member| member.is_active()).count();
    if active == 0 {
        return Err(ScheduleError::InsufficientMembers { have: 0, need: 1 });
    }
    if (config.cycle_length as usize) < active {
        return Err(ScheduleError::invalid(format!(
            "cycle of {} periods cannot pay {} active members",
            config.cycle_length, active
        )));
    }

    let periods = generate_periods(config.start_date, config.frequency, config.cycle_length)?;
    let allocation = allocate(&periods, members, config.payout_method, bids, seed)?;
    let ledger = build_ledger(
        &periods,
        &allocation,
        members,
        config.contribution_amount,
        clock.today(),
        confirmations,
        options,
    )?;

    tracing::info!(
        group_id = %config.group_id,
        method = %config.payout_method,
        periods = periods.len(),
        members = active,
        "planned cycle"
    );
    Ok(CyclePlan {
        config: config.clone(),
        periods,
        allocation,
        ledger,
    })
}
