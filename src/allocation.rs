use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Result, ScheduleError};
use crate::models::{Allocation, Assignment, Bid, Member, PayoutMethod, Period};

/// Assigns one payout recipient per period.
///
/// Rotation and random wrap around the member list when there are more
/// periods than members. Bidding never wraps. `seed` is only read by the
/// random policy, which requires it.
pub fn allocate(
    periods: &[Period],
    members: &[Member],
    method: PayoutMethod,
    bids: &[Bid],
    seed: Option<u64>,
) -> Result<Allocation> {
    let active: Vec<&Member> = members.iter().filter(|member| member.is_active()).collect();
    if active.is_empty() {
        return Err(ScheduleError::InsufficientMembers { have: 0, need: 1 });
    }

    let assignments = match method {
        PayoutMethod::Rotation => {
            let order = rotation_order(&active);
            wrap_assign(periods, &order)?
        }
        PayoutMethod::Random => {
            let seed = seed.ok_or_else(|| {
                ScheduleError::invalid("random payout method requires a seed")
            })?;
            let order = shuffled_order(&active, seed);
            wrap_assign(periods, &order)?
        }
        PayoutMethod::Bidding => assign_by_bidding(periods, &active, bids)?,
    };

    tracing::debug!(
        method = %method,
        periods = periods.len(),
        members = active.len(),
        "allocated payouts"
    );
    Ok(Allocation {
        method,
        assignments,
    })
}

/// Ascending payout position; members without one follow, by join time.
fn rotation_cmp(a: &Member, b: &Member) -> Ordering {
    let position = |member: &Member| (member.payout_position.is_none(), member.payout_position);
    position(a)
        .cmp(&position(b))
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn rotation_order(members: &[&Member]) -> Vec<Uuid> {
    let mut ordered = members.to_vec();
    ordered.sort_by(|a, b| rotation_cmp(a, b));
    ordered.into_iter().map(|member| member.id).collect()
}

/// Uniform permutation, independent of the order the snapshot arrived in.
fn shuffled_order(members: &[&Member], seed: u64) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = members.iter().map(|member| member.id).collect();
    ids.sort();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids
}

fn wrap_assign(periods: &[Period], order: &[Uuid]) -> Result<BTreeMap<usize, Assignment>> {
    let mut assignments = BTreeMap::new();
    let mut seen_in_pass: HashMap<Uuid, usize> = HashMap::new();

    for (slot, period) in periods.iter().enumerate() {
        if slot % order.len() == 0 {
            seen_in_pass.clear();
        }
        let member_id = order[slot % order.len()];
        if let Some(first) = seen_in_pass.insert(member_id, period.index) {
            return Err(ScheduleError::AllocationConflict {
                member_id,
                first,
                second: period.index,
            });
        }
        assignments.insert(
            period.index,
            Assignment {
                member_id,
                discount: Decimal::ZERO,
            },
        );
    }
    Ok(assignments)
}

fn assign_by_bidding(
    periods: &[Period],
    active: &[&Member],
    bids: &[Bid],
) -> Result<BTreeMap<usize, Assignment>> {
    if periods.len() > active.len() {
        return Err(ScheduleError::InsufficientMembers {
            have: active.len(),
            need: periods.len(),
        });
    }
    if let Some(bid) = bids.iter().find(|bid| bid.discount < Decimal::ZERO) {
        return Err(ScheduleError::invalid(format!(
            "bid from {} for period {} is negative",
            bid.member_id, bid.period_index
        )));
    }

    let by_id: HashMap<Uuid, &Member> = active.iter().map(|member| (member.id, *member)).collect();
    let rotation = rotation_order(active);
    let mut allocated: HashSet<Uuid> = HashSet::new();
    let mut assignments = BTreeMap::new();

    for period in periods {
        let winner = bids
            .iter()
            .filter(|bid| bid.period_index == period.index && bid.discount > Decimal::ZERO)
            .filter(|bid| !allocated.contains(&bid.member_id))
            .filter_map(|bid| by_id.get(&bid.member_id).map(|member| (bid, *member)))
            .max_by(|(a_bid, a), (b_bid, b)| {
                a_bid
                    .discount
                    .cmp(&b_bid.discount)
                    .then_with(|| a.reliability_score.total_cmp(&b.reliability_score))
                    .then_with(|| b.joined_at.cmp(&a.joined_at))
                    .then_with(|| b.id.cmp(&a.id))
            });

        let assignment = match winner {
            Some((bid, member)) => Assignment {
                member_id: member.id,
                discount: bid.discount,
            },
            None => {
                let member_id = rotation
                    .iter()
                    .copied()
                    .find(|id| !allocated.contains(id))
                    .ok_or(ScheduleError::InsufficientMembers {
                        have: active.len(),
                        need: periods.len(),
                    })?;
                Assignment {
                    member_id,
                    discount: Decimal::ZERO,
                }
            }
        };

        allocated.insert(assignment.member_id);
        assignments.insert(period.index, assignment);
    }
    Ok(assignments)
}
