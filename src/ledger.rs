use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScheduleError};
use crate::models::{
    Allocation, Confirmation, ConfirmationKey, ContributionEvent, EventStatus, Member,
    PayoutEvent, Period,
};

/// Where in its period a payout is dated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutTiming {
    Start,
    End,
}

impl FromStr for PayoutTiming {
    type Err = ScheduleError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(PayoutTiming::Start),
            "end" => Ok(PayoutTiming::End),
            other => Err(ScheduleError::invalid(format!(
                "unrecognized payout timing '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOptions {
    pub grace_window: Duration,
    /// Extra time past the grace window before an unconfirmed event is missed.
    pub missed_threshold: Duration,
    pub payout_timing: PayoutTiming,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            grace_window: Duration::days(7),
            missed_threshold: Duration::days(3),
            payout_timing: PayoutTiming::Start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub as_of: NaiveDate,
    pub contributions: Vec<ContributionEvent>,
    pub payouts: Vec<PayoutEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBalance {
    pub member_id: Uuid,
    pub contributed: Decimal,
    pub received: Decimal,
    /// Unconfirmed contributions that are already due.
    pub outstanding: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthView<'a> {
    pub contributions: Vec<&'a ContributionEvent>,
    pub payouts: Vec<&'a PayoutEvent>,
}

type Feed<'a> = HashMap<ConfirmationKey, &'a Confirmation>;

fn index_feed(confirmations: &[Confirmation]) -> Feed<'_> {
    confirmations
        .iter()
        .map(|confirmation| (confirmation.key(), confirmation))
        .collect()
}

fn classify(
    due: NaiveDate,
    now: NaiveDate,
    confirmation: Option<&Confirmation>,
    options: &LedgerOptions,
    can_miss: bool,
) -> (EventStatus, Option<NaiveDate>) {
    // an unconfirmed row carries no more weight than a missing one
    if let Some(confirmation) = confirmation.filter(|confirmation| confirmation.confirmed) {
        return (EventStatus::Completed, confirmation.confirmed_at);
    }

    if due > now + options.grace_window {
        (EventStatus::Upcoming, None)
    } else if can_miss && now > due + options.grace_window + options.missed_threshold {
        (EventStatus::Missed, None)
    } else {
        (EventStatus::Pending, None)
    }
}

/// Status of a contribution as of `now`. Only the feed can complete it.
pub fn derive_status(
    due: NaiveDate,
    now: NaiveDate,
    confirmation: Option<&Confirmation>,
    options: &LedgerOptions,
) -> (EventStatus, Option<NaiveDate>) {
    classify(due, now, confirmation, options, true)
}

/// Status of a payout as of `now`. A payout is never missed; an overdue
/// unconfirmed payout stays pending until the feed confirms it.
pub fn derive_payout_status(
    due: NaiveDate,
    now: NaiveDate,
    confirmation: Option<&Confirmation>,
    options: &LedgerOptions,
) -> (EventStatus, Option<NaiveDate>) {
    classify(due, now, confirmation, options, false)
}

/// Builds the contribution and payout events of a cycle.
///
/// Emits one contribution per period per active member, due at the period
/// start, and one payout per period for the allocated recipient. Nothing is
/// emitted unless the whole ledger is valid.
pub fn build_ledger(
    periods: &[Period],
    allocation: &Allocation,
    members: &[Member],
    contribution_amount: Decimal,
    now: NaiveDate,
    confirmations: &[Confirmation],
    options: &LedgerOptions,
) -> Result<Ledger> {
    if contribution_amount <= Decimal::ZERO {
        return Err(ScheduleError::invalid(format!(
            "contribution amount must be positive, got {contribution_amount}"
        )));
    }
    let active: Vec<&Member> = members.iter().filter(|member| member.is_active()).collect();
    if active.is_empty() {
        return Err(ScheduleError::InsufficientMembers { have: 0, need: 1 });
    }
    let active_ids: HashSet<Uuid> = active.iter().map(|member| member.id).collect();
    let pot = contribution_amount * Decimal::from(active.len());
    let feed = index_feed(confirmations);

    let mut contributions = Vec::with_capacity(periods.len() * active.len());
    let mut payouts = Vec::with_capacity(periods.len());

    for period in periods {
        let assignment = allocation.assignments.get(&period.index).ok_or_else(|| {
            ScheduleError::invalid(format!("no payout recipient for period {}", period.index))
        })?;
        if !active_ids.contains(&assignment.member_id) {
            return Err(ScheduleError::invalid(format!(
                "payout recipient {} of period {} is not an active member",
                assignment.member_id, period.index
            )));
        }
        let amount = pot - assignment.discount;
        if amount <= Decimal::ZERO {
            return Err(ScheduleError::invalid(format!(
                "discount {} for period {} consumes the whole pot of {pot}",
                assignment.discount, period.index
            )));
        }

        for member in &active {
            let key = ConfirmationKey::Contribution {
                period_index: period.index,
                member_id: member.id,
            };
            let (status, paid_date) =
                derive_status(period.start_date, now, feed.get(&key).copied(), options);
            contributions.push(ContributionEvent {
                period_index: period.index,
                member_id: member.id,
                amount_due: contribution_amount,
                due_date: period.start_date,
                status,
                paid_date,
            });
        }

        let payout_date = match options.payout_timing {
            PayoutTiming::Start => period.start_date,
            PayoutTiming::End => period.end_date,
        };
        let key = ConfirmationKey::Payout {
            period_index: period.index,
        };
        let (status, paid_date) =
            derive_payout_status(payout_date, now, feed.get(&key).copied(), options);
        payouts.push(PayoutEvent {
            period_index: period.index,
            recipient_member_id: assignment.member_id,
            amount,
            discount: assignment.discount,
            payout_date,
            status,
            paid_date,
        });
    }

    tracing::debug!(
        contributions = contributions.len(),
        payouts = payouts.len(),
        %now,
        "built ledger"
    );
    Ok(Ledger {
        as_of: now,
        contributions,
        payouts,
    })
}

fn advance(previous: EventStatus, derived: EventStatus, what: &str) -> EventStatus {
    if previous.can_transition_to(derived) {
        derived
    } else if previous.is_terminal() {
        tracing::warn!(
            %previous,
            %derived,
            event = what,
            "ignoring transition out of terminal status"
        );
        previous
    } else {
        derived
    }
}

/// Re-derives statuses of an existing ledger for a new `now`. Immutable
/// fields are carried over untouched and terminal statuses are kept.
pub fn reclassify(
    previous: &Ledger,
    now: NaiveDate,
    confirmations: &[Confirmation],
    options: &LedgerOptions,
) -> Ledger {
    let feed = index_feed(confirmations);

    let contributions = previous
        .contributions
        .iter()
        .map(|event| {
            let key = ConfirmationKey::Contribution {
                period_index: event.period_index,
                member_id: event.member_id,
            };
            let (derived, paid_date) =
                derive_status(event.due_date, now, feed.get(&key).copied(), options);
            let status = advance(event.status, derived, "contribution");
            ContributionEvent {
                status,
                paid_date: if status == derived { paid_date } else { event.paid_date },
                ..event.clone()
            }
        })
        .collect();

    let payouts = previous
        .payouts
        .iter()
        .map(|event| {
            let key = ConfirmationKey::Payout {
                period_index: event.period_index,
            };
            let (derived, paid_date) =
                derive_payout_status(event.payout_date, now, feed.get(&key).copied(), options);
            // payouts carried over from older ledgers may still say missed
            let previous = match event.status {
                EventStatus::Missed => EventStatus::Pending,
                status => status,
            };
            let status = advance(previous, derived, "payout");
            PayoutEvent {
                status,
                paid_date: if status == derived { paid_date } else { event.paid_date },
                ..event.clone()
            }
        })
        .collect();

    Ledger {
        as_of: now,
        contributions,
        payouts,
    }
}

fn within(period_index: usize, up_to_period: Option<usize>) -> bool {
    up_to_period.map_or(true, |limit| period_index <= limit)
}

fn is_open(status: EventStatus) -> bool {
    matches!(status, EventStatus::Upcoming | EventStatus::Pending)
}

impl Ledger {
    /// Confirmed contributions, optionally up to and including a period.
    pub fn total_collected(&self, up_to_period: Option<usize>) -> Decimal {
        self.contributions
            .iter()
            .filter(|event| event.status == EventStatus::Completed)
            .filter(|event| within(event.period_index, up_to_period))
            .map(|event| event.amount_due)
            .sum()
    }

    /// Confirmed payouts, optionally up to and including a period.
    pub fn total_disbursed(&self, up_to_period: Option<usize>) -> Decimal {
        self.payouts
            .iter()
            .filter(|event| event.status == EventStatus::Completed)
            .filter(|event| within(event.period_index, up_to_period))
            .map(|event| event.amount)
            .sum()
    }

    /// Sum of winning bids over the cycle.
    pub fn total_discounts(&self) -> Decimal {
        self.payouts.iter().map(|event| event.discount).sum()
    }

    /// Total due from all members in one period.
    pub fn period_pot(&self, period_index: usize) -> Decimal {
        self.contributions
            .iter()
            .filter(|event| event.period_index == period_index)
            .map(|event| event.amount_due)
            .sum()
    }

    pub fn next_due_for(&self, member_id: Uuid) -> Option<&ContributionEvent> {
        self.contributions
            .iter()
            .filter(|event| event.member_id == member_id && is_open(event.status))
            .min_by_key(|event| (event.due_date, event.period_index))
    }

    pub fn next_payout(&self) -> Option<&PayoutEvent> {
        self.payouts
            .iter()
            .filter(|event| is_open(event.status))
            .min_by_key(|event| (event.payout_date, event.period_index))
    }

    pub fn next_payout_recipient(&self) -> Option<Uuid> {
        self.next_payout().map(|event| event.recipient_member_id)
    }

    pub fn payout_received(&self, member_id: Uuid) -> bool {
        self.payouts.iter().any(|event| {
            event.recipient_member_id == member_id && event.status == EventStatus::Completed
        })
    }

    /// Copy of the snapshot with `payout_received` reflecting this ledger.
    pub fn apply_payout_flags(&self, members: &[Member]) -> Vec<Member> {
        members
            .iter()
            .map(|member| Member {
                payout_received: self.payout_received(member.id),
                ..member.clone()
            })
            .collect()
    }

    pub fn member_balance(&self, member_id: Uuid) -> MemberBalance {
        let mut contributed = Decimal::ZERO;
        let mut outstanding = Decimal::ZERO;
        for event in self.contributions.iter().filter(|event| event.member_id == member_id) {
            match event.status {
                EventStatus::Completed => contributed += event.amount_due,
                EventStatus::Missed => outstanding += event.amount_due,
                EventStatus::Pending if event.due_date <= self.as_of => {
                    outstanding += event.amount_due
                }
                _ => {}
            }
        }

        let received = self
            .payouts
            .iter()
            .filter(|event| {
                event.recipient_member_id == member_id && event.status == EventStatus::Completed
            })
            .map(|event| event.amount)
            .sum();

        MemberBalance {
            member_id,
            contributed,
            received,
            outstanding,
            net: received - contributed,
        }
    }

    /// Events dated inside one calendar month.
    pub fn events_in_month(&self, year: i32, month: u32) -> MonthView<'_> {
        let in_month = |date: NaiveDate| date.year() == year && date.month() == month;
        MonthView {
            contributions: self
                .contributions
                .iter()
                .filter(|event| in_month(event.due_date))
                .collect(),
            payouts: self
                .payouts
                .iter()
                .filter(|event| in_month(event.payout_date))
                .collect(),
        }
    }
}
