use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use tontine_scheduler::clock::FixedClock;
use tontine_scheduler::models::{
    Bid, Confirmation, EventStatus, Frequency, GroupConfig, Member, MemberStatus, PayoutMethod,
};
use tontine_scheduler::{
    allocate, build_ledger, generate_periods, plan_cycle, LedgerOptions, ScheduleError,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn member(position: Option<i32>, reliability: f64, joined_day: u32) -> Member {
    Member {
        id: Uuid::new_v4(),
        joined_at: Utc.with_ymd_and_hms(2023, 11, joined_day, 10, 0, 0).unwrap(),
        status: MemberStatus::Active,
        payout_position: position,
        reliability_score: reliability,
        payout_received: false,
    }
}

fn monthly_rotation_group() -> GroupConfig {
    GroupConfig {
        group_id: Uuid::new_v4(),
        contribution_amount: Decimal::from(50),
        frequency: Frequency::Monthly,
        cycle_length: 6,
        start_date: date(2024, 1, 1),
        payout_method: PayoutMethod::Rotation,
    }
}

#[test]
fn six_member_monthly_rotation() {
    // positions deliberately shuffled relative to join order
    let positions = [3, 0, 5, 1, 4, 2];
    let members: Vec<Member> = positions
        .iter()
        .enumerate()
        .map(|(i, position)| member(Some(*position), 1.0, 1 + i as u32))
        .collect();
    let clock = FixedClock(date(2023, 12, 1));

    let plan = plan_cycle(
        &monthly_rotation_group(),
        &members,
        &[],
        None,
        &clock,
        &[],
        &LedgerOptions::default(),
    )
    .unwrap();

    assert_eq!(plan.ledger.contributions.len(), 36);
    assert_eq!(plan.ledger.payouts.len(), 6);
    assert!(plan.ledger.payouts.iter().all(|p| p.amount == Decimal::from(300)));
    assert_eq!(plan.ledger.payouts[0].payout_date, date(2024, 1, 1));

    let mut by_position = members.clone();
    by_position.sort_by_key(|m| m.payout_position);
    let recipients: Vec<Uuid> = plan
        .ledger
        .payouts
        .iter()
        .map(|p| p.recipient_member_id)
        .collect();
    let expected: Vec<Uuid> = by_position.iter().map(|m| m.id).collect();
    assert_eq!(recipients, expected);
}

#[test]
fn rotation_pays_each_member_once() {
    for size in 1..=9u32 {
        let members: Vec<Member> = (0..size).map(|i| member(None, 1.0, 1 + i)).collect();
        let periods = generate_periods(date(2024, 2, 5), Frequency::Weekly, size).unwrap();
        let allocation = allocate(&periods, &members, PayoutMethod::Rotation, &[], None).unwrap();

        let mut recipients: Vec<Uuid> =
            allocation.assignments.values().map(|a| a.member_id).collect();
        recipients.sort();
        recipients.dedup();
        assert_eq!(recipients.len(), size as usize);
        assert_eq!(allocation.len(), size as usize);
    }
}

#[test]
fn coverage_holds_for_every_frequency() {
    let members: Vec<Member> = (0..4).map(|i| member(Some(i as i32), 1.0, 1 + i)).collect();
    for frequency in [Frequency::Weekly, Frequency::Biweekly, Frequency::Monthly] {
        for cycle_length in [4, 6, 11] {
            let periods = generate_periods(date(2024, 1, 31), frequency, cycle_length).unwrap();
            let allocation =
                allocate(&periods, &members, PayoutMethod::Rotation, &[], None).unwrap();
            let ledger = build_ledger(
                &periods,
                &allocation,
                &members,
                Decimal::from(10),
                date(2024, 1, 1),
                &[],
                &LedgerOptions::default(),
            )
            .unwrap();
            assert_eq!(ledger.contributions.len(), cycle_length as usize * 4);
            assert_eq!(ledger.payouts.len(), cycle_length as usize);
        }
    }
}

#[test]
fn leap_year_monthly_rollover() {
    let periods = generate_periods(date(2024, 1, 31), Frequency::Monthly, 3).unwrap();
    let starts: Vec<NaiveDate> = periods.iter().map(|p| p.start_date).collect();
    assert_eq!(starts, [date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 29)]);
}

#[test]
fn highest_bid_wins_with_reliability_tie_break() {
    let a = member(None, 3.0, 1);
    let b = member(None, 5.0, 2);
    let c = member(None, 1.0, 3);
    let bids = vec![
        Bid { period_index: 0, member_id: a.id, discount: Decimal::from(10) },
        Bid { period_index: 0, member_id: b.id, discount: Decimal::from(10) },
        Bid { period_index: 0, member_id: c.id, discount: Decimal::from(5) },
    ];
    let periods = generate_periods(date(2024, 1, 1), Frequency::Monthly, 1).unwrap();
    let members = vec![a, b.clone(), c];

    let allocation = allocate(&periods, &members, PayoutMethod::Bidding, &bids, None).unwrap();
    assert_eq!(allocation.recipient(0), Some(b.id));
}

#[test]
fn confirmations_drive_completion_and_totals() {
    let members: Vec<Member> = (0..3).map(|i| member(Some(i as i32), 1.0, 1 + i)).collect();
    let mut config = monthly_rotation_group();
    config.cycle_length = 3;

    let feed: Vec<Confirmation> = members
        .iter()
        .map(|m| Confirmation {
            period_index: 0,
            member_id: Some(m.id),
            confirmed: true,
            confirmed_at: Some(date(2024, 1, 2)),
        })
        .chain(std::iter::once(Confirmation {
            period_index: 0,
            member_id: None,
            confirmed: true,
            confirmed_at: Some(date(2024, 1, 3)),
        }))
        .collect();

    let clock = FixedClock(date(2024, 1, 20));
    let plan = plan_cycle(&config, &members, &[], None, &clock, &feed, &LedgerOptions::default())
        .unwrap();
    let ledger = &plan.ledger;

    assert_eq!(ledger.total_collected(None), Decimal::from(150));
    assert_eq!(ledger.total_disbursed(None), Decimal::from(150));
    assert_eq!(ledger.payouts[0].status, EventStatus::Completed);
    assert_eq!(ledger.payouts[1].status, EventStatus::Upcoming);
    assert_eq!(ledger.next_payout_recipient(), Some(members[1].id));

    let again = plan_cycle(&config, &members, &[], None, &clock, &feed, &LedgerOptions::default())
        .unwrap();
    assert_eq!(again.ledger, plan.ledger);
}

#[test]
fn bidding_cycle_longer_than_membership_fails() {
    let members: Vec<Member> = (0..2).map(|i| member(None, 1.0, 1 + i)).collect();
    let periods = generate_periods(date(2024, 1, 1), Frequency::Weekly, 3).unwrap();
    let result = allocate(&periods, &members, PayoutMethod::Bidding, &[], None);
    assert!(matches!(result, Err(ScheduleError::InsufficientMembers { .. })));
}
