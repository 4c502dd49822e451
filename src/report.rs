use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::ledger::Ledger;
use crate::models::EventStatus;
use crate::planner::CyclePlan;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub status: EventStatus,
    pub contributions: usize,
    pub payouts: usize,
}

pub fn summarize_statuses(ledger: &Ledger) -> Vec<StatusSummary> {
    let mut map: HashMap<EventStatus, (usize, usize)> = HashMap::new();

    for event in &ledger.contributions {
        map.entry(event.status).or_insert((0, 0)).0 += 1;
    }
    for event in &ledger.payouts {
        map.entry(event.status).or_insert((0, 0)).1 += 1;
    }

    let mut summaries: Vec<StatusSummary> = map
        .into_iter()
        .map(|(status, (contributions, payouts))| StatusSummary {
            status,
            contributions,
            payouts,
        })
        .collect();

    summaries.sort_by(|a, b| {
        (b.contributions + b.payouts)
            .cmp(&(a.contributions + a.payouts))
            .then_with(|| a.status.as_str().cmp(b.status.as_str()))
    });
    summaries
}

fn display_name(names: &HashMap<Uuid, String>, id: Uuid) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

pub fn build_report(
    group_name: &str,
    plan: &CyclePlan,
    names: &HashMap<Uuid, String>,
    month: Option<(i32, u32)>,
) -> String {
    let ledger = &plan.ledger;
    let config = &plan.config;
    let mut output = String::new();

    let _ = writeln!(output, "# Tontine Schedule Report");
    let _ = writeln!(
        output,
        "Generated for {} (as of {})",
        group_name, ledger.as_of
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cycle");
    let _ = writeln!(
        output,
        "- {} contributions of {} starting {}",
        config.frequency, config.contribution_amount, config.start_date
    );
    let _ = writeln!(
        output,
        "- {} periods, payout method {}",
        plan.periods.len(),
        config.payout_method
    );
    let _ = writeln!(
        output,
        "- collected {}, disbursed {}, discounts {}",
        ledger.total_collected(None),
        ledger.total_disbursed(None),
        ledger.total_discounts()
    );
    if let Some(recipient) = ledger.next_payout_recipient() {
        let _ = writeln!(output, "- next payout to {}", display_name(names, recipient));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Payout Order");
    for payout in &ledger.payouts {
        let _ = writeln!(
            output,
            "- #{} on {}: {} receives {} ({})",
            payout.period_index + 1,
            payout.payout_date,
            display_name(names, payout.recipient_member_id),
            payout.amount,
            payout.status
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    for summary in summarize_statuses(ledger) {
        let _ = writeln!(
            output,
            "- {}: {} contributions, {} payouts",
            summary.status, summary.contributions, summary.payouts
        );
    }

    let mut member_ids: Vec<Uuid> = ledger
        .payouts
        .iter()
        .map(|payout| payout.recipient_member_id)
        .collect();
    for event in &ledger.contributions {
        if !member_ids.contains(&event.member_id) {
            member_ids.push(event.member_id);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Member Balances");
    for member_id in member_ids {
        let balance = ledger.member_balance(member_id);
        let next_due = ledger
            .next_due_for(member_id)
            .map(|event| event.due_date.to_string())
            .unwrap_or_else(|| "nothing due".to_string());
        let _ = writeln!(
            output,
            "- {}: paid {}, received {}, outstanding {}, next due {}",
            display_name(names, member_id),
            balance.contributed,
            balance.received,
            balance.outstanding,
            next_due
        );
    }

    if let Some((year, month)) = month {
        let view = ledger.events_in_month(year, month);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Calendar {year}-{month:02}");

        if view.contributions.is_empty() && view.payouts.is_empty() {
            let _ = writeln!(output, "No events scheduled this month.");
        } else {
            for payout in view.payouts {
                let _ = writeln!(
                    output,
                    "- {} payout to {} ({})",
                    payout.payout_date,
                    display_name(names, payout.recipient_member_id),
                    payout.status
                );
            }
            for event in view.contributions {
                let _ = writeln!(
                    output,
                    "- {} contribution from {} ({})",
                    event.due_date,
                    display_name(names, event.member_id),
                    event.status
                );
            }
        }
    }

    output
}
