use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use tontine_scheduler::clock::{Clock, FixedClock, SystemClock};
use tontine_scheduler::models::{CycleDuration, Frequency, PayoutMethod};
use tontine_scheduler::{
    cycle_length_for, plan_cycle, report, CyclePlan, LedgerOptions, PayoutTiming,
};

mod db;

#[derive(Parser)]
#[command(name = "tontine-scheduler")]
#[command(about = "Contribution and payout schedules for tontine groups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LedgerArgs {
    /// Classify events as of this date instead of today
    #[arg(long)]
    as_of: Option<NaiveDate>,
    #[arg(long, default_value_t = 7)]
    grace_days: i64,
    #[arg(long, default_value_t = 3)]
    missed_days: i64,
    /// Date payouts at the start or end of their period
    #[arg(long, default_value = "start")]
    payout_at: PayoutTiming,
}

impl LedgerArgs {
    fn options(&self) -> anyhow::Result<LedgerOptions> {
        if self.grace_days < 0 || self.missed_days < 0 {
            anyhow::bail!("grace and missed windows must not be negative");
        }
        let days = |count: i64| {
            Duration::try_days(count)
                .ok_or_else(|| anyhow::anyhow!("window of {count} days is out of range"))
        };
        Ok(LedgerOptions {
            grace_window: days(self.grace_days)?,
            missed_threshold: days(self.missed_days)?,
            payout_timing: self.payout_at,
        })
    }

    fn clock(&self) -> Box<dyn Clock> {
        match self.as_of {
            Some(date) => Box::new(FixedClock(date)),
            None => Box::new(SystemClock),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo group with six members
    Seed,
    /// Import members of a group from a CSV file
    ImportMembers {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Estimate the period count of a cycle without touching the database
    Estimate {
        #[arg(long)]
        frequency: Frequency,
        /// 3_months, 6_months, 9_months, 12_months or a month count
        #[arg(long)]
        duration: CycleDuration,
    },
    /// Print the schedule and ledger of a group
    Schedule {
        #[arg(long)]
        group: Uuid,
        #[command(flatten)]
        ledger: LedgerArgs,
        /// Emit the full plan as JSON
        #[arg(long)]
        json: bool,
        /// Write payout_received flags back to the members table
        #[arg(long)]
        sync_flags: bool,
    },
    /// Generate a markdown schedule report
    Report {
        #[arg(long)]
        group: Uuid,
        #[command(flatten)]
        ledger: LedgerArgs,
        /// Include a calendar section for this month (YYYY-MM)
        #[arg(long, value_parser = parse_month)]
        month: Option<(i32, u32)>,
        #[arg(long, default_value = "schedule.md")]
        out: PathBuf,
    },
}

fn parse_month(value: &str) -> Result<(i32, u32), String> {
    let (year, month) = value
        .split_once('-')
        .ok_or_else(|| format!("expected YYYY-MM, got '{value}'"))?;
    let year: i32 = year.parse().map_err(|_| format!("invalid year in '{value}'"))?;
    let month: u32 = month.parse().map_err(|_| format!("invalid month in '{value}'"))?;
    if !(1..=12).contains(&month) {
        return Err(format!("month must be between 1 and 12, got {month}"));
    }
    Ok((year, month))
}

async fn load_plan(
    pool: &PgPool,
    group_id: Uuid,
    args: &LedgerArgs,
) -> anyhow::Result<(String, CyclePlan, HashMap<Uuid, String>)> {
    let group = db::fetch_group(pool, group_id).await?;
    let records = db::fetch_members(pool, group_id).await?;
    let confirmations = db::fetch_confirmations(pool, group_id).await?;

    let bids = match group.config.payout_method {
        PayoutMethod::Bidding => db::fetch_bids(pool, group_id).await?,
        _ => Vec::new(),
    };
    let seed = match (group.config.payout_method, group.random_seed) {
        (PayoutMethod::Random, Some(seed)) => Some(seed as u64),
        (PayoutMethod::Random, None) => Some(db::ensure_seed(pool, group_id).await?),
        _ => None,
    };

    let names: HashMap<Uuid, String> = records
        .iter()
        .map(|record| (record.member.id, record.full_name.clone()))
        .collect();
    let members: Vec<_> = records.into_iter().map(|record| record.member).collect();

    let clock = args.clock();
    let plan = plan_cycle(
        &group.config,
        &members,
        &bids,
        seed,
        clock.as_ref(),
        &confirmations,
        &args.options()?,
    )
    .with_context(|| format!("failed to plan cycle for group {group_id}"))?;

    Ok((group.name, plan, names))
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Estimate {
        frequency,
        duration,
    } = cli.command
    {
        let periods = cycle_length_for(duration, frequency)?;
        println!(
            "{} months of {} contributions: {} periods, {} members for a clean cycle.",
            duration.months(),
            frequency,
            periods,
            periods
        );
        return Ok(());
    }

    let pool = connect().await?;

    match cli.command {
        Commands::Estimate { .. } => {}
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let group_id = db::seed(&pool).await?;
            println!("Seed data inserted for group {group_id}.");
        }
        Commands::ImportMembers { group, csv } => {
            let inserted = db::import_members_csv(&pool, group, &csv).await?;
            println!("Inserted {inserted} members from {}.", csv.display());
        }
        Commands::Schedule {
            group,
            ledger,
            json,
            sync_flags,
        } => {
            let (name, plan, names) = load_plan(&pool, group, &ledger).await?;

            if sync_flags {
                let records = db::fetch_members(&pool, group).await?;
                let members: Vec<_> = records.into_iter().map(|record| record.member).collect();
                let flagged = plan.ledger.apply_payout_flags(&members);
                let updated = db::store_payout_flags(&pool, &flagged).await?;
                tracing::info!(updated, "synced payout flags");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }

            println!("{name}: {} periods as of {}", plan.periods.len(), plan.ledger.as_of);
            for payout in &plan.ledger.payouts {
                let recipient = names
                    .get(&payout.recipient_member_id)
                    .cloned()
                    .unwrap_or_else(|| payout.recipient_member_id.to_string());
                println!(
                    "- #{} {} -> {} receives {} ({})",
                    payout.period_index + 1,
                    payout.payout_date,
                    recipient,
                    payout.amount,
                    payout.status
                );
            }
            println!(
                "Collected {} and disbursed {} so far.",
                plan.ledger.total_collected(None),
                plan.ledger.total_disbursed(None)
            );
        }
        Commands::Report {
            group,
            ledger,
            month,
            out,
        } => {
            let (name, plan, names) = load_plan(&pool, group, &ledger).await?;
            let report = report::build_report(&name, &plan, &names, month);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_argument_parses() {
        assert_eq!(parse_month("2024-02"), Ok((2024, 2)));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("february").is_err());
    }

    #[test]
    fn cli_accepts_schedule_flags() {
        let cli = Cli::try_parse_from([
            "tontine-scheduler",
            "schedule",
            "--group",
            "6a1f3c52-8d0e-4b7a-9e21-5c4d3b2a1f00",
            "--as-of",
            "2026-03-01",
            "--payout-at",
            "end",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Schedule { ledger, json, .. } => {
                assert!(json);
                assert_eq!(ledger.payout_at, PayoutTiming::End);
                assert_eq!(ledger.options().unwrap().grace_window, Duration::days(7));
            }
            _ => panic!("expected schedule command"),
        }
    }

    #[test]
    fn out_of_range_windows_are_errors() {
        let cli = Cli::try_parse_from([
            "tontine-scheduler",
            "report",
            "--group",
            "6a1f3c52-8d0e-4b7a-9e21-5c4d3b2a1f00",
            "--grace-days",
            "9223372036854775807",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { ledger, .. } => assert!(ledger.options().is_err()),
            _ => panic!("expected report command"),
        }
    }
}
