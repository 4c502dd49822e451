use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use tontine_scheduler::models::{Bid, Confirmation, GroupConfig, Member};

pub struct GroupRecord {
    pub name: String,
    pub config: GroupConfig,
    pub random_seed: Option<i64>,
}

pub struct MemberRecord {
    pub full_name: String,
    pub member: Member,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let group_id = Uuid::parse_str("6a1f3c52-8d0e-4b7a-9e21-5c4d3b2a1f00")?;
    let start_date = NaiveDate::from_ymd_opt(2026, 1, 1).context("invalid date")?;

    sqlx::query(
        r#"
        INSERT INTO tontine_scheduler.groups
        (id, name, contribution_amount, frequency, cycle_length, start_date, payout_method)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name
        "#,
    )
    .bind(group_id)
    .bind("Market Women Savings Circle")
    .bind(Decimal::from(50))
    .bind("monthly")
    .bind(6_i32)
    .bind(start_date)
    .bind("rotation")
    .execute(pool)
    .await?;

    let members = vec![
        ("Awa Diallo", "awa.diallo@example.com", 0, 4.5),
        ("Kofi Mensah", "kofi.mensah@example.com", 1, 4.0),
        ("Ngozi Okafor", "ngozi.okafor@example.com", 2, 3.5),
        ("Aminata Traore", "aminata.traore@example.com", 3, 5.0),
        ("Yaw Boateng", "yaw.boateng@example.com", 4, 3.0),
        ("Fatou Ndiaye", "fatou.ndiaye@example.com", 5, 4.2),
    ];

    for (full_name, email, position, reliability) in members {
        sqlx::query(
            r#"
            INSERT INTO tontine_scheduler.members
            (id, group_id, full_name, email, status, payout_position, reliability_score)
            VALUES ($1, $2, $3, $4, 'active', $5, $6)
            ON CONFLICT (group_id, email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                payout_position = EXCLUDED.payout_position,
                reliability_score = EXCLUDED.reliability_score
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(full_name)
        .bind(email)
        .bind(position)
        .bind(reliability)
        .execute(pool)
        .await?;
    }

    Ok(group_id)
}

pub async fn fetch_group(pool: &PgPool, group_id: Uuid) -> anyhow::Result<GroupRecord> {
    let row = sqlx::query(
        "SELECT name, contribution_amount, frequency, cycle_length, start_date, \
         payout_method, random_seed \
         FROM tontine_scheduler.groups WHERE id = $1",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("group {group_id} not found"))?;

    let frequency: String = row.get("frequency");
    let payout_method: String = row.get("payout_method");
    let cycle_length: i32 = row.get("cycle_length");

    let config = GroupConfig {
        group_id,
        contribution_amount: row.get("contribution_amount"),
        frequency: frequency.parse()?,
        cycle_length: u32::try_from(cycle_length)
            .with_context(|| format!("group {group_id} has cycle length {cycle_length}"))?,
        start_date: row.get("start_date"),
        payout_method: payout_method.parse()?,
    };

    Ok(GroupRecord {
        name: row.get("name"),
        config,
        random_seed: row.get("random_seed"),
    })
}

pub async fn fetch_members(pool: &PgPool, group_id: Uuid) -> anyhow::Result<Vec<MemberRecord>> {
    let rows = sqlx::query(
        "SELECT id, full_name, joined_at, status, payout_position, reliability_score, \
         payout_received \
         FROM tontine_scheduler.members WHERE group_id = $1 \
         ORDER BY joined_at",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let mut members = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        let joined_at: DateTime<Utc> = row.get("joined_at");
        members.push(MemberRecord {
            full_name: row.get("full_name"),
            member: Member {
                id: row.get("id"),
                joined_at,
                status: status.parse()?,
                payout_position: row.get("payout_position"),
                reliability_score: row.get("reliability_score"),
                payout_received: row.get("payout_received"),
            },
        });
    }

    Ok(members)
}

fn period_index(raw: i32) -> anyhow::Result<usize> {
    usize::try_from(raw).with_context(|| format!("negative period index {raw}"))
}

pub async fn fetch_bids(pool: &PgPool, group_id: Uuid) -> anyhow::Result<Vec<Bid>> {
    let rows = sqlx::query(
        "SELECT period_index, member_id, discount \
         FROM tontine_scheduler.bids WHERE group_id = $1",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Bid {
                period_index: period_index(row.get("period_index"))?,
                member_id: row.get("member_id"),
                discount: row.get("discount"),
            })
        })
        .collect()
}

pub async fn fetch_confirmations(
    pool: &PgPool,
    group_id: Uuid,
) -> anyhow::Result<Vec<Confirmation>> {
    let rows = sqlx::query(
        "SELECT period_index, member_id, confirmed, confirmed_at \
         FROM tontine_scheduler.confirmations WHERE group_id = $1",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Confirmation {
                period_index: period_index(row.get("period_index"))?,
                member_id: row.get("member_id"),
                confirmed: row.get("confirmed"),
                confirmed_at: row.get("confirmed_at"),
            })
        })
        .collect()
}

/// Returns the group's random seed, drawing and storing one on first use.
pub async fn ensure_seed(pool: &PgPool, group_id: Uuid) -> anyhow::Result<u64> {
    let candidate: i64 = rand::random();
    let stored: i64 = sqlx::query(
        r#"
        UPDATE tontine_scheduler.groups
        SET random_seed = COALESCE(random_seed, $2)
        WHERE id = $1
        RETURNING random_seed
        "#,
    )
    .bind(group_id)
    .bind(candidate)
    .fetch_one(pool)
    .await?
    .get("random_seed");

    Ok(stored as u64)
}

pub async fn store_payout_flags(pool: &PgPool, members: &[Member]) -> anyhow::Result<u64> {
    let mut updated = 0;
    for member in members {
        let result = sqlx::query(
            r#"
            UPDATE tontine_scheduler.members
            SET payout_received = $2
            WHERE id = $1 AND payout_received IS DISTINCT FROM $2
            "#,
        )
        .bind(member.id)
        .bind(member.payout_received)
        .execute(pool)
        .await?;
        updated += result.rows_affected();
    }
    Ok(updated)
}

pub async fn import_members_csv(
    pool: &PgPool,
    group_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        status: Option<String>,
        payout_position: Option<i32>,
        reliability_score: Option<f64>,
        joined_at: Option<DateTime<Utc>>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status = row.status.unwrap_or_else(|| "pending".to_string());
        // reject unknown statuses before they reach the table
        status.parse::<tontine_scheduler::models::MemberStatus>()?;

        let result = sqlx::query(
            r#"
            INSERT INTO tontine_scheduler.members
            (id, group_id, full_name, email, joined_at, status, payout_position, reliability_score)
            VALUES ($1, $2, $3, $4, COALESCE($5, now()), $6, $7, COALESCE($8, 0))
            ON CONFLICT (group_id, email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(row.joined_at)
        .bind(&status)
        .bind(row.payout_position)
        .bind(row.reliability_score)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
