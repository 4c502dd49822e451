use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Approximate number of periods per calendar month, used to turn a
    /// duration in months into a period count.
    pub fn periods_per_month(self) -> u32 {
        match self {
            Frequency::Weekly => 4,
            Frequency::Biweekly => 2,
            Frequency::Monthly => 1,
        }
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ScheduleError::invalid(format!(
                "unrecognized frequency '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutMethod {
    Rotation,
    Random,
    Bidding,
}

impl PayoutMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutMethod::Rotation => "rotation",
            PayoutMethod::Random => "random",
            PayoutMethod::Bidding => "bidding",
        }
    }
}

impl FromStr for PayoutMethod {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rotation" => Ok(PayoutMethod::Rotation),
            "random" => Ok(PayoutMethod::Random),
            "bidding" => Ok(PayoutMethod::Bidding),
            other => Err(ScheduleError::invalid(format!(
                "unrecognized payout method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cycle duration picked when planning a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDuration {
    ThreeMonths,
    SixMonths,
    NineMonths,
    TwelveMonths,
    Custom(u32),
}

impl CycleDuration {
    pub fn months(self) -> u32 {
        match self {
            CycleDuration::ThreeMonths => 3,
            CycleDuration::SixMonths => 6,
            CycleDuration::NineMonths => 9,
            CycleDuration::TwelveMonths => 12,
            CycleDuration::Custom(months) => months,
        }
    }
}

impl FromStr for CycleDuration {
    type Err = ScheduleError;

    /// Accepts `3_months`, `6_months`, `9_months`, `12_months`,
    /// `custom:<n>` or a bare month count.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let parsed = match value {
            "3_months" => CycleDuration::ThreeMonths,
            "6_months" => CycleDuration::SixMonths,
            "9_months" => CycleDuration::NineMonths,
            "12_months" => CycleDuration::TwelveMonths,
            other => {
                let raw = other.strip_prefix("custom:").unwrap_or(other);
                let months = raw.parse::<u32>().map_err(|_| {
                    ScheduleError::invalid(format!("unrecognized cycle duration '{other}'"))
                })?;
                CycleDuration::Custom(months)
            }
        };

        if parsed.months() == 0 {
            return Err(ScheduleError::invalid("cycle duration must be at least one month"));
        }
        Ok(parsed)
    }
}

/// Group configuration, immutable once a cycle starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    pub group_id: Uuid,
    pub contribution_amount: Decimal,
    pub frequency: Frequency,
    pub cycle_length: u32,
    pub start_date: NaiveDate,
    pub payout_method: PayoutMethod,
}

impl GroupConfig {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.contribution_amount <= Decimal::ZERO {
            return Err(ScheduleError::invalid(format!(
                "contribution amount must be positive, got {}",
                self.contribution_amount
            )));
        }
        if self.cycle_length == 0 {
            return Err(ScheduleError::invalid("cycle length must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Pending,
    Inactive,
}

impl FromStr for MemberStatus {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(MemberStatus::Active),
            "pending" => Ok(MemberStatus::Pending),
            "inactive" => Ok(MemberStatus::Inactive),
            other => Err(ScheduleError::invalid(format!(
                "unrecognized member status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub status: MemberStatus,
    pub payout_position: Option<i32>,
    pub reliability_score: f64,
    pub payout_received: bool,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Discount a member offers to forgo from the pot of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub period_index: usize,
    pub member_id: Uuid,
    pub discount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub index: usize,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Pending,
    Completed,
    Missed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Pending => "pending",
            EventStatus::Completed => "completed",
            EventStatus::Missed => "missed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Missed)
    }

    /// `upcoming -> pending -> {completed | missed}`, with early payment
    /// allowed straight from `upcoming` to `completed`.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;
        match (self, next) {
            (current, next) if current == next => true,
            (Upcoming, Pending) | (Upcoming, Completed) => true,
            (Pending, Completed) | (Pending, Missed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionEvent {
    pub period_index: usize,
    pub member_id: Uuid,
    pub amount_due: Decimal,
    pub due_date: NaiveDate,
    pub status: EventStatus,
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutEvent {
    pub period_index: usize,
    pub recipient_member_id: Uuid,
    pub amount: Decimal,
    pub discount: Decimal,
    pub payout_date: NaiveDate,
    pub status: EventStatus,
    pub paid_date: Option<NaiveDate>,
}

/// Identifies the event a payment confirmation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationKey {
    Contribution { period_index: usize, member_id: Uuid },
    Payout { period_index: usize },
}

/// One entry of the external payment confirmation feed. A missing
/// `member_id` refers to the payout event of the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub period_index: usize,
    pub member_id: Option<Uuid>,
    pub confirmed: bool,
    pub confirmed_at: Option<NaiveDate>,
}

impl Confirmation {
    pub fn key(&self) -> ConfirmationKey {
        match self.member_id {
            Some(member_id) => ConfirmationKey::Contribution {
                period_index: self.period_index,
                member_id,
            },
            None => ConfirmationKey::Payout {
                period_index: self.period_index,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub member_id: Uuid,
    /// Winning bid, zero outside the bidding policy.
    pub discount: Decimal,
}

/// Period index to payout recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub method: PayoutMethod,
    pub assignments: BTreeMap<usize, Assignment>,
}

impl Allocation {
    pub fn recipient(&self, period_index: usize) -> Option<Uuid> {
        self.assignments
            .get(&period_index)
            .map(|assignment| assignment.member_id)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_from_their_literals() {
        assert_eq!("biweekly".parse::<Frequency>(), Ok(Frequency::Biweekly));
        assert_eq!("Bidding".parse::<PayoutMethod>(), Ok(PayoutMethod::Bidding));
        assert!(matches!(
            "fortnightly".parse::<Frequency>(),
            Err(ScheduleError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            "lottery".parse::<PayoutMethod>(),
            Err(ScheduleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn enums_serialize_as_lowercase_literals() {
        let json = serde_json::to_string(&EventStatus::Upcoming).unwrap();
        assert_eq!(json, "\"upcoming\"");
        let json = serde_json::to_string(&PayoutMethod::Random).unwrap();
        assert_eq!(json, "\"random\"");
    }

    #[test]
    fn cycle_duration_accepts_presets_and_custom() {
        assert_eq!("9_months".parse::<CycleDuration>().unwrap().months(), 9);
        assert_eq!("custom:8".parse::<CycleDuration>().unwrap().months(), 8);
        assert_eq!("4".parse::<CycleDuration>().unwrap().months(), 4);
        assert!("0".parse::<CycleDuration>().is_err());
        assert!("forever".parse::<CycleDuration>().is_err());
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        use EventStatus::*;
        assert!(Upcoming.can_transition_to(Pending));
        assert!(Upcoming.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Missed));
        assert!(!Upcoming.can_transition_to(Missed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Missed.can_transition_to(Completed));
    }

    #[test]
    fn config_rejects_non_positive_values() {
        let mut config = GroupConfig {
            group_id: Uuid::new_v4(),
            contribution_amount: Decimal::from(50),
            frequency: Frequency::Monthly,
            cycle_length: 6,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            payout_method: PayoutMethod::Rotation,
        };
        assert!(config.validate().is_ok());

        config.cycle_length = 0;
        assert!(config.validate().is_err());

        config.cycle_length = 6;
        config.contribution_amount = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
