//! Loyalty rule types and request/response models
//!
//! Models for claiming codes, reading totals and ledger entries, ranking an
//! owner's users, and administering an owner's rules.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a claimed code is turned into a point delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoyaltyType {
    #[serde(rename = "ONE_FIXED")]
    OneFixed,
    #[serde(rename = "FIXED")]
    RepeatFixed,
    #[serde(rename = "ONE_VARIABLE")]
    OneVariable,
    #[serde(rename = "VARIABLE")]
    RepeatVariable,
    #[serde(rename = "ADMIN_ADD")]
    AdminAdd,
    #[serde(rename = "ADMIN_SUBTRACT")]
    AdminSubtract,
    #[serde(rename = "REFERRAL")]
    Referral,
    #[serde(rename = "REDEEM")]
    Redeem,
}

impl LoyaltyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneFixed => "ONE_FIXED",
            Self::RepeatFixed => "FIXED",
            Self::OneVariable => "ONE_VARIABLE",
            Self::RepeatVariable => "VARIABLE",
            Self::AdminAdd => "ADMIN_ADD",
            Self::AdminSubtract => "ADMIN_SUBTRACT",
            Self::Referral => "REFERRAL",
            Self::Redeem => "REDEEM",
        }
    }

    /// One-shot codes may be claimed at most once per user and owner
    pub fn is_one_time(&self) -> bool {
        matches!(self, Self::OneFixed | Self::OneVariable)
    }
}

impl fmt::Display for LoyaltyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoyaltyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONE_FIXED" => Ok(Self::OneFixed),
            "FIXED" => Ok(Self::RepeatFixed),
            "ONE_VARIABLE" => Ok(Self::OneVariable),
            "VARIABLE" => Ok(Self::RepeatVariable),
            "ADMIN_ADD" => Ok(Self::AdminAdd),
            "ADMIN_SUBTRACT" => Ok(Self::AdminSubtract),
            "REFERRAL" => Ok(Self::Referral),
            "REDEEM" => Ok(Self::Redeem),
            other => Err(other.to_string()),
        }
    }
}

/// Ledger entry outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Success,
    Failed,
}

impl LedgerStatus {
    pub fn for_delta(points: Decimal) -> Self {
        if points.is_zero() {
            Self::Failed
        } else {
            Self::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Ledger row about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: i32,
    pub owner_id: i32,
    pub code: Option<String>,
    pub points: Decimal,
    pub rule_type: LoyaltyType,
    pub status: LedgerStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimCodeRequest {
    pub code: String,
    /// Received value for variable and admin rules (defaults to 0)
    pub value: Option<Decimal>,
}

/// Result of a successful accrual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub points_added: Decimal,
    pub total_points: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalPointsResponse {
    pub total_points: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub code: String,
    pub value: Decimal,
    #[serde(rename = "type")]
    pub rule_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRuleRequest {
    pub code: String,
    pub value: Option<Decimal>,
    #[serde(rename = "type")]
    pub rule_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRuleRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleResponse {
    pub rule: crate::entities::loyalties::Model,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<crate::entities::loyalties::Model>,
}

/// Ranking window, ending now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl LeaderboardPeriod {
    /// Earliest ledger timestamp counted when ranking at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => now - Duration::days(1),
            Self::Weekly => now - Duration::days(7),
            Self::Monthly => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl FromStr for LeaderboardPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardQuery {
    pub owner_id: i32,
    /// `daily`, `weekly` or `monthly`
    pub period: String,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: i32,
    pub total_points: Decimal,
    /// 1-based, counted from the start of the full ranking
    pub rank: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}
