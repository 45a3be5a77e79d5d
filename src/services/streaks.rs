//! Daily check-in streaks
//!
//! A check-in less than 24h after the previous one is refused, one between
//! 24h and 48h extends the streak, anything later starts over at 1. Each
//! accepted check-in then accrues the daily check-in code; a failed award
//! is reported next to the new streak and does not undo it.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::entities::streaks;
use crate::error::AppError;
use crate::models::streak::CheckInResponse;
use crate::services::keyed_lock::KeyedLock;
use crate::services::loyalty_accrual::LoyaltyAccrualService;
use crate::store::StreakRepository;

/// Streak after a check-in at `now`, or `None` when it comes too early
pub fn next_streak_count(
    current: Option<&streaks::Model>,
    now: DateTime<FixedOffset>,
) -> Option<i32> {
    let Some(current) = current else {
        return Some(1);
    };

    let elapsed = now.signed_duration_since(current.last_check_in);
    if elapsed < Duration::hours(24) {
        None
    } else if elapsed < Duration::hours(48) {
        Some(current.streak_count.saturating_add(1))
    } else {
        Some(1)
    }
}

pub struct StreakService {
    store: Arc<dyn StreakRepository>,
    accrual: Arc<LoyaltyAccrualService>,
    check_in_code: String,
    check_in_value: Decimal,
    locks: KeyedLock<(i32, i32)>,
}

impl StreakService {
    pub fn new(
        store: Arc<dyn StreakRepository>,
        accrual: Arc<LoyaltyAccrualService>,
        check_in_code: String,
        check_in_value: Decimal,
    ) -> Self {
        Self {
            store,
            accrual,
            check_in_code,
            check_in_value,
            locks: KeyedLock::new(),
        }
    }

    pub async fn check_in(&self, user_id: i32, owner_id: i32) -> Result<CheckInResponse, AppError> {
        self.check_in_at(user_id, owner_id, Utc::now().fixed_offset())
            .await
    }

    pub async fn check_in_at(
        &self,
        user_id: i32,
        owner_id: i32,
        now: DateTime<FixedOffset>,
    ) -> Result<CheckInResponse, AppError> {
        let streak = {
            let _guard = self.locks.lock((user_id, owner_id)).await;

            let current = self.store.get_streak(user_id, owner_id).await?;
            let streak_count = next_streak_count(current.as_ref(), now)
                .ok_or(AppError::AlreadyCheckedInToday)?;

            self.store
                .save_streak(streaks::Model {
                    user_id,
                    owner_id,
                    streak_count,
                    last_check_in: now,
                })
                .await?
        };

        info!(user_id, owner_id, streak = streak.streak_count, "Check-in recorded");

        let award = self
            .accrual
            .accrue(
                user_id,
                owner_id,
                &self.check_in_code,
                Some(self.check_in_value),
            )
            .await;

        let points_error = match award {
            Ok(_) => None,
            Err(e) => {
                warn!(user_id, owner_id, error = %e, "Failed to award check-in points");
                Some(e.to_string())
            }
        };

        Ok(CheckInResponse {
            streak_count: streak.streak_count,
            points_awarded: points_error.is_none(),
            points_error,
        })
    }

    pub async fn get_streak(&self, user_id: i32, owner_id: i32) -> Result<i32, AppError> {
        self.store
            .get_streak(user_id, owner_id)
            .await?
            .map(|s| s.streak_count)
            .ok_or(AppError::StreakNotFound)
    }
}
