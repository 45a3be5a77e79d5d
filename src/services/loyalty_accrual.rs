//! Loyalty accrual
//!
//! Turns a claimed code into a signed point delta, appends it to the ledger
//! and refreshes the cached total. Every accrual for a (user, owner) pair runs
//! under that pair's lock, so the one-time check, the subtract floor and the
//! write cannot interleave with another accrual for the same pair.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, info};

use crate::entities::{loyalties, loyalty_transactions};
use crate::error::AppError;
use crate::models::loyalty::{
    AccrualOutcome, LeaderboardEntry, LeaderboardPeriod, LedgerStatus, LoyaltyType, NewLedgerEntry,
};
use crate::services::keyed_lock::KeyedLock;
use crate::services::loyalty_rules::LoyaltyRuleService;
use crate::store::LoyaltyRepository;

/// Scale of stored points
const POINTS_SCALE: u32 = 2;

pub const DEFAULT_LEADERBOARD_LIMIT: u64 = 100;
pub const MAX_LEADERBOARD_LIMIT: u64 = 1000;

pub struct LoyaltyAccrualService {
    rules: Arc<LoyaltyRuleService>,
    store: Arc<dyn LoyaltyRepository>,
    locks: KeyedLock<(i32, i32)>,
}

impl LoyaltyAccrualService {
    pub fn new(rules: Arc<LoyaltyRuleService>, store: Arc<dyn LoyaltyRepository>) -> Self {
        Self {
            rules,
            store,
            locks: KeyedLock::new(),
        }
    }

    /// Claim `code` for the user. `received` feeds variable and admin rules
    /// and defaults to zero.
    pub async fn accrue(
        &self,
        user_id: i32,
        owner_id: i32,
        code: &str,
        received: Option<Decimal>,
    ) -> Result<AccrualOutcome, AppError> {
        let received = received.unwrap_or(Decimal::ZERO);
        let _guard = self.locks.lock((user_id, owner_id)).await;

        let rule = self.rules.resolve(owner_id, code).await?;
        let rule_type = rule.rule_type.parse::<LoyaltyType>();

        if let Ok(rule_type) = rule_type {
            if rule_type.is_one_time()
                && self
                    .store
                    .find_transaction(user_id, owner_id, code)
                    .await?
                    .is_some()
            {
                debug!(user_id, owner_id, code, "One-time code already claimed");
                return Err(AppError::AlreadyClaimed {
                    code: code.to_string(),
                });
            }
        }

        let rule_type = rule_type.map_err(AppError::InvalidRuleType)?;
        let points = self
            .compute_delta(&rule, rule_type, received, user_id, owner_id)
            .await?
            .round_dp_with_strategy(POINTS_SCALE, RoundingStrategy::MidpointAwayFromZero);

        let status = LedgerStatus::for_delta(points);
        let (entry, total_points) = self
            .store
            .append_entry(NewLedgerEntry {
                user_id,
                owner_id,
                code: Some(code.to_string()),
                points,
                rule_type,
                status,
            })
            .await?;

        info!(
            user_id,
            owner_id,
            code,
            entry_id = entry.id,
            points = %points,
            total = %total_points,
            status = status.as_str(),
            "Loyalty points accrued"
        );

        Ok(AccrualOutcome {
            points_added: points,
            total_points,
        })
    }

    async fn compute_delta(
        &self,
        rule: &loyalties::Model,
        rule_type: LoyaltyType,
        received: Decimal,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Decimal, AppError> {
        // Fixed rules never read the received value
        if !matches!(rule_type, LoyaltyType::OneFixed | LoyaltyType::RepeatFixed)
            && received < Decimal::ZERO
        {
            return Err(AppError::Validation(
                "value must not be negative".to_string(),
            ));
        }

        match rule_type {
            LoyaltyType::OneFixed | LoyaltyType::RepeatFixed => Ok(rule.value),
            LoyaltyType::OneVariable | LoyaltyType::RepeatVariable => {
                received.checked_div(rule.value).ok_or_else(|| {
                    AppError::Validation(format!(
                        "loyalty code '{}' has no usable divisor",
                        rule.code
                    ))
                })
            }
            LoyaltyType::AdminAdd => Ok(received),
            LoyaltyType::AdminSubtract => {
                let current = self
                    .store
                    .sum_points(user_id, owner_id)
                    .await?
                    .max(Decimal::ZERO);
                Ok(-received.min(current))
            }
            LoyaltyType::Referral | LoyaltyType::Redeem => {
                Err(AppError::InvalidRuleType(rule_type.as_str().to_string()))
            }
        }
    }

    /// Cached total, zero when the pair has never accrued
    pub async fn total_points(&self, user_id: i32, owner_id: i32) -> Result<Decimal, AppError> {
        Ok(self
            .store
            .get_total(user_id, owner_id)
            .await?
            .unwrap_or(Decimal::ZERO))
    }

    pub async fn transactions(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Vec<loyalty_transactions::Model>, AppError> {
        self.store.list_transactions(user_id, owner_id).await
    }

    pub async fn leaderboard(
        &self,
        owner_id: i32,
        period: LeaderboardPeriod,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        self.leaderboard_at(owner_id, period, limit, offset, Utc::now())
            .await
    }

    /// Rank users by successful points earned in `period` before `now`. A
    /// missing or zero limit means the default; larger limits are capped.
    pub async fn leaderboard_at(
        &self,
        owner_id: i32,
        period: LeaderboardPeriod,
        limit: Option<u64>,
        offset: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let limit = match limit {
            None | Some(0) => DEFAULT_LEADERBOARD_LIMIT,
            Some(limit) => limit.min(MAX_LEADERBOARD_LIMIT),
        };
        let offset = offset.unwrap_or(0);
        let since = period.window_start(now).fixed_offset();

        let rows = self
            .store
            .leaderboard(owner_id, since, limit, offset)
            .await?;

        Ok(rows
            .into_iter()
            .zip(offset + 1..)
            .map(|((user_id, total_points), rank)| LeaderboardEntry {
                user_id,
                total_points,
                rank,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::loyalty::CreateRuleRequest;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        rules: Arc<LoyaltyRuleService>,
        accrual: Arc<LoyaltyAccrualService>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let rules = Arc::new(LoyaltyRuleService::new(store.clone()));
        let accrual = Arc::new(LoyaltyAccrualService::new(rules.clone(), store.clone()));
        Fixture {
            rules,
            accrual,
            store,
        }
    }

    impl Fixture {
        async fn rule(&self, owner_id: i32, code: &str, value: Decimal, rule_type: &str) {
            self.rules
                .create(
                    owner_id,
                    CreateRuleRequest {
                        code: code.to_string(),
                        value,
                        rule_type: rule_type.to_string(),
                    },
                )
                .await
                .unwrap();
        }

        async fn assert_total_matches_ledger(&self, user_id: i32, owner_id: i32) {
            let total = self.accrual.total_points(user_id, owner_id).await.unwrap();
            let sum = self.store.sum_points(user_id, owner_id).await.unwrap();
            assert_eq!(total, sum);
        }
    }

    #[tokio::test]
    async fn test_repeatable_fixed_code() {
        let f = fixture();
        f.rule(1, "WELCOME10", dec!(10), "FIXED").await;

        let first = f.accrual.accrue(5, 1, "WELCOME10", None).await.unwrap();
        assert_eq!(first.points_added, dec!(10));
        assert_eq!(first.total_points, dec!(10));

        let second = f.accrual.accrue(5, 1, "WELCOME10", None).await.unwrap();
        assert_eq!(second.points_added, dec!(10));
        assert_eq!(second.total_points, dec!(20));
        f.assert_total_matches_ledger(5, 1).await;
    }

    #[tokio::test]
    async fn test_one_time_code_claimed_once() {
        let f = fixture();
        f.rule(1, "ONCE", dec!(25), "ONE_FIXED").await;

        f.accrual.accrue(5, 1, "ONCE", None).await.unwrap();
        let err = f.accrual.accrue(5, 1, "ONCE", None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(f.accrual.total_points(5, 1).await.unwrap(), dec!(25));
        assert_eq!(f.accrual.transactions(5, 1).await.unwrap().len(), 1);

        // Another user can still claim it
        f.accrual.accrue(6, 1, "ONCE", None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_one_time_claims_yield_single_success() {
        let f = fixture();
        f.rule(1, "ONCE", dec!(25), "ONE_VARIABLE").await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let accrual = f.accrual.clone();
            handles.push(tokio::spawn(async move {
                accrual.accrue(5, 1, "ONCE", Some(dec!(100))).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::AlreadyClaimed { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(f.accrual.total_points(5, 1).await.unwrap(), dec!(4));
    }

    #[tokio::test]
    async fn test_variable_code_divides_received_value() {
        let f = fixture();
        f.rule(1, "SPEND", dec!(3), "VARIABLE").await;

        let outcome = f
            .accrual
            .accrue(5, 1, "SPEND", Some(dec!(10)))
            .await
            .unwrap();
        assert_eq!(outcome.points_added, dec!(3.33));
        f.assert_total_matches_ledger(5, 1).await;
    }

    #[tokio::test]
    async fn test_zero_divisor_is_validation_error() {
        let f = fixture();
        f.rule(1, "BROKEN", dec!(0), "VARIABLE").await;

        let err = f
            .accrual
            .accrue(5, 1, "BROKEN", Some(dec!(10)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.accrual.transactions(5, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_subtract_never_goes_below_zero() {
        let f = fixture();
        f.rule(1, "GRANT", dec!(0), "ADMIN_ADD").await;
        f.rule(1, "TAKE", dec!(0), "ADMIN_SUBTRACT").await;

        f.accrual.accrue(5, 1, "GRANT", Some(dec!(30))).await.unwrap();
        let outcome = f
            .accrual
            .accrue(5, 1, "TAKE", Some(dec!(50)))
            .await
            .unwrap();

        assert_eq!(outcome.points_added, dec!(-30));
        assert_eq!(outcome.total_points, Decimal::ZERO);

        let again = f.accrual.accrue(5, 1, "TAKE", Some(dec!(5))).await.unwrap();
        assert_eq!(again.points_added, Decimal::ZERO);
        assert_eq!(again.total_points, Decimal::ZERO);
        f.assert_total_matches_ledger(5, 1).await;
    }

    #[tokio::test]
    async fn test_zero_delta_recorded_as_failed() {
        let f = fixture();
        f.rule(1, "GRANT", dec!(0), "ADMIN_ADD").await;

        let outcome = f.accrual.accrue(5, 1, "GRANT", None).await.unwrap();
        assert_eq!(outcome.points_added, Decimal::ZERO);

        let entries = f.accrual.transactions(5, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "failed");
    }

    #[tokio::test]
    async fn test_unsupported_types_rejected() {
        let f = fixture();
        f.rule(1, "FRIEND", dec!(5), "REFERRAL").await;

        let err = f.accrual.accrue(5, 1, "FRIEND", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRuleType(_)));
        assert!(f.accrual.transactions(5, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_code_and_negative_value() {
        let f = fixture();
        let err = f.accrual.accrue(5, 1, "NOPE", None).await.unwrap_err();
        assert!(matches!(err, AppError::RuleNotFound { .. }));

        f.rule(1, "GRANT", dec!(0), "ADMIN_ADD").await;
        let err = f
            .accrual
            .accrue(5, 1, "GRANT", Some(dec!(-1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.accrual.transactions(5, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixed_code_ignores_negative_value() {
        let f = fixture();
        f.rule(1, "WELCOME10", dec!(10), "FIXED").await;
        f.rule(1, "ONCE", dec!(25), "ONE_FIXED").await;

        let fixed = f
            .accrual
            .accrue(5, 1, "WELCOME10", Some(dec!(-3)))
            .await
            .unwrap();
        assert_eq!(fixed.points_added, dec!(10));

        let once = f
            .accrual
            .accrue(5, 1, "ONCE", Some(dec!(-3)))
            .await
            .unwrap();
        assert_eq!(once.total_points, dec!(35));
    }

    #[tokio::test]
    async fn test_half_cent_rounds_away_from_zero() {
        let f = fixture();
        f.rule(1, "SPEND", dec!(200), "VARIABLE").await;
        f.rule(1, "TAKE", dec!(0), "ADMIN_SUBTRACT").await;

        let outcome = f
            .accrual
            .accrue(5, 1, "SPEND", Some(dec!(1)))
            .await
            .unwrap();
        assert_eq!(outcome.points_added, dec!(0.01));

        let outcome = f
            .accrual
            .accrue(5, 1, "SPEND", Some(dec!(5)))
            .await
            .unwrap();
        assert_eq!(outcome.points_added, dec!(0.03));

        let outcome = f
            .accrual
            .accrue(5, 1, "TAKE", Some(dec!(0.015)))
            .await
            .unwrap();
        assert_eq!(outcome.points_added, dec!(-0.02));
        f.assert_total_matches_ledger(5, 1).await;
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_successful_points() {
        let f = fixture();
        f.rule(1, "SPEND", dec!(1), "VARIABLE").await;
        f.rule(1, "TAKE", dec!(0), "ADMIN_SUBTRACT").await;
        f.rule(2, "SPEND", dec!(1), "VARIABLE").await;

        f.accrual.accrue(5, 1, "SPEND", Some(dec!(40))).await.unwrap();
        f.accrual.accrue(6, 1, "SPEND", Some(dec!(70))).await.unwrap();
        f.accrual.accrue(7, 1, "SPEND", Some(dec!(40))).await.unwrap();
        f.accrual.accrue(6, 1, "TAKE", Some(dec!(20))).await.unwrap();
        // Zero deltas are failed entries and never rank a user
        f.accrual.accrue(8, 1, "SPEND", Some(dec!(0))).await.unwrap();
        f.accrual.accrue(9, 2, "SPEND", Some(dec!(500))).await.unwrap();

        let board = f
            .accrual
            .leaderboard(1, LeaderboardPeriod::Daily, None, None)
            .await
            .unwrap();
        let ranked: Vec<(i32, Decimal, u64)> = board
            .iter()
            .map(|e| (e.user_id, e.total_points, e.rank))
            .collect();
        assert_eq!(
            ranked,
            vec![(6, dec!(50), 1), (5, dec!(40), 2), (7, dec!(40), 3)]
        );

        let page = f
            .accrual
            .leaderboard(1, LeaderboardPeriod::Daily, Some(1), Some(1))
            .await
            .unwrap();
        assert_eq!(
            page,
            vec![LeaderboardEntry {
                user_id: 5,
                total_points: dec!(40),
                rank: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_leaderboard_window_cutoff() {
        let f = fixture();
        f.rule(1, "SPEND", dec!(1), "VARIABLE").await;
        f.accrual.accrue(5, 1, "SPEND", Some(dec!(10))).await.unwrap();
        f.accrual.accrue(6, 1, "SPEND", Some(dec!(20))).await.unwrap();
        f.accrual.accrue(7, 1, "SPEND", Some(dec!(30))).await.unwrap();

        let now = Utc::now();
        f.store
            .backdate_ledger(6, 1, (now - chrono::Duration::days(3)).fixed_offset());
        f.store
            .backdate_ledger(7, 1, (now - chrono::Duration::days(20)).fixed_offset());

        let users = |board: Vec<LeaderboardEntry>| -> Vec<i32> {
            board.into_iter().map(|e| e.user_id).collect()
        };
        let daily = f
            .accrual
            .leaderboard_at(1, LeaderboardPeriod::Daily, None, None, now)
            .await
            .unwrap();
        assert_eq!(users(daily), vec![5]);

        let weekly = f
            .accrual
            .leaderboard_at(1, LeaderboardPeriod::Weekly, None, None, now)
            .await
            .unwrap();
        assert_eq!(users(weekly), vec![6, 5]);

        let monthly = f
            .accrual
            .leaderboard_at(1, LeaderboardPeriod::Monthly, None, None, now)
            .await
            .unwrap();
        assert_eq!(users(monthly), vec![7, 6, 5]);
    }

    #[tokio::test]
    async fn test_totals_are_scoped_per_owner() {
        let f = fixture();
        f.rule(1, "WELCOME10", dec!(10), "FIXED").await;
        f.rule(2, "WELCOME10", dec!(7), "FIXED").await;

        f.accrual.accrue(5, 1, "WELCOME10", None).await.unwrap();
        f.accrual.accrue(5, 2, "WELCOME10", None).await.unwrap();

        assert_eq!(f.accrual.total_points(5, 1).await.unwrap(), dec!(10));
        assert_eq!(f.accrual.total_points(5, 2).await.unwrap(), dec!(7));
        assert_eq!(f.accrual.total_points(9, 1).await.unwrap(), Decimal::ZERO);
    }
}
