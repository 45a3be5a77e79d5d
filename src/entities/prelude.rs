pub use super::collections::Entity as Collections;
pub use super::items::Entity as Items;
pub use super::loyalties::Entity as Loyalties;
pub use super::loyalty_transactions::Entity as LoyaltyTransactions;
pub use super::nfts::Entity as Nfts;
pub use super::streaks::Entity as Streaks;
pub use super::user_loyalty_totals::Entity as UserLoyaltyTotals;
pub use super::users::Entity as Users;
