pub mod listeners;
pub mod loyalty;
pub mod loyalty_rules;
pub mod streaks;
