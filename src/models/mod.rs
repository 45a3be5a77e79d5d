pub mod chain;
pub mod common;
pub mod listener;
pub mod loyalty;
pub mod streak;
