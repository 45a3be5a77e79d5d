use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakResponse {
    pub streak_count: i32,
}

/// Result of a daily check-in
///
/// The streak transition is committed before points are awarded; a failed award
/// is reported here instead of undoing the check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub streak_count: i32,
    pub points_awarded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_error: Option<String>,
}
