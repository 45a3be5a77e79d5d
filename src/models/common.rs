use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `user_id` / `owner_id` pair resolved by the authentication layer
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UserOwnerQuery {
    pub user_id: i32,
    pub owner_id: i32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: i32,
}
