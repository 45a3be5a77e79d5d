use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerListResponse {
    pub collections: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerStatusResponse {
    pub collection_id: i32,
    pub active: bool,
}
