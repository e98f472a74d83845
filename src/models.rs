use serde::{Deserialize, Serialize};

/// One scraped listing, built fresh per fetch and discarded after delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ad {
    pub id: String,
    pub url: String,
    pub title: String,
    pub price_kgs: Option<u32>,
    pub rooms: Option<u32>,
    /// true = posted by the owner, false = agency/realtor, None = can't tell
    pub is_owner: Option<bool>,
    pub created_raw: Option<String>,
    /// Human-readable area, never empty after resolution
    pub location: String,
    pub images: Vec<String>,
    pub description: Option<String>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
}
