use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Corporation whose structures and notifications are tracked
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Owner {
    pub id: i64,
    pub name: String,
    pub ticker: Option<String>,
    pub is_active: bool,
    /// Only the alliance main owner forwards alliance-wide notifications
    pub is_alliance_main: bool,
    pub has_pings_enabled: bool,
}

/// DTO for seeding an owner
#[derive(Debug, Clone, Deserialize)]
pub struct NewOwner {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_alliance_main: bool,
    #[serde(default = "default_true")]
    pub has_pings_enabled: bool,
}

fn default_true() -> bool {
    true
}
