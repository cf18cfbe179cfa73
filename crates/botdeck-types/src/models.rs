use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account. Never serialized as-is: it carries the password and
/// the bearer token, so responses go through `api::UserSummary`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub token: String,
    pub coins: i64,
    pub last_claim: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Running,
    Stopped,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub webhook_url: String,
    pub status: BotStatus,
    /// Where the uploaded credentials document was stored.
    pub creds_path: String,
    pub deployed_on: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub messages_processed: i64,
}

/// Reason for a coin balance change. Stored as its snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    CoinClaim,
    BotDeploy,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoinClaim => "coin_claim",
            Self::BotDeploy => "bot_deploy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coin_claim" => Some(Self::CoinClaim),
            "bot_deploy" => Some(Self::BotDeploy),
            _ => None,
        }
    }
}

/// Append-only audit entry written alongside every balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Delivered,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub user_id: Uuid,
    pub phone_number: String,
    #[serde(rename = "message")]
    pub body: String,
    pub status: MessageStatus,
    #[serde(rename = "timestamp")]
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delivered_at: Option<DateTime<Utc>>,
}
