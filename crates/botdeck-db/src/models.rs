//! Database row types. Timestamps are stored as RFC 3339 text and ids as
//! hyphenated UUID text; `into_model` converts a row into its domain type.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use botdeck_types::models::{Bot, BotStatus, Message, MessageStatus, Transaction, TransactionKind, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub coins: i64,
    pub last_claim: Option<String>,
}

pub struct BotRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub webhook_url: String,
    pub status: String,
    pub creds_path: String,
    pub deployed_on: String,
    pub last_active: String,
    pub messages_processed: i64,
}

pub struct TransactionRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub amount: i64,
    pub timestamp: String,
}

pub struct MessageRow {
    pub id: String,
    pub bot_id: String,
    pub user_id: String,
    pub phone_number: String,
    pub body: String,
    pub status: String,
    pub sent_at: String,
    pub delivered_at: Option<String>,
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Corrupt timestamp '{}'", value))?
        .with_timezone(&Utc))
}

fn parse_id(value: &str) -> Result<Uuid> {
    value
        .parse()
        .with_context(|| format!("Corrupt id '{}'", value))
}

impl UserRow {
    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            password: self.password,
            token: self.token,
            coins: self.coins,
            last_claim: self.last_claim.as_deref().map(parse_ts).transpose()?,
        })
    }
}

impl BotRow {
    pub fn into_model(self) -> Result<Bot> {
        let status = BotStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Corrupt status '{}' on bot '{}'", self.status, self.id))?;

        Ok(Bot {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            name: self.name,
            webhook_url: self.webhook_url,
            status,
            creds_path: self.creds_path,
            deployed_on: parse_ts(&self.deployed_on)?,
            last_active: parse_ts(&self.last_active)?,
            messages_processed: self.messages_processed,
        })
    }
}

impl TransactionRow {
    pub fn into_model(self) -> Result<Transaction> {
        let kind = TransactionKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("Unknown transaction kind '{}' on '{}'", self.kind, self.id))?;

        Ok(Transaction {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            kind,
            amount: self.amount,
            timestamp: parse_ts(&self.timestamp)?,
        })
    }
}

impl MessageRow {
    pub fn into_model(self) -> Result<Message> {
        let status = MessageStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Corrupt status '{}' on message '{}'", self.status, self.id))?;

        Ok(Message {
            id: parse_id(&self.id)?,
            bot_id: parse_id(&self.bot_id)?,
            user_id: parse_id(&self.user_id)?,
            phone_number: self.phone_number,
            body: self.body,
            status,
            sent_at: parse_ts(&self.sent_at)?,
            delivered_at: self.delivered_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
