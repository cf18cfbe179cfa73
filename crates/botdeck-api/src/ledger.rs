//! Account & bot ledger: every operation that reads or moves coins, and the
//! bot/message bookkeeping that hangs off it.
//!
//! Methods are synchronous and block on the store; async callers go through
//! `spawn_blocking`. Anything that writes runs in a single
//! [`Database::transaction`], so readers never see coins deducted without the
//! bot and audit entry that explain it.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use botdeck_db::Database;
use botdeck_db::queries::{self, LedgerOutcome};
use botdeck_types::models::{Bot, BotStatus, Message, MessageStatus, TransactionKind, User};

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::process::ProcessControl;

pub const STARTING_COINS: i64 = 20;
pub const CLAIM_REWARD: i64 = 10;
pub const DEPLOY_COST: i64 = 10;
pub const CLAIM_COOLDOWN_HOURS: i64 = 24;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub coins: i64,
    pub last_claim: DateTime<Utc>,
}

/// Inputs of a bot deployment, as collected from the upload form.
#[derive(Debug, Default)]
pub struct DeployBot {
    pub name: Option<String>,
    pub webhook_url: Option<String>,
    pub credentials: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct SendMessage {
    pub bot_id: Option<String>,
    pub phone_number: Option<String>,
    pub body: Option<String>,
}

pub struct Ledger {
    db: Arc<Database>,
    credentials: CredentialStore,
    process: Arc<dyn ProcessControl>,
}

/// Absent and empty inputs are treated the same.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Whole hours left before the next claim, or `None` once the window is over.
fn cooldown_remaining(last_claim: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let hours_since = (now - last_claim).num_milliseconds() as f64 / MS_PER_HOUR;
    let cooldown = CLAIM_COOLDOWN_HOURS as f64;

    (hours_since < cooldown).then(|| (cooldown - hours_since).ceil() as i64)
}

impl Ledger {
    pub fn new(
        db: Arc<Database>,
        credentials: CredentialStore,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            db,
            credentials,
            process,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // -- Accounts --

    pub fn register(&self, username: Option<&str>, password: Option<&str>) -> Result<User, ApiError> {
        let (Some(username), Some(password)) = (present(username), present(password)) else {
            return Err(ApiError::MissingFields);
        };

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password: password.to_string(),
            token: Uuid::new_v4().to_string(),
            coins: STARTING_COINS,
            last_claim: None,
        };

        self.db.transaction(|tx| {
            if queries::query_user_by_username(tx, username)?.is_some() {
                return Err(ApiError::DuplicateUsername);
            }
            queries::insert_user(tx, &user)?;
            Ok(())
        })?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Passwords are stored verbatim and compared by equality.
    pub fn login(&self, username: Option<&str>, password: Option<&str>) -> Result<User, ApiError> {
        let (Some(username), Some(password)) = (present(username), present(password)) else {
            return Err(ApiError::InvalidLogin);
        };

        self.db
            .get_user_by_credentials(username, password)?
            .ok_or(ApiError::InvalidLogin)
    }

    /// Resolve a bearer token to its owner.
    pub fn authenticate(&self, token: Option<&str>) -> Result<User, ApiError> {
        let token = present(token).ok_or(ApiError::Unauthorized)?;

        self.db
            .get_user_by_token(token)?
            .ok_or(ApiError::InvalidToken)
    }

    // -- Coins --

    pub fn claim_coins(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<ClaimReceipt, ApiError> {
        let receipt = self.db.transaction(|tx| {
            let user = queries::query_user_by_id(tx, user_id)?
                .ok_or_else(|| anyhow!("User not found: {}", user_id))?;

            if let Some(hours_remaining) = user.last_claim.and_then(|last| cooldown_remaining(last, now)) {
                return Err(ApiError::ClaimTooSoon { hours_remaining });
            }

            let coins = match queries::apply_ledger_entry(tx, user_id, TransactionKind::CoinClaim, CLAIM_REWARD, now)? {
                LedgerOutcome::Applied { balance } => balance,
                LedgerOutcome::Insufficient { balance } => {
                    return Err(anyhow!("Credit refused for user {} at balance {}", user_id, balance).into());
                }
            };
            queries::set_last_claim(tx, user_id, now)?;

            Ok(ClaimReceipt {
                coins,
                last_claim: now,
            })
        })?;

        info!("User {} claimed {} coins, balance {}", user_id, CLAIM_REWARD, receipt.coins);
        Ok(receipt)
    }

    // -- Bots --

    pub fn list_bots(&self, user_id: Uuid) -> Result<Vec<Bot>, ApiError> {
        Ok(self.db.get_bots_for_user(user_id)?)
    }

    pub fn deploy_bot(&self, user_id: Uuid, req: DeployBot, now: DateTime<Utc>) -> Result<Bot, ApiError> {
        let (Some(name), Some(webhook_url), Some(credentials)) = (
            present(req.name.as_deref()),
            present(req.webhook_url.as_deref()),
            req.credentials.as_deref(),
        ) else {
            return Err(ApiError::MissingFields);
        };

        let user = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| anyhow!("User not found: {}", user_id))?;
        if user.coins < DEPLOY_COST {
            return Err(ApiError::InsufficientCoins);
        }

        CredentialStore::parse(credentials)?;

        let bot_id = Uuid::new_v4();
        let creds_path = self.credentials.store(bot_id, credentials)?;

        let bot = Bot {
            id: bot_id,
            user_id,
            name: name.to_string(),
            webhook_url: webhook_url.to_string(),
            status: BotStatus::Running,
            creds_path: creds_path.display().to_string(),
            deployed_on: now,
            last_active: now,
            messages_processed: 0,
        };

        // The balance check above is advisory; this one decides.
        let committed = self.db.transaction(|tx| {
            match queries::apply_ledger_entry(tx, user_id, TransactionKind::BotDeploy, -DEPLOY_COST, now)? {
                LedgerOutcome::Applied { .. } => {}
                LedgerOutcome::Insufficient { .. } => return Err(ApiError::InsufficientCoins),
            }
            queries::insert_bot(tx, &bot)?;
            Ok(())
        });

        if let Err(e) = committed {
            self.credentials.discard(&creds_path);
            return Err(e);
        }

        info!("User {} deployed bot {} ({})", user_id, bot.name, bot.id);
        self.process.start(&bot);
        Ok(bot)
    }

    pub fn set_bot_status(
        &self,
        user_id: Uuid,
        bot_id: &str,
        status: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Bot, ApiError> {
        let status = status.and_then(BotStatus::parse).ok_or(ApiError::InvalidStatus)?;
        let bot_id: Uuid = bot_id.parse().map_err(|_| ApiError::NotFound)?;

        let bot = self.db.transaction(|tx| {
            let mut bot = queries::query_bot_for_owner(tx, bot_id, user_id)?.ok_or(ApiError::NotFound)?;
            queries::update_bot_status(tx, bot_id, status, now)?;

            bot.status = status;
            bot.last_active = now;
            Ok::<_, ApiError>(bot)
        })?;

        match status {
            BotStatus::Running => self.process.start(&bot),
            BotStatus::Stopped => self.process.stop(&bot),
        }
        Ok(bot)
    }

    // -- Messages --

    /// Record a queued message. Delivery is scheduled separately by the caller.
    pub fn send_message(&self, user_id: Uuid, req: SendMessage, now: DateTime<Utc>) -> Result<Message, ApiError> {
        let (Some(bot_id), Some(phone_number), Some(body)) = (
            present(req.bot_id.as_deref()),
            present(req.phone_number.as_deref()),
            present(req.body.as_deref()),
        ) else {
            return Err(ApiError::MissingFields);
        };
        let bot_id: Uuid = bot_id.parse().map_err(|_| ApiError::NotFound)?;

        self.db.transaction(|tx| {
            let bot = queries::query_bot_for_owner(tx, bot_id, user_id)?.ok_or(ApiError::NotFound)?;
            if bot.status != BotStatus::Running {
                return Err(ApiError::BotNotRunning);
            }

            let message = Message {
                id: Uuid::new_v4(),
                bot_id,
                user_id,
                phone_number: phone_number.to_string(),
                body: body.to_string(),
                status: MessageStatus::Queued,
                sent_at: now,
                delivered_at: None,
            };
            queries::insert_message(tx, &message)?;
            Ok(message)
        })
    }

    /// Mark a queued message delivered and count it against its bot. Returns
    /// `false` if it had already been delivered, in which case nothing changes.
    pub fn deliver(&self, message_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool> {
        self.db.transaction(|tx| {
            let message = queries::query_message(tx, message_id)?
                .ok_or_else(|| anyhow!("Message not found: {}", message_id))?;

            if !queries::mark_message_delivered(tx, message_id, now)? {
                return Ok(false);
            }
            queries::increment_messages_processed(tx, message.bot_id)?;
            Ok(true)
        })
    }

    pub fn pending_deliveries(&self) -> anyhow::Result<Vec<Message>> {
        self.db.get_queued_messages()
    }
}
