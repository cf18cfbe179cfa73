use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use botdeck_types::models::{Bot, BotStatus, Message, Transaction, TransactionKind, User};

use crate::Database;
use crate::models::{BotRow, MessageRow, TransactionRow, UserRow, format_ts};

/// Result of [`apply_ledger_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Applied { balance: i64 },
    /// The change would have taken the balance below zero. Nothing was written.
    Insufficient { balance: i64 },
}

impl Database {
    // -- Users --

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_token(conn, token))
    }

    pub fn get_user_by_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_credentials(conn, username, password))
    }

    // -- Transactions --

    pub fn get_transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.with_conn(|conn| query_transactions_for_user(conn, user_id))
    }

    // -- Bots --

    pub fn get_bots_for_user(&self, user_id: Uuid) -> Result<Vec<Bot>> {
        self.with_conn(|conn| query_bots_for_owner(conn, user_id))
    }

    // -- Messages --

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn get_queued_messages(&self) -> Result<Vec<Message>> {
        self.with_conn(query_queued_messages)
    }
}

// -- Users --

const USER_COLUMNS: &str = "id, username, password, token, coins, last_claim";

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        token: row.get(3)?,
        coins: row.get(4)?,
        last_claim: row.get(5)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password, token, coins, last_claim)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id.to_string(),
            user.username,
            user.password,
            user.token,
            user.coins,
            user.last_claim.map(format_ts),
        ],
    )?;
    Ok(())
}

fn query_user_where(conn: &Connection, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
    conn.query_row(&sql, args, user_row)
        .optional()?
        .map(UserRow::into_model)
        .transpose()
}

pub fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    query_user_where(conn, "id = ?1", &[&id.to_string()])
}

pub fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    query_user_where(conn, "username = ?1", &[&username])
}

pub fn query_user_by_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    query_user_where(conn, "token = ?1", &[&token])
}

pub fn query_user_by_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    query_user_where(conn, "username = ?1 AND password = ?2", &[&username, &password])
}

pub fn set_last_claim(conn: &Connection, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET last_claim = ?1 WHERE id = ?2",
        params![format_ts(at), user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(anyhow!("User not found: {}", user_id));
    }
    Ok(())
}

// -- Ledger --

/// Change a user's balance by `amount` and append the matching audit entry.
///
/// This is the only place balances are written. Call it inside
/// [`Database::transaction`] together with whatever else belongs to the same
/// unit (bot creation, claim timestamp), so the balance and the transaction
/// log can never drift apart.
pub fn apply_ledger_entry(
    conn: &Connection,
    user_id: Uuid,
    kind: TransactionKind,
    amount: i64,
    at: DateTime<Utc>,
) -> Result<LedgerOutcome> {
    let uid = user_id.to_string();
    let balance: i64 = conn
        .query_row("SELECT coins FROM users WHERE id = ?1", [&uid], |row| row.get(0))
        .optional()?
        .ok_or_else(|| anyhow!("User not found: {}", user_id))?;

    let new_balance = balance
        .checked_add(amount)
        .ok_or_else(|| anyhow!("Balance overflow for user {}", user_id))?;
    if new_balance < 0 {
        return Ok(LedgerOutcome::Insufficient { balance });
    }

    conn.execute(
        "UPDATE users SET coins = ?1 WHERE id = ?2",
        params![new_balance, uid],
    )?;
    conn.execute(
        "INSERT INTO transactions (id, user_id, kind, amount, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            uid,
            kind.as_str(),
            amount,
            format_ts(at),
        ],
    )?;

    Ok(LedgerOutcome::Applied { balance: new_balance })
}

pub fn query_transactions_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, amount, timestamp FROM transactions
         WHERE user_id = ?1
         ORDER BY timestamp, rowid",
    )?;

    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            Ok(TransactionRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                kind: row.get(2)?,
                amount: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(TransactionRow::into_model).collect()
}

// -- Bots --

const BOT_COLUMNS: &str =
    "id, user_id, name, webhook_url, status, creds_path, deployed_on, last_active, messages_processed";

fn bot_row(row: &Row<'_>) -> rusqlite::Result<BotRow> {
    Ok(BotRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        webhook_url: row.get(3)?,
        status: row.get(4)?,
        creds_path: row.get(5)?,
        deployed_on: row.get(6)?,
        last_active: row.get(7)?,
        messages_processed: row.get(8)?,
    })
}

pub fn insert_bot(conn: &Connection, bot: &Bot) -> Result<()> {
    conn.execute(
        "INSERT INTO bots (id, user_id, name, webhook_url, status, creds_path, deployed_on, last_active, messages_processed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            bot.id.to_string(),
            bot.user_id.to_string(),
            bot.name,
            bot.webhook_url,
            bot.status.as_str(),
            bot.creds_path,
            format_ts(bot.deployed_on),
            format_ts(bot.last_active),
            bot.messages_processed,
        ],
    )?;
    Ok(())
}

/// A bot owned by someone else is reported as absent.
pub fn query_bot_for_owner(conn: &Connection, bot_id: Uuid, user_id: Uuid) -> Result<Option<Bot>> {
    let sql = format!("SELECT {} FROM bots WHERE id = ?1 AND user_id = ?2", BOT_COLUMNS);
    conn.query_row(&sql, [bot_id.to_string(), user_id.to_string()], bot_row)
        .optional()?
        .map(BotRow::into_model)
        .transpose()
}

pub fn query_bots_for_owner(conn: &Connection, user_id: Uuid) -> Result<Vec<Bot>> {
    let sql = format!(
        "SELECT {} FROM bots WHERE user_id = ?1 ORDER BY deployed_on, rowid",
        BOT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id.to_string()], bot_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(BotRow::into_model).collect()
}

pub fn update_bot_status(
    conn: &Connection,
    bot_id: Uuid,
    status: BotStatus,
    at: DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE bots SET status = ?1, last_active = ?2 WHERE id = ?3",
        params![status.as_str(), format_ts(at), bot_id.to_string()],
    )?;
    if changed == 0 {
        return Err(anyhow!("Bot not found: {}", bot_id));
    }
    Ok(())
}

pub fn increment_messages_processed(conn: &Connection, bot_id: Uuid) -> Result<()> {
    let changed = conn.execute(
        "UPDATE bots SET messages_processed = messages_processed + 1 WHERE id = ?1",
        [bot_id.to_string()],
    )?;
    if changed == 0 {
        return Err(anyhow!("Bot not found: {}", bot_id));
    }
    Ok(())
}

// -- Messages --

const MESSAGE_COLUMNS: &str = "id, bot_id, user_id, phone_number, body, status, sent_at, delivered_at";

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        user_id: row.get(2)?,
        phone_number: row.get(3)?,
        body: row.get(4)?,
        status: row.get(5)?,
        sent_at: row.get(6)?,
        delivered_at: row.get(7)?,
    })
}

pub fn insert_message(conn: &Connection, msg: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, bot_id, user_id, phone_number, body, status, sent_at, delivered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id.to_string(),
            msg.bot_id.to_string(),
            msg.user_id.to_string(),
            msg.phone_number,
            msg.body,
            msg.status.as_str(),
            format_ts(msg.sent_at),
            msg.delivered_at.map(format_ts),
        ],
    )?;
    Ok(())
}

pub fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id.to_string()], message_row)
        .optional()?
        .map(MessageRow::into_model)
        .transpose()
}

/// Flip a queued message to delivered. Returns `false` when the message was
/// already delivered, which makes repeated calls harmless.
pub fn mark_message_delivered(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE messages SET status = 'delivered', delivered_at = ?1
         WHERE id = ?2 AND status = 'queued'",
        params![format_ts(at), id.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn query_queued_messages(conn: &Connection) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE status = 'queued' ORDER BY sent_at, rowid",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], message_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(MessageRow::into_model).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use botdeck_types::models::MessageStatus;
    use chrono::Duration;

    fn user(username: &str, coins: i64) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.into(),
            password: "pw".into(),
            token: Uuid::new_v4().to_string(),
            coins,
            last_claim: None,
        }
    }

    fn seed_user(db: &Database, username: &str, coins: i64) -> User {
        let u = user(username, coins);
        db.transaction(|tx| insert_user(tx, &u)).unwrap();
        u
    }

    fn seed_bot(db: &Database, owner: Uuid, status: BotStatus) -> Bot {
        let now = Utc::now();
        let bot = Bot {
            id: Uuid::new_v4(),
            user_id: owner,
            name: "A".into(),
            webhook_url: "https://example.com/hook".into(),
            status,
            creds_path: "uploads/creds.json".into(),
            deployed_on: now,
            last_active: now,
            messages_processed: 0,
        };
        db.transaction(|tx| insert_bot(tx, &bot)).unwrap();
        bot
    }

    #[test]
    fn user_lookups() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);

        let by_token = db.get_user_by_token(&alice.token).unwrap().unwrap();
        assert_eq!(by_token.id, alice.id);
        assert_eq!(by_token.coins, 20);
        assert!(by_token.last_claim.is_none());

        let by_name = db
            .with_conn(|conn| query_user_by_username(conn, "alice"))
            .unwrap();
        assert!(by_name.is_some());
        assert!(db.get_user_by_credentials("alice", "pw").unwrap().is_some());
        assert!(db.get_user_by_credentials("alice", "nope").unwrap().is_none());
        assert!(db.get_user_by_token("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_violates_unique() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "alice", 20);

        let again = user("alice", 20);
        let result: Result<()> = db.transaction(|tx| insert_user(tx, &again));
        assert!(result.is_err());
    }

    #[test]
    fn ledger_entry_updates_balance_and_log() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);

        let outcome = db
            .transaction(|tx| apply_ledger_entry(tx, alice.id, TransactionKind::CoinClaim, 10, Utc::now()))
            .unwrap();
        assert_eq!(outcome, LedgerOutcome::Applied { balance: 30 });

        let txs = db.get_transactions_for_user(alice.id).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::CoinClaim);
        assert_eq!(txs[0].amount, 10);
        assert_eq!(db.get_user_by_id(alice.id).unwrap().unwrap().coins, 30);
    }

    #[test]
    fn ledger_entry_refuses_negative_balance() {
        let db = Database::open_in_memory().unwrap();
        let bob = seed_user(&db, "bob", 5);

        let outcome = db
            .transaction(|tx| apply_ledger_entry(tx, bob.id, TransactionKind::BotDeploy, -10, Utc::now()))
            .unwrap();
        assert_eq!(outcome, LedgerOutcome::Insufficient { balance: 5 });

        assert!(db.get_transactions_for_user(bob.id).unwrap().is_empty());
        assert_eq!(db.get_user_by_id(bob.id).unwrap().unwrap().coins, 5);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);

        let result: Result<()> = db.transaction(|tx| {
            apply_ledger_entry(tx, alice.id, TransactionKind::BotDeploy, -10, Utc::now())?;
            Err(anyhow!("boom"))
        });
        assert!(result.is_err());

        assert_eq!(db.get_user_by_id(alice.id).unwrap().unwrap().coins, 20);
        assert!(db.get_transactions_for_user(alice.id).unwrap().is_empty());
    }

    #[test]
    fn bots_are_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);
        let mallory = seed_user(&db, "mallory", 20);
        let bot = seed_bot(&db, alice.id, BotStatus::Running);

        let found = db
            .with_conn(|conn| query_bot_for_owner(conn, bot.id, alice.id))
            .unwrap();
        assert!(found.is_some());

        let stolen = db
            .with_conn(|conn| query_bot_for_owner(conn, bot.id, mallory.id))
            .unwrap();
        assert!(stolen.is_none());

        assert_eq!(db.get_bots_for_user(alice.id).unwrap().len(), 1);
        assert!(db.get_bots_for_user(mallory.id).unwrap().is_empty());
    }

    #[test]
    fn status_update_touches_last_active() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);
        let bot = seed_bot(&db, alice.id, BotStatus::Running);
        let later = bot.last_active + Duration::minutes(5);

        db.transaction(|tx| update_bot_status(tx, bot.id, BotStatus::Stopped, later))
            .unwrap();

        let stored = db
            .with_conn(|conn| query_bot_for_owner(conn, bot.id, alice.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, BotStatus::Stopped);
        assert_eq!(format_ts(stored.last_active), format_ts(later));
    }

    #[test]
    fn message_delivery_applies_once() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice", 20);
        let bot = seed_bot(&db, alice.id, BotStatus::Running);
        let msg = Message {
            id: Uuid::new_v4(),
            bot_id: bot.id,
            user_id: alice.id,
            phone_number: "+15550100".into(),
            body: "hello".into(),
            status: MessageStatus::Queued,
            sent_at: Utc::now(),
            delivered_at: None,
        };
        db.transaction(|tx| insert_message(tx, &msg)).unwrap();
        assert_eq!(db.get_queued_messages().unwrap().len(), 1);

        let first = db
            .transaction(|tx| mark_message_delivered(tx, msg.id, Utc::now()))
            .unwrap();
        let second = db
            .transaction(|tx| mark_message_delivered(tx, msg.id, Utc::now()))
            .unwrap();
        assert!(first);
        assert!(!second);

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Delivered);
        assert!(stored.delivered_at.is_some());
        assert!(db.get_queued_messages().unwrap().is_empty());
    }
}
