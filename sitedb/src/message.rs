use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::connection::{authoritative_now, Database};
use crate::error::SiteDbError;
use crate::rate_limit::{elapsed_seconds, RateLimitPolicy, SendStatus};
use crate::value::SqlValue;

const MESSAGE_COLUMNS: &[&str] = &[
    "firstName",
    "lastName",
    "email",
    "messageSubject",
    "messageText",
    "submitTime",
    "ipAddress",
];

/// A row of the `message` table.
///
/// `submit_time` is assigned by the database on insert; any value set by
/// the caller is ignored there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub message_subject: String,
    pub message_text: String,
    #[serde(default)]
    pub submit_time: Option<NaiveDateTime>,
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
struct SubmitTimeRow {
    #[serde(rename = "submitTime")]
    submit_time: Option<NaiveDateTime>,
}

/// Contact-form queries over any [`Database`] backend.
pub struct MessageDatabase<D: Database> {
    db: D,
    policy: RateLimitPolicy,
}

impl<D: Database> MessageDatabase<D> {
    pub fn new(db: D) -> Self {
        MessageDatabase {
            db,
            policy: RateLimitPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    /// Access to the wrapped connection for `connect`, transactions or raw SQL.
    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    /// Inserts `message` with a server-assigned `submitTime`.
    /// Returns `true` when a row was written.
    pub fn insert_message(&mut self, message: &ContactMessage) -> Result<bool, SiteDbError> {
        insert(&mut self.db, message)
    }

    /// Deletes the message matching all three keys exactly.
    /// Returns `true` only when exactly one row was removed.
    pub fn delete_message(
        &mut self,
        email: &str,
        ip_address: &str,
        submit_time: NaiveDateTime,
    ) -> Result<bool, SiteDbError> {
        let db_type = self.db.database_type();
        let sql = format!(
            "DELETE FROM message WHERE email = {} AND ipAddress = {} AND submitTime = {}",
            db_type.placeholder(1),
            db_type.placeholder(2),
            db_type.placeholder(3),
        );
        let removed = self.db.execute(
            &sql,
            &[
                SqlValue::from(email),
                SqlValue::from(ip_address),
                SqlValue::from(submit_time),
            ],
        )?;
        Ok(removed == 1)
    }

    /// Every message, newest first.
    pub fn get_all_messages(&mut self) -> Result<Vec<ContactMessage>, SiteDbError> {
        let sql = format!(
            "SELECT {} FROM message ORDER BY submitTime DESC",
            self.db.database_type().select_list(MESSAGE_COLUMNS)
        );
        self.db.query(&sql, &[])
    }

    /// Seconds since `email` last submitted, or `None` if it never has.
    pub fn time_since_email_last_sent(&mut self, email: &str) -> Result<Option<u64>, SiteDbError> {
        let now = authoritative_now(&mut self.db)?;
        let last = last_submit_time(&mut self.db, LookupKey::Email, email)?;
        Ok(last.map(|last| elapsed_seconds(now, last)))
    }

    /// Seconds since `ip_address` last submitted, or `None` if it never has.
    pub fn time_since_ip_last_sent(&mut self, ip_address: &str) -> Result<Option<u64>, SiteDbError> {
        let now = authoritative_now(&mut self.db)?;
        let last = last_submit_time(&mut self.db, LookupKey::IpAddress, ip_address)?;
        Ok(last.map(|last| elapsed_seconds(now, last)))
    }

    /// Applies the rate-limit policy to a prospective submission.
    ///
    /// This is a read-only check; a later `insert_message` is not atomic
    /// with it. Use [`MessageDatabase::submit_message`] to run both inside
    /// one transaction.
    pub fn can_send_message(&mut self, email: &str, ip_address: &str) -> Result<SendStatus, SiteDbError> {
        check(&mut self.db, self.policy, email, ip_address)
    }

    /// Checks the rate limit and inserts `message` inside one transaction.
    ///
    /// Returns the decision; the message is stored only when it allows
    /// sending. Any failure rolls the transaction back.
    pub fn submit_message(&mut self, message: &ContactMessage) -> Result<SendStatus, SiteDbError> {
        let policy = self.policy;
        self.db.transaction(|db| {
            let status = check(db, policy, &message.email, &message.ip_address)?;
            if status.can_send && !insert(db, message)? {
                return Err(SiteDbError::QueryError(
                    "message insert affected no rows".to_string(),
                ));
            }
            Ok(status)
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum LookupKey {
    Email,
    IpAddress,
}

impl LookupKey {
    fn column(self) -> &'static str {
        match self {
            LookupKey::Email => "email",
            LookupKey::IpAddress => "ipAddress",
        }
    }
}

fn last_submit_time<D: Database>(
    db: &mut D,
    key: LookupKey,
    value: &str,
) -> Result<Option<NaiveDateTime>, SiteDbError> {
    let db_type = db.database_type();
    let sql = format!(
        "SELECT {} FROM message WHERE {} = {} ORDER BY submitTime DESC LIMIT 1",
        db_type.select_as("submitTime"),
        key.column(),
        db_type.placeholder(1),
    );
    let row: Option<SubmitTimeRow> = db.query_one(&sql, &[SqlValue::from(value)])?;
    let last = row.and_then(|row| row.submit_time);
    if last.is_none() {
        debug!("No messages found for {}: {}", key.column(), value);
    }
    Ok(last)
}

fn check<D: Database>(
    db: &mut D,
    policy: RateLimitPolicy,
    email: &str,
    ip_address: &str,
) -> Result<SendStatus, SiteDbError> {
    let now = authoritative_now(db)?;
    let last_email = last_submit_time(db, LookupKey::Email, email)?;
    let last_ip = last_submit_time(db, LookupKey::IpAddress, ip_address)?;
    let status = policy.evaluate(now, last_email, last_ip);
    debug!(
        "Rate limit for {} / {}: last email {:?}, last ip {:?} -> {:?}",
        email, ip_address, last_email, last_ip, status
    );
    Ok(status)
}

fn insert<D: Database>(db: &mut D, message: &ContactMessage) -> Result<bool, SiteDbError> {
    let db_type = db.database_type();
    let sql = format!(
        "INSERT INTO message (firstName, lastName, email, messageSubject, messageText, submitTime, ipAddress) \
         VALUES ({}, {}, {}, {}, {}, NOW(), {})",
        db_type.placeholder(1),
        db_type.placeholder(2),
        db_type.placeholder(3),
        db_type.placeholder(4),
        db_type.placeholder(5),
        db_type.placeholder(6),
    );
    let params: [SqlValue; 6] = [
        (&message.first_name).into(),
        (&message.last_name).into(),
        (&message.email).into(),
        (&message.message_subject).into(),
        (&message.message_text).into(),
        (&message.ip_address).into(),
    ];
    let inserted = db.execute(&sql, &params)? > 0;
    if inserted {
        info!("Stored message from {} ({})", message.email, message.ip_address);
    }
    Ok(inserted)
}
