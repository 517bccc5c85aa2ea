//! Live-database checks. They need running servers and are ignored by
//! default: `cargo test -p sitedb_example -- --ignored`.
//!
//! Settings come from `TEST_PG_*` and `TEST_MYSQL_*` variables and fall
//! back to local defaults.

use chrono::Duration;
use sitedb::{
    ContactMessage, Database, DatabaseType, DbConfig, MessageDatabase, MySqlDatabase,
    PostgresDatabase, SendStatus, SiteDbError, SqlValue, TIME_NOT_FOUND,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn pg_config() -> DbConfig {
        DbConfig::from_env(DatabaseType::PostgreSQL, "TEST_PG").unwrap_or_else(|_| {
            DbConfig::new(DatabaseType::PostgreSQL, "localhost", "postgres")
                .with_password("mypass")
                .with_database("postgres")
        })
    }

    fn mysql_config() -> DbConfig {
        DbConfig::from_env(DatabaseType::MySQL, "TEST_MYSQL").unwrap_or_else(|_| {
            DbConfig::new(DatabaseType::MySQL, "localhost", "root")
                .with_password("mypass")
                .with_database("sitedb")
        })
    }

    // Helper function to create the message table and clear rows left by
    // earlier runs for the given email and IP.
    fn setup<D: Database>(db: &mut D, email: &str, ip: &str) -> Result<(), Box<dyn Error>> {
        db.connect()?;
        let create_sql = match db.database_type() {
            DatabaseType::PostgreSQL => {
                "CREATE TABLE IF NOT EXISTS message (
                    id SERIAL PRIMARY KEY,
                    firstName VARCHAR(100) NOT NULL,
                    lastName VARCHAR(100) NOT NULL,
                    email VARCHAR(255) NOT NULL,
                    messageSubject VARCHAR(255) NOT NULL,
                    messageText TEXT NOT NULL,
                    submitTime TIMESTAMP NOT NULL,
                    ipAddress VARCHAR(64) NOT NULL
                )"
            }
            DatabaseType::MySQL => {
                "CREATE TABLE IF NOT EXISTS message (
                    id INT AUTO_INCREMENT PRIMARY KEY,
                    firstName VARCHAR(100) NOT NULL,
                    lastName VARCHAR(100) NOT NULL,
                    email VARCHAR(255) NOT NULL,
                    messageSubject VARCHAR(255) NOT NULL,
                    messageText TEXT NOT NULL,
                    submitTime DATETIME NOT NULL,
                    ipAddress VARCHAR(64) NOT NULL
                )"
            }
        };
        db.execute(create_sql, &[])?;

        let cleanup = format!(
            "DELETE FROM message WHERE email = {} OR ipAddress = {}",
            db.database_type().placeholder(1),
            db.database_type().placeholder(2)
        );
        db.execute(&cleanup, &[SqlValue::from(email), SqlValue::from(ip)])?;
        Ok(())
    }

    fn create_test_message(email: &str, ip: &str) -> ContactMessage {
        ContactMessage {
            first_name: "Test".to_string(),
            last_name: "Sender".to_string(),
            email: email.to_string(),
            message_subject: "Hello".to_string(),
            message_text: "Integration test message".to_string(),
            submit_time: None,
            ip_address: ip.to_string(),
        }
    }

    // Inserts a message stamped `seconds_ago` before the server clock.
    fn insert_backdated<D: Database>(
        db: &mut D,
        message: &ContactMessage,
        seconds_ago: i64,
    ) -> Result<(), Box<dyn Error>> {
        let now = db.server_now()?.ok_or("server returned no time")?;
        let sql = format!(
            "INSERT INTO message (firstName, lastName, email, messageSubject, messageText, submitTime, ipAddress) \
             VALUES ({})",
            db.database_type().placeholders(7)
        );
        db.execute(
            &sql,
            &[
                SqlValue::from(&message.first_name),
                SqlValue::from(&message.last_name),
                SqlValue::from(&message.email),
                SqlValue::from(&message.message_subject),
                SqlValue::from(&message.message_text),
                SqlValue::from(now - Duration::seconds(seconds_ago)),
                SqlValue::from(&message.ip_address),
            ],
        )?;
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_first_time_sender_may_send() -> Result<(), Box<dyn Error>> {
        let mut db = MySqlDatabase::new(mysql_config());
        setup(&mut db, "fresh@sitedb.test", "10.0.0.1")?;
        let mut messages = MessageDatabase::new(db);

        assert_eq!(messages.time_since_email_last_sent("fresh@sitedb.test")?, None);
        assert_eq!(messages.can_send_message("fresh@sitedb.test", "10.0.0.1")?, SendStatus::allowed());
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_insert_then_wait_full_window() -> Result<(), Box<dyn Error>> {
        let mut db = MySqlDatabase::new(mysql_config());
        setup(&mut db, "window@sitedb.test", "10.0.0.2")?;
        let mut messages = MessageDatabase::new(db);

        assert!(messages.insert_message(&create_test_message("window@sitedb.test", "10.0.0.2"))?);
        let status = messages.can_send_message("window@sitedb.test", "10.0.0.2")?;
        assert!(!status.can_send);
        let wait = status.wait_time.ok_or("expected a wait time")?;
        assert!((1795..=1800).contains(&wait), "wait was {}", wait);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_email_and_ip_windows_after_100_seconds() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::new(pg_config());
        setup(&mut db, "scenario@sitedb.test", "10.0.0.3")?;
        insert_backdated(&mut db, &create_test_message("scenario@sitedb.test", "10.0.0.3"), 100)?;
        let mut messages = MessageDatabase::new(db);

        let same_email = messages.can_send_message("scenario@sitedb.test", "10.9.9.9")?;
        let wait = same_email.wait_time.ok_or("expected an email wait")?;
        assert!((1695..=1700).contains(&wait), "email wait was {}", wait);

        let same_ip = messages.can_send_message("other@sitedb.test", "10.0.0.3")?;
        let wait = same_ip.wait_time.ok_or("expected an ip wait")?;
        assert!((195..=200).contains(&wait), "ip wait was {}", wait);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_ip_window_expires() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::new(pg_config());
        setup(&mut db, "expired@sitedb.test", "10.0.0.4")?;
        insert_backdated(&mut db, &create_test_message("expired@sitedb.test", "10.0.0.4"), 600)?;
        let mut messages = MessageDatabase::new(db);

        assert!(messages.can_send_message("someone@sitedb.test", "10.0.0.4")?.can_send);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_submit_then_list_and_delete() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::new(pg_config());
        setup(&mut db, "submit@sitedb.test", "10.0.0.5")?;
        let mut messages = MessageDatabase::new(db);
        let message = create_test_message("submit@sitedb.test", "10.0.0.5");

        assert!(messages.submit_message(&message)?.can_send);
        assert!(!messages.submit_message(&message)?.can_send);

        let stored: Vec<ContactMessage> = messages
            .get_all_messages()?
            .into_iter()
            .filter(|m| m.email == "submit@sitedb.test")
            .collect();
        assert_eq!(stored.len(), 1, "the second submission must not be stored");
        let submit_time = stored[0].submit_time.ok_or("stored message has no submit time")?;
        assert!(messages.delete_message(&stored[0].email, &stored[0].ip_address, submit_time)?);
        assert_eq!(messages.time_since_email_last_sent("submit@sitedb.test")?, None);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_disconnect_refused_during_transaction() -> Result<(), Box<dyn Error>> {
        let mut db = MySqlDatabase::new(mysql_config());
        db.connect()?;
        db.begin()?;

        match db.disconnect() {
            Err(SiteDbError::TransactionInProgress) => (),
            other => panic!("expected TransactionInProgress, got {:?}", other),
        }
        assert!(db.in_transaction());

        db.rollback()?;
        db.disconnect()?;
        assert!(!db.is_connected());
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_rolled_back_insert_is_not_visible() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::new(pg_config());
        setup(&mut db, "rollback@sitedb.test", "10.0.0.6")?;
        let mut messages = MessageDatabase::new(db);

        messages.db_mut().begin()?;
        assert!(messages.insert_message(&create_test_message("rollback@sitedb.test", "10.0.0.6"))?);
        messages.db_mut().rollback()?;

        assert_eq!(messages.time_since_email_last_sent("rollback@sitedb.test")?, None);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_pooled_transaction_stays_on_one_session() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::pooled(pg_config().with_connection_limit(2));
        assert!(db.is_pooled());
        setup(&mut db, "pooled@sitedb.test", "10.0.0.7")?;
        let mut messages = MessageDatabase::new(db);

        messages.db_mut().begin()?;
        assert!(messages.insert_message(&create_test_message("pooled@sitedb.test", "10.0.0.7"))?);
        // Visible inside the open transaction only if both run on the pinned connection
        assert!(messages.time_since_email_last_sent("pooled@sitedb.test")?.is_some());
        messages.db_mut().rollback()?;

        assert_eq!(messages.time_since_email_last_sent("pooled@sitedb.test")?, None);
        messages.db_mut().disconnect()?;
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_server_time_is_formatted() -> Result<(), Box<dyn Error>> {
        let mut db = PostgresDatabase::new(pg_config());
        db.connect()?;
        let time = db.server_time()?;
        assert_ne!(time, TIME_NOT_FOUND);
        // dd/mm/yyyy hh:mm:ss
        assert_eq!(time.len(), 19, "unexpected format: {}", time);
        db.disconnect()?;
        Ok(())
    }
}
