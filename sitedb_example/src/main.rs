use anyhow::Context;
use log::{info, warn};
use sitedb::{
    load_dotenv, Database, DatabaseType, DbConfig, MessageDatabase, MySqlDatabase, PostgresDatabase,
    MINUTE_S,
};

/// Reports whether a sender may post to the contact form, lists the stored
/// messages and prints the Postgres server time.
///
/// Connection settings come from `MYSQL_*` and `PG_*` variables, optionally
/// loaded from a `.env` file. Usage: `sitedb_example [email] [ip]`.
fn main() -> anyhow::Result<()> {
    env_logger::init();
    load_dotenv();

    let mut args = std::env::args().skip(1);
    let email = args.next().unwrap_or_else(|| "visitor@example.com".to_string());
    let ip_address = args.next().unwrap_or_else(|| "127.0.0.1".to_string());

    // --- Contact form (MySQL) ---
    println!("\n--- Contact form ---");
    let mysql_config = DbConfig::from_env(DatabaseType::MySQL, "MYSQL")
        .context("MySQL settings are incomplete")?;
    println!("{}", MySqlDatabase::new(mysql_config.clone()));
    let mut messages = MessageDatabase::new(MySqlDatabase::new(mysql_config));
    messages.db_mut().connect().context("could not reach MySQL")?;

    let status = messages.can_send_message(&email, &ip_address)?;
    match status.wait_time {
        Some(wait) if !status.can_send => println!(
            "{} from {} must wait {} s (about {} min)",
            email,
            ip_address,
            wait,
            wait.div_ceil(MINUTE_S)
        ),
        _ => println!("{} from {} may send a message", email, ip_address),
    }
    println!("{}", serde_json::to_string(&status)?);

    let all = messages.get_all_messages()?;
    println!("{} stored message(s)", all.len());
    for message in all.iter().take(5) {
        println!(
            "  {:?} {} <{}>: {}",
            message.submit_time, message.first_name, message.email, message.message_subject
        );
    }
    messages.db_mut().disconnect()?;

    // --- Health check (Postgres) ---
    println!("\n--- Server time ---");
    match DbConfig::from_env(DatabaseType::PostgreSQL, "PG") {
        Ok(config) => {
            let mut pg = PostgresDatabase::new(config);
            pg.connect().context("could not reach Postgres")?;
            println!("Postgres time: {}", pg.server_time()?);
            pg.disconnect()?;
        }
        Err(e) => warn!("Skipping Postgres: {}", e),
    }

    info!("Done");
    Ok(())
}
