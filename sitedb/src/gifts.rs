use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::Database;
use crate::error::SiteDbError;
use crate::rows::bool_from_int_or_bool;
use crate::value::SqlValue;

const RECIPIENT_COLUMNS: &[&str] = &["alias", "firstName", "lastName", "nickname"];
const GIFT_COLUMNS: &[&str] = &["xmasYear", "recipientAlias", "videoURL", "imageURL", "message"];
const GIFT_RECIPIENT_COLUMNS: &[&str] = &[
    "alias",
    "firstName",
    "lastName",
    "nickname",
    "xmasYear",
    "videoURL",
    "imageURL",
    "message",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub alias: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// A row of the `gift` table. A missing `xmas_year` means the current year
/// when creating or updating.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Gift {
    #[serde(rename = "xmasYear", default)]
    pub xmas_year: Option<i32>,
    #[serde(rename = "recipientAlias", default)]
    pub recipient_alias: String,
    #[serde(rename = "videoURL", default)]
    pub video_url: Option<String>,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A row of the `gift_recipients` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftRecipient {
    pub alias: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(rename = "xmasYear")]
    pub xmas_year: i32,
    #[serde(rename = "videoURL", default)]
    pub video_url: Option<String>,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasGiftStatus {
    pub alias: String,
    #[serde(deserialize_with = "bool_from_int_or_bool")]
    pub has_gift: bool,
}

#[derive(Debug, Deserialize)]
struct AliasRow {
    alias: String,
}

#[derive(Debug, Deserialize)]
struct SaltRow {
    salt: String,
}

/// Gift-exchange queries over any [`Database`] backend.
pub struct XmasDatabase<D: Database> {
    db: D,
}

impl<D: Database> XmasDatabase<D> {
    pub fn new(db: D) -> Self {
        XmasDatabase { db }
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    /// Calendar year in the configured display zone.
    pub fn current_year(&self) -> i32 {
        Utc::now()
            .with_timezone(&self.db.config().display_timezone)
            .year()
    }

    fn year_or_current(&self, year: Option<i32>) -> i32 {
        year.unwrap_or_else(|| self.current_year())
    }

    fn ph(&self, index: usize) -> String {
        self.db.database_type().placeholder(index)
    }

    pub fn get_all_recipients(&mut self) -> Result<Vec<Recipient>, SiteDbError> {
        let sql = format!(
            "SELECT {} FROM recipient",
            self.db.database_type().select_list(RECIPIENT_COLUMNS)
        );
        self.db.query(&sql, &[])
    }

    pub fn get_all_gifts(&mut self) -> Result<Vec<Gift>, SiteDbError> {
        let sql = format!(
            "SELECT {} FROM gift",
            self.db.database_type().select_list(GIFT_COLUMNS)
        );
        self.db.query(&sql, &[])
    }

    pub fn get_recipient(&mut self, alias: &str) -> Result<Option<Recipient>, SiteDbError> {
        let sql = format!(
            "SELECT {} FROM recipient WHERE alias = {} LIMIT 1",
            self.db.database_type().select_list(RECIPIENT_COLUMNS),
            self.ph(1)
        );
        self.db.query_one(&sql, &[SqlValue::from(alias)])
    }

    pub fn get_recipient_and_gift(
        &mut self,
        alias: &str,
        year: Option<i32>,
    ) -> Result<Option<GiftRecipient>, SiteDbError> {
        let year = self.year_or_current(year);
        let sql = format!(
            "SELECT {} FROM gift_recipients WHERE alias = {} AND xmasYear = {} LIMIT 1",
            self.db.database_type().select_list(GIFT_RECIPIENT_COLUMNS),
            self.ph(1),
            self.ph(2)
        );
        self.db
            .query_one(&sql, &[SqlValue::from(alias), SqlValue::from(year)])
    }

    pub fn get_recipients_with_gifts(&mut self, year: Option<i32>) -> Result<Vec<GiftRecipient>, SiteDbError> {
        let year = self.year_or_current(year);
        let sql = format!(
            "SELECT {} FROM gift_recipients WHERE xmasYear = {}",
            self.db.database_type().select_list(GIFT_RECIPIENT_COLUMNS),
            self.ph(1)
        );
        self.db.query(&sql, &[SqlValue::from(year)])
    }

    /// Password salt for `username`, if the user exists.
    pub fn get_salt(&mut self, username: &str) -> Result<Option<String>, SiteDbError> {
        let sql = format!(
            "SELECT salt FROM {} WHERE username = {} LIMIT 1",
            self.db.database_type().quote_ident("user"),
            self.ph(1)
        );
        let row: Option<SaltRow> = self.db.query_one(&sql, &[SqlValue::from(username)])?;
        Ok(row.map(|row| row.salt))
    }

    pub fn get_aliases(&mut self) -> Result<Vec<String>, SiteDbError> {
        let rows: Vec<AliasRow> = self.db.query("SELECT alias FROM recipient", &[])?;
        Ok(rows.into_iter().map(|row| row.alias).collect())
    }

    /// Aliases with no gift recorded for `year`.
    pub fn get_aliases_without_gifts(&mut self, year: Option<i32>) -> Result<Vec<String>, SiteDbError> {
        let year = self.year_or_current(year);
        let sql = format!(
            "SELECT R.alias AS alias FROM recipient R \
             WHERE NOT EXISTS (SELECT 1 FROM gift G WHERE G.recipientAlias = R.alias AND G.xmasYear = {}) \
             ORDER BY R.alias ASC",
            self.ph(1)
        );
        let rows: Vec<AliasRow> = self.db.query(&sql, &[SqlValue::from(year)])?;
        Ok(rows.into_iter().map(|row| row.alias).collect())
    }

    /// Every alias with a flag for whether it has a gift in `year`;
    /// aliases without gifts first, then alphabetical.
    pub fn get_aliases_with_gifts(&mut self, year: Option<i32>) -> Result<Vec<AliasGiftStatus>, SiteDbError> {
        let year = self.year_or_current(year);
        let has_gift = self.db.database_type().quote_ident("hasGift");
        let sql = format!(
            "SELECT R.alias AS alias, \
             CASE WHEN EXISTS (SELECT 1 FROM gift_recipients G WHERE G.alias = R.alias AND G.xmasYear = {}) \
             THEN 1 ELSE 0 END AS {has_gift} \
             FROM recipient R ORDER BY {has_gift}, R.alias ASC",
            self.ph(1),
            has_gift = has_gift
        );
        self.db.query(&sql, &[SqlValue::from(year)])
    }

    pub fn create_gift(&mut self, alias: &str, gift: &Gift) -> Result<bool, SiteDbError> {
        let year = self.year_or_current(gift.xmas_year);
        let sql = format!(
            "INSERT INTO gift (xmasYear, recipientAlias, videoURL, imageURL, message) VALUES ({})",
            self.db.database_type().placeholders(5)
        );
        let params = [
            SqlValue::from(year),
            SqlValue::from(alias),
            SqlValue::from(gift.video_url.clone()),
            SqlValue::from(gift.image_url.clone()),
            SqlValue::from(gift.message.clone()),
        ];
        Ok(self.db.execute(&sql, &params)? > 0)
    }

    pub fn create_recipient(&mut self, recipient: &Recipient) -> Result<bool, SiteDbError> {
        let sql = format!(
            "INSERT INTO recipient (alias, firstName, lastName, nickname) VALUES ({})",
            self.db.database_type().placeholders(4)
        );
        let params = [
            SqlValue::from(&recipient.alias),
            SqlValue::from(&recipient.first_name),
            SqlValue::from(&recipient.last_name),
            SqlValue::from(recipient.nickname.clone()),
        ];
        Ok(self.db.execute(&sql, &params)? > 0)
    }

    pub fn recipient_exists(&mut self, alias: &str) -> Result<bool, SiteDbError> {
        Ok(self.get_recipient(alias)?.is_some())
    }

    pub fn update_recipient(&mut self, alias: &str, recipient: &Recipient) -> Result<bool, SiteDbError> {
        let sql = format!(
            "UPDATE recipient SET firstName = {}, lastName = {}, nickname = {} WHERE alias = {}",
            self.ph(1),
            self.ph(2),
            self.ph(3),
            self.ph(4)
        );
        let params = [
            SqlValue::from(&recipient.first_name),
            SqlValue::from(&recipient.last_name),
            SqlValue::from(recipient.nickname.clone()),
            SqlValue::from(alias),
        ];
        Ok(self.db.execute(&sql, &params)? > 0)
    }

    pub fn has_gift(&mut self, alias: &str, year: Option<i32>) -> Result<bool, SiteDbError> {
        Ok(self.get_recipient_and_gift(alias, year)?.is_some())
    }

    pub fn update_gift(&mut self, alias: &str, gift: &Gift) -> Result<bool, SiteDbError> {
        let year = self.year_or_current(gift.xmas_year);
        let sql = format!(
            "UPDATE gift SET videoURL = {}, imageURL = {}, message = {} WHERE recipientAlias = {} AND xmasYear = {}",
            self.ph(1),
            self.ph(2),
            self.ph(3),
            self.ph(4),
            self.ph(5)
        );
        let params = [
            SqlValue::from(gift.video_url.clone()),
            SqlValue::from(gift.image_url.clone()),
            SqlValue::from(gift.message.clone()),
            SqlValue::from(alias),
            SqlValue::from(year),
        ];
        Ok(self.db.execute(&sql, &params)? > 0)
    }
}
