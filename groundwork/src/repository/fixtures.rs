//! Record types shared by the repository tests

use crate::record::{Record, Row, RowError, SqlValue};
use crate::updatable;

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub nickname: Option<String>,
}

impl Record for Contact {
    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            nickname: row.get("nickname")?,
        })
    }
}

pub fn contact_row(id: &str, user_id: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("user_id", user_id)
        .with("nickname", SqlValue::NULL)
}

pub struct ContactUpdate {
    pub nickname: Option<String>,
    pub email: Option<Option<String>>,
    pub note: Option<String>,
}

updatable!(ContactUpdate {
    nickname => "nickname",
    email => "email",
    note,
});

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub body: String,
}

impl Record for Note {
    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get("id")?,
            body: row.get("body")?,
        })
    }
}
