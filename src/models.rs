use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;
pub type OwnerId = i64;

/// Textual form used for every date surfaced to clients (no timezone suffix).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ordered storage identifiers attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Attachments(pub Vec<String>);

// Historical rows hold either a JSON array or a bare filename.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAttachments {
    Many(Vec<String>),
    One(String),
}

impl Attachments {
    pub fn new(names: Vec<String>) -> Self { Self(names) }

    /// Decode the persisted column. Anything that is not a JSON array or
    /// JSON string is taken verbatim as a single identifier.
    pub fn from_column(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            None | Some("") | Some("null") => return Self::default(),
            Some(r) => r,
        };
        let names = match serde_json::from_str::<StoredAttachments>(raw) {
            Ok(StoredAttachments::Many(v)) => v,
            Ok(StoredAttachments::One(s)) => vec![s],
            Err(_) => vec![raw.to_string()],
        };
        Self(names.into_iter().filter(|n| !n.trim().is_empty()).collect())
    }

    /// Column encoding; always the array form.
    pub fn to_column(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".into())
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> std::slice::Iter<'_, String> { self.0.iter() }
    pub fn contains(&self, name: &str) -> bool { self.0.iter().any(|n| n == name) }
    pub fn as_slice(&self) -> &[String] { &self.0 }
    pub fn into_inner(self) -> Vec<String> { self.0 }
}

impl From<Vec<String>> for Attachments {
    fn from(v: Vec<String>) -> Self { Self(v) }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Id,
    #[serde(skip)]
    pub owner_id: OwnerId, // never exposed to clients
    pub title: String,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub enabled: bool,
    #[serde(default, with = "fixed_format::optional")]
    #[schema(value_type = Option<String>, example = "2024-05-01 09:00:00")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default, with = "fixed_format::optional")]
    #[schema(value_type = Option<String>, example = "2024-05-31 18:00:00")]
    pub end_date: Option<NaiveDateTime>,
    #[schema(value_type = Vec<String>)]
    pub attachments: Attachments,
    #[serde(with = "fixed_format::utc")]
    #[schema(value_type = String, example = "2024-04-30 12:00:00")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "fixed_format::utc")]
    #[schema(value_type = String, example = "2024-04-30 12:00:00")]
    pub updated_at: DateTime<Utc>,
}

/// Row as persisted; `attachments` is the raw text column.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Id,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub enabled: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub attachments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            file_type: row.file_type,
            enabled: row.enabled,
            start_date: row.start_date,
            end_date: row.end_date,
            attachments: Attachments::from_column(row.attachments.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub title: String,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub enabled: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub attachments: Attachments,
}

/// Partial update; `None` leaves the stored column as it is.
#[derive(Debug, Clone, Default)]
pub struct UpdateMessage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub enabled: Option<bool>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub attachments: Option<Attachments>,
}

/// Result of an update: the new record and the identifiers it no longer holds.
#[derive(Debug, Clone)]
pub struct UpdatedMessage {
    pub message: Message,
    pub replaced: Attachments,
}

pub mod fixed_format {
    pub mod utc {
        use chrono::{DateTime, NaiveDateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        use crate::models::TIMESTAMP_FORMAT;

        pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
            s.collect_str(&dt.format(TIMESTAMP_FORMAT))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
            let raw = String::deserialize(d)?;
            NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                .map(|n| n.and_utc())
                .map_err(de::Error::custom)
        }
    }

    pub mod optional {
        use chrono::NaiveDateTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        use crate::models::TIMESTAMP_FORMAT;

        pub fn serialize<S: Serializer>(dt: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.collect_str(&dt.format(TIMESTAMP_FORMAT)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(de::Error::custom))
                .transpose()
        }
    }
}
