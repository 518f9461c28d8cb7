use actix_multipart::{Field, Multipart};
use chrono::{NaiveDate, NaiveDateTime};
use futures_util::TryStreamExt as _;

use crate::attachments::Upload;
use crate::config::UploadLimits;
use crate::error::StoreError;
use crate::models::{NewMessage, UpdateMessage};

/// Multipart field carrying attachment files.
pub const FILE_FIELD: &str = "content";
const TEXT_FIELD_LIMIT: usize = 64 * 1024;

/// Raw text fields and files of a create/update request. Blank text counts as absent.
#[derive(Debug, Default)]
pub struct MessageForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub enable: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub uploads: Vec<Upload>,
}

impl MessageForm {
    /// Drain the multipart body. The file count is checked as each file part
    /// arrives, so an oversized batch is refused before anything is stored.
    pub async fn read(mut payload: Multipart, limits: &UploadLimits) -> Result<Self, StoreError> {
        let mut form = MessageForm::default();
        while let Some(field) = payload.try_next().await.map_err(|e| {
            tracing::debug!("multipart error: {e}");
            StoreError::Validation("malformed multipart body".into())
        })? {
            let name = field.content_disposition().get_name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let original_name = field.content_disposition().get_filename().map(str::to_string);
                let bytes = read_file(field, limits.max_file_bytes).await?;
                // browsers send an empty part when no file was picked
                if original_name.as_deref().unwrap_or_default().is_empty() && bytes.is_empty() {
                    continue;
                }
                if form.uploads.len() == limits.max_files {
                    return Err(StoreError::TooManyFiles { max: limits.max_files });
                }
                form.uploads.push(Upload { original_name, bytes });
                continue;
            }
            let slot = match name.as_str() {
                "title" => &mut form.title,
                "description" => &mut form.description,
                "file_type" => &mut form.file_type,
                "enable" | "enabled" => &mut form.enable,
                "start_date" => &mut form.start_date,
                "end_date" => &mut form.end_date,
                _ => {
                    read_text(field).await?;
                    continue;
                }
            };
            *slot = non_blank(read_text(field).await?);
        }
        Ok(form)
    }

    pub fn into_new_message(self) -> Result<(NewMessage, Vec<Upload>), StoreError> {
        let title = self.title.ok_or_else(|| StoreError::Validation("title is required".into()))?;
        let new = NewMessage {
            title,
            description: self.description,
            file_type: self.file_type,
            enabled: self.enable.as_deref().map(parse_flag).transpose()?.unwrap_or(false),
            start_date: self.start_date.as_deref().map(parse_datetime).transpose()?,
            end_date: self.end_date.as_deref().map(parse_datetime).transpose()?,
            attachments: Default::default(),
        };
        Ok((new, self.uploads))
    }

    pub fn into_update(self) -> Result<(UpdateMessage, Vec<Upload>), StoreError> {
        let changes = UpdateMessage {
            title: self.title,
            description: self.description,
            file_type: self.file_type,
            enabled: self.enable.as_deref().map(parse_flag).transpose()?,
            start_date: self.start_date.as_deref().map(parse_datetime).transpose()?,
            end_date: self.end_date.as_deref().map(parse_datetime).transpose()?,
            attachments: None,
        };
        Ok((changes, self.uploads))
    }
}

// Values are kept as sent; only all-whitespace counts as absent.
fn non_blank(value: String) -> Option<String> {
    Some(value).filter(|v| !v.trim().is_empty())
}

async fn read_file(mut field: Field, max_bytes: usize) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        tracing::debug!("upload stream read error: {e}");
        StoreError::Validation("malformed multipart body".into())
    })? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(StoreError::FileTooLarge { max_bytes });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_text(mut field: Field) -> Result<String, StoreError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|_| StoreError::Validation("malformed multipart body".into()))?
    {
        if bytes.len() + chunk.len() > TEXT_FIELD_LIMIT {
            return Err(StoreError::Validation("text field too large".into()));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| StoreError::Validation("text field is not valid UTF-8".into()))
}

pub fn parse_flag(raw: &str) -> Result<bool, StoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(StoreError::Validation(format!("invalid enable flag: {raw}"))),
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` and the `T`-separated forms.
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, StoreError> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
        .ok_or_else(|| StoreError::Validation(format!("invalid date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(parse_flag("1").unwrap());
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("on").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(matches!(parse_flag("maybe"), Err(StoreError::Validation(_))));
    }

    #[test]
    fn dates() {
        let expect = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(9, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-01 09:30:00").unwrap(), expect);
        assert_eq!(parse_datetime("2024-05-01T09:30").unwrap(), expect);
        assert_eq!(
            parse_datetime("2024-05-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_datetime("01/05/2024").is_err());
    }

    #[test]
    fn text_values_keep_their_whitespace() {
        assert_eq!(non_blank("  line one\nline two\n".into()).as_deref(), Some("  line one\nline two\n"));
        assert_eq!(non_blank(" \n\t".into()), None);
        assert_eq!(non_blank(String::new()), None);
    }

    #[test]
    fn create_requires_title() {
        let err = MessageForm::default().into_new_message().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn update_leaves_omitted_fields_unset() {
        let form = MessageForm { title: Some("New".into()), ..Default::default() };
        let (changes, uploads) = form.into_update().unwrap();
        assert_eq!(changes.title.as_deref(), Some("New"));
        assert!(changes.enabled.is_none());
        assert!(changes.start_date.is_none());
        assert!(changes.attachments.is_none());
        assert!(uploads.is_empty());
    }
}
