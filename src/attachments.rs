//! Upload batch → storage identifiers, and best-effort removal of identifiers
//! that no record references any more.
//!
//! Identifiers are `<unix millis>-<random hex><.ext>`; the random part keeps
//! uploads landing in the same millisecond apart, so two rows never share a
//! file and a collection run can never take a file another row still holds.

use std::path::Path;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::Attachments;
use crate::storage::AttachmentStore;

const MAX_EXT_LEN: usize = 16;

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { original_name: Some(original_name.into()), bytes: bytes.into() }
    }
}

/// Extension of the client file name, lowercased, `.`-prefixed; empty when unusable.
fn extension_of(original: Option<&str>) -> String {
    original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= MAX_EXT_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

pub fn storage_name(original: Option<&str>) -> String {
    format!("{}-{:08x}{}", Utc::now().timestamp_millis(), rand::random::<u32>(), extension_of(original))
}

/// Persist every upload and return their identifiers in input order.
///
/// Either the whole batch is stored or nothing is: when any write fails the
/// files of this batch that did land are collected before the error returns.
pub async fn resolve_uploads(
    store: &dyn AttachmentStore,
    uploads: Vec<Upload>,
    max_files: usize,
) -> Result<Attachments, StoreError> {
    if uploads.len() > max_files {
        return Err(StoreError::TooManyFiles { max: max_files });
    }
    if uploads.is_empty() {
        return Ok(Attachments::default());
    }

    let names: Vec<String> = uploads.iter().map(|u| storage_name(u.original_name.as_deref())).collect();
    let results = join_all(uploads.iter().zip(&names).map(|(u, name)| store.save(name, &u.bytes))).await;

    let mut written = Vec::with_capacity(names.len());
    let mut first_error = None;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(()) => written.push(name.clone()),
            Err(e) => {
                warn!(name = %name, "attachment write failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        collect_garbage(store, &written).await;
        return Err(StoreError::StorageWrite(e.to_string()));
    }
    debug!(count = names.len(), "upload batch stored");
    Ok(Attachments::new(names))
}

/// Outcome of one collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Remove each identifier independently. Failures are logged and reported,
/// never returned as errors, and never stop the remaining removals.
pub async fn collect_garbage(store: &dyn AttachmentStore, names: &[String]) -> CollectionReport {
    let mut report = CollectionReport::default();
    if names.is_empty() {
        return report;
    }
    let results = join_all(names.iter().map(|name| store.delete(name))).await;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(()) => report.removed.push(name.clone()),
            Err(e) => {
                warn!(name = %name, "attachment removal failed: {e}");
                report.failed.push(name.clone());
            }
        }
    }
    info!(removed = report.removed.len(), failed = report.failed.len(), "attachment collection finished");
    report
}
