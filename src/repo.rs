use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Row store for messages. Every call except create is scoped by
/// `(id, owner_id)`; a row owned by someone else is reported as `NotFound`.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn list_messages(&self, owner_id: OwnerId) -> RepoResult<Vec<Message>>;
    async fn get_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message>;
    async fn create_message(&self, owner_id: OwnerId, new: NewMessage) -> RepoResult<Message>;
    /// Writes only the supplied columns. `replaced` in the result holds the
    /// identifiers displaced when `upd.attachments` was set.
    async fn update_message(&self, id: Id, owner_id: OwnerId, upd: UpdateMessage) -> RepoResult<UpdatedMessage>;
    /// Removes the row and returns it as it was.
    async fn delete_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message>;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tokio::io::AsyncWriteExt;
    use tracing::{debug, error, info};

    const SNAPSHOT_FILE: &str = "messages.json";

    #[derive(Default, Serialize, Deserialize)]
    #[serde(default)]
    struct State {
        messages: BTreeMap<Id, MessageRow>,
        next_id: Id,
    }

    /// How to take a mutation back when its snapshot could not be written.
    enum Undo {
        Remove(Id),
        Restore(MessageRow),
    }

    impl Undo {
        fn apply(self, state: &mut State) {
            match self {
                Undo::Remove(id) => { state.messages.remove(&id); }
                Undo::Restore(row) => { state.messages.insert(row.id, row); }
            }
        }
    }

    struct Snapshot {
        path: PathBuf,
        // one snapshot write at a time, in mutation order
        writer: tokio::sync::Mutex<()>,
    }

    /// `RwLock`-guarded rows, optionally mirrored to a JSON snapshot.
    ///
    /// With a snapshot a mutation only succeeds once the new snapshot is on
    /// disk; a failed write rolls the in-memory change back.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot: Option<Arc<Snapshot>>,
    }

    impl InMemRepo {
        /// Volatile repository; nothing touches disk.
        pub fn new() -> Self { Self::default() }

        /// Repository backed by `<dir>/messages.json`, loaded now and rewritten after each mutation.
        ///
        /// A missing snapshot starts empty. An unreadable one is an error: starting
        /// empty would overwrite it on the first write and orphan every file it lists.
        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> RepoResult<Self> {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot: Some(Arc::new(Snapshot { path, writer: tokio::sync::Mutex::new(()) })),
            })
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!(path = %path.display(), "no snapshot; starting empty");
                    return Ok(State::default());
                }
                Err(e) => {
                    return Err(RepoError::Internal(format!("cannot read snapshot {}: {e}", path.display())));
                }
            };
            let mut s = serde_json::from_slice::<State>(&bytes).map_err(|e| {
                RepoError::Internal(format!(
                    "snapshot {} is corrupt ({e}); restore or move it aside before starting",
                    path.display()
                ))
            })?;
            // snapshots written by hand may lack a counter
            let max = s.messages.keys().next_back().copied().unwrap_or(0);
            s.next_id = s.next_id.max(max);
            info!(path = %path.display(), rows = s.messages.len(), "loaded message snapshot");
            Ok(s)
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn owned_mut(state: &mut State, id: Id, owner_id: OwnerId) -> RepoResult<&mut MessageRow> {
            state
                .messages
                .get_mut(&id)
                .filter(|row| row.owner_id == owner_id)
                .ok_or(RepoError::NotFound)
        }

        /// Apply `mutate`, then persist the resulting state outside the state lock.
        async fn commit<T, F>(&self, mutate: F) -> RepoResult<T>
        where
            T: Send,
            F: FnOnce(&mut State) -> RepoResult<(T, Undo)> + Send,
        {
            let Some(snapshot) = self.snapshot.as_deref() else {
                let mut s = self.write()?;
                return mutate(&mut *s).map(|(out, _)| out);
            };

            let _writer = snapshot.writer.lock().await;
            let (out, undo, bytes) = {
                let mut s = self.write()?;
                let (out, undo) = mutate(&mut *s)?;
                match serde_json::to_vec_pretty(&*s) {
                    Ok(bytes) => (out, undo, bytes),
                    Err(e) => {
                        undo.apply(&mut *s);
                        return Err(RepoError::Internal(format!("snapshot encode failed: {e}")));
                    }
                }
            };

            if let Err(e) = write_snapshot(&snapshot.path, &bytes).await {
                error!(path = %snapshot.path.display(), "failed to write snapshot: {e}");
                undo.apply(&mut *self.write()?);
                return Err(RepoError::Internal(format!("snapshot write failed: {e}")));
            }
            debug!(path = %snapshot.path.display(), size = bytes.len(), "snapshot written");
            Ok(out)
        }
    }

    // temp file + fsync + rename: a crash leaves either the old or the new snapshot
    async fn write_snapshot(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;
        let temp = dir.join(format!(".{SNAPSHOT_FILE}.part"));
        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, path).await
        }
        .await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&temp).await;
        }
        written
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn list_messages(&self, owner_id: OwnerId) -> RepoResult<Vec<Message>> {
            let s = self.read()?;
            Ok(s.messages
                .values()
                .filter(|row| row.owner_id == owner_id)
                .cloned()
                .map(Message::from)
                .collect())
        }

        async fn get_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message> {
            let s = self.read()?;
            s.messages
                .get(&id)
                .filter(|row| row.owner_id == owner_id)
                .cloned()
                .map(Message::from)
                .ok_or(RepoError::NotFound)
        }

        async fn create_message(&self, owner_id: OwnerId, new: NewMessage) -> RepoResult<Message> {
            self.commit(move |s| {
                s.next_id += 1;
                let id = s.next_id;
                let now = Utc::now();
                let row = MessageRow {
                    id,
                    owner_id,
                    title: new.title,
                    description: new.description,
                    file_type: new.file_type,
                    enabled: new.enabled,
                    start_date: new.start_date,
                    end_date: new.end_date,
                    attachments: Some(new.attachments.to_column()),
                    created_at: now,
                    updated_at: now,
                };
                s.messages.insert(id, row.clone());
                Ok((row.into(), Undo::Remove(id)))
            })
            .await
        }

        async fn update_message(&self, id: Id, owner_id: OwnerId, upd: UpdateMessage) -> RepoResult<UpdatedMessage> {
            self.commit(move |s| {
                let row = Self::owned_mut(s, id, owner_id)?;
                let before = row.clone();

                if let Some(title) = upd.title { row.title = title; }
                if let Some(description) = upd.description { row.description = Some(description); }
                if let Some(file_type) = upd.file_type { row.file_type = Some(file_type); }
                if let Some(enabled) = upd.enabled { row.enabled = enabled; }
                if let Some(start) = upd.start_date { row.start_date = Some(start); }
                if let Some(end) = upd.end_date { row.end_date = Some(end); }
                let replaced = match upd.attachments {
                    Some(next) => {
                        let previous = row.attachments.replace(next.to_column());
                        Attachments::from_column(previous.as_deref())
                    }
                    None => Attachments::default(),
                };
                row.updated_at = Utc::now();

                let message = Message::from(row.clone());
                Ok((UpdatedMessage { message, replaced }, Undo::Restore(before)))
            })
            .await
        }

        async fn delete_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message> {
            self.commit(move |s| {
                Self::owned_mut(s, id, owner_id)?;
                let row = s.messages.remove(&id).ok_or(RepoError::NotFound)?;
                Ok((row.clone().into(), Undo::Restore(row)))
            })
            .await
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{FromRow, Pool, Postgres, QueryBuilder, Row};

    const COLUMNS: &str = "id, owner_id, title, description, file_type, enabled, start_date, end_date, attachments, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        tracing::error!("message query failed: {e}");
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl MessageRepo for PgRepo {
        async fn list_messages(&self, owner_id: OwnerId) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE owner_id = $1 ORDER BY id"
            ))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows.into_iter().map(Message::from).collect())
        }

        async fn get_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message> {
            sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {COLUMNS} FROM messages WHERE id = $1 AND owner_id = $2"
            ))
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .map(Message::from)
            .ok_or(RepoError::NotFound)
        }

        async fn create_message(&self, owner_id: OwnerId, new: NewMessage) -> RepoResult<Message> {
            let row = sqlx::query_as::<_, MessageRow>(&format!(
                "INSERT INTO messages (owner_id, title, description, file_type, enabled, start_date, end_date, attachments) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {COLUMNS}"
            ))
            .bind(owner_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.file_type)
            .bind(new.enabled)
            .bind(new.start_date)
            .bind(new.end_date)
            .bind(new.attachments.to_column())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.into())
        }

        async fn update_message(&self, id: Id, owner_id: OwnerId, upd: UpdateMessage) -> RepoResult<UpdatedMessage> {
            // The CTE hands back the attachment column as it was before this
            // statement, so the caller collects exactly what was displaced.
            let mut qb = QueryBuilder::<Postgres>::new(
                "WITH previous AS (SELECT id, attachments FROM messages WHERE id = ",
            );
            qb.push_bind(id);
            qb.push(" AND owner_id = ");
            qb.push_bind(owner_id);
            qb.push(" FOR UPDATE) UPDATE messages m SET updated_at = now()");
            if let Some(title) = upd.title { qb.push(", title = ").push_bind(title); }
            if let Some(description) = upd.description { qb.push(", description = ").push_bind(description); }
            if let Some(file_type) = upd.file_type { qb.push(", file_type = ").push_bind(file_type); }
            if let Some(enabled) = upd.enabled { qb.push(", enabled = ").push_bind(enabled); }
            if let Some(start) = upd.start_date { qb.push(", start_date = ").push_bind(start); }
            if let Some(end) = upd.end_date { qb.push(", end_date = ").push_bind(end); }
            let replacing = upd.attachments.is_some();
            if let Some(next) = upd.attachments { qb.push(", attachments = ").push_bind(next.to_column()); }
            qb.push(
                " FROM previous WHERE m.id = previous.id RETURNING m.id, m.owner_id, m.title, m.description, \
                 m.file_type, m.enabled, m.start_date, m.end_date, m.attachments, m.created_at, m.updated_at, \
                 previous.attachments AS previous_attachments",
            );

            let row: PgRow = qb
                .build()
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)?;
            let message = MessageRow::from_row(&row).map_err(internal)?;
            let replaced = if replacing {
                let previous: Option<String> = row.try_get("previous_attachments").map_err(internal)?;
                Attachments::from_column(previous.as_deref())
            } else {
                Attachments::default()
            };
            Ok(UpdatedMessage { message: message.into(), replaced })
        }

        async fn delete_message(&self, id: Id, owner_id: OwnerId) -> RepoResult<Message> {
            sqlx::query_as::<_, MessageRow>(&format!(
                "DELETE FROM messages WHERE id = $1 AND owner_id = $2 RETURNING {COLUMNS}"
            ))
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .map(Message::from)
            .ok_or(RepoError::NotFound)
        }
    }
}
