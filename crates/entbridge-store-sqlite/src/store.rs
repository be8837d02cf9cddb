//! [`SqliteStore`] — the SQLite implementation of [`ReferralStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use entbridge_core::{
  draft::Draft,
  profile::{DentistProfile, ProfilePatch, UserId},
  store::ReferralStore,
  submission::{SubmissionEntry, SubmissionStatus},
};

use crate::{
  encode::{
    encode_attachments, encode_dt, encode_status, RawDraft, RawProfile,
    RawSubmission,
  },
  schema::{EXPECTED_COLUMNS, SCHEMA},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A referral store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    self.ensure_columns().await
  }

  /// Additive migration: add any expected column a pre-existing table is
  /// missing. Columns this build does not know about are left untouched.
  async fn ensure_columns(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        for (table, columns) in EXPECTED_COLUMNS {
          let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
          let have: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

          for (name, sql_type) in *columns {
            if !have.iter().any(|h| h == name) {
              conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {name} {sql_type}"),
                [],
              )?;
            }
          }
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_profile_row(&self, user_id: UserId) -> Result<Option<DentistProfile>> {
    let id = user_id.0;
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, full_name, phone, workplace, handle
             FROM dentists WHERE user_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawProfile {
                user_id:   row.get(0)?,
                full_name: row.get(1)?,
                phone:     row.get(2)?,
                workplace: row.get(3)?,
                handle:    row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    Ok(raw.map(RawProfile::into_profile))
  }
}

// ─── ReferralStore impl ──────────────────────────────────────────────────────

impl ReferralStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn upsert_profile(
    &self,
    user_id: UserId,
    patch: ProfilePatch,
  ) -> Result<DentistProfile> {
    // Read-modify-write: patched fields replace, absent ones carry over.
    let mut profile = self
      .fetch_profile_row(user_id)
      .await?
      .unwrap_or_else(|| DentistProfile::empty(user_id));

    if let Some(v) = patch.full_name { profile.full_name = Some(v); }
    if let Some(v) = patch.phone     { profile.phone     = Some(v); }
    if let Some(v) = patch.workplace { profile.workplace = Some(v); }
    if let Some(v) = patch.handle    { profile.handle    = Some(v); }

    let row = profile.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dentists (user_id, full_name, phone, workplace, handle)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(user_id) DO UPDATE SET
             full_name = excluded.full_name,
             phone     = excluded.phone,
             workplace = excluded.workplace,
             handle    = excluded.handle",
          rusqlite::params![
            row.user_id.0,
            row.full_name,
            row.phone,
            row.workplace,
            row.handle,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(profile)
  }

  async fn get_profile(&self, user_id: UserId) -> Result<DentistProfile> {
    Ok(
      self
        .fetch_profile_row(user_id)
        .await?
        .unwrap_or_else(|| DentistProfile::empty(user_id)),
    )
  }

  // ── Drafts ────────────────────────────────────────────────────────────────

  async fn save_draft(&self, user_id: UserId, draft: Draft) -> Result<()> {
    let attachments_json = encode_attachments(&draft.attachments)?;
    let id = user_id.0;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO drafts (user_id, complaints, history, plan, attachments)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(user_id) DO UPDATE SET
             complaints  = excluded.complaints,
             history     = excluded.history,
             plan        = excluded.plan,
             attachments = excluded.attachments",
          rusqlite::params![
            id,
            draft.complaints,
            draft.history,
            draft.plan,
            attachments_json,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_draft(&self, user_id: UserId) -> Result<Draft> {
    let id = user_id.0;
    let raw: Option<RawDraft> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT complaints, history, plan, attachments
             FROM drafts WHERE user_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawDraft {
                complaints:  row.get(0)?,
                history:     row.get(1)?,
                plan:        row.get(2)?,
                attachments: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    match raw {
      Some(raw) => raw.into_draft(),
      None => Ok(Draft::default()),
    }
  }

  async fn clear_draft(&self, user_id: UserId) -> Result<()> {
    let id = user_id.0;
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM drafts WHERE user_id = ?1", rusqlite::params![id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Submission log — append-only ──────────────────────────────────────────

  async fn append_submission(
    &self,
    user_id: UserId,
    status: SubmissionStatus,
  ) -> Result<SubmissionEntry> {
    let created_at = Utc::now();
    let id = user_id.0;
    let status_str = encode_status(status).to_owned();
    let at_str = encode_dt(created_at);

    let submission_id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO submissions (user_id, status, created_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id, status_str, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(SubmissionEntry { submission_id, user_id, status, created_at })
  }

  async fn list_submissions(&self, user_id: UserId) -> Result<Vec<SubmissionEntry>> {
    let id = user_id.0;
    let raws: Vec<RawSubmission> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT submission_id, user_id, status, created_at
           FROM submissions WHERE user_id = ?1
           ORDER BY submission_id DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawSubmission {
              submission_id: row.get(0)?,
              user_id:       row.get(1)?,
              status:        row.get(2)?,
              created_at:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubmission::into_entry).collect()
  }

  async fn get_submission(&self, submission_id: i64) -> Result<Option<SubmissionEntry>> {
    let raw: Option<RawSubmission> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT submission_id, user_id, status, created_at
             FROM submissions WHERE submission_id = ?1",
            rusqlite::params![submission_id],
            |row| {
              Ok(RawSubmission {
                submission_id: row.get(0)?,
                user_id:       row.get(1)?,
                status:        row.get(2)?,
                created_at:    row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubmission::into_entry).transpose()
  }
}
