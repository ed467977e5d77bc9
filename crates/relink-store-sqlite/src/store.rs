//! [`SqliteStore`] — the SQLite implementation of [`IdentityResolver`].

use std::path::Path;

use chrono::Utc;
use relink_core::{
  contact::{Contact, LinkPrecedence, ResolvedCluster},
  query::IdentifyQuery,
  resolve::resolve,
  store::{ContactStore, IdentityResolver},
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use crate::{
  Error, Result,
  encode::{CONTACT_COLUMNS, contact_from_row, encode_dt, encode_precedence},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Relink contact store backed by a single SQLite file.
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
    Ok(())
  }

  /// Fetch one fragment by id, soft-deleted rows included.
  pub async fn contact(&self, id: i64) -> Result<Option<Contact>> {
    let row = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
              rusqlite::params![id],
              contact_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(row)
  }

  /// All fragments in id order, soft-deleted rows included. Intended for
  /// inspection and tests, not for resolution.
  pub async fn list_contacts(&self) -> Result<Vec<Contact>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id"))?;
        let rows = stmt
          .query_map([], contact_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Soft-delete a fragment, hiding it from all future resolutions.
  /// Returns `false` if the fragment is unknown or already deleted.
  /// Resolution itself never deletes; this is an operator tool.
  pub async fn soft_delete(&self, id: i64) -> Result<bool> {
    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE contacts SET deleted_at = ?1, updated_at = ?1
           WHERE id = ?2 AND deleted_at IS NULL",
          rusqlite::params![now, id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}

// ─── IdentityResolver impl ───────────────────────────────────────────────────

impl IdentityResolver for SqliteStore {
  type Error = Error;

  async fn identify(&self, query: IdentifyQuery) -> Result<ResolvedCluster> {
    let view = self
      .conn
      .call(move |conn| {
        // One IMMEDIATE transaction per resolution: the write lock is taken
        // up front so overlapping resolutions fully serialize, and dropping
        // the transaction on any error path rolls every mutation back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let view = resolve(&mut TxContacts { tx: &tx }, &query)?;
        tx.commit()?;
        Ok(view)
      })
      .await?;
    Ok(view)
  }
}

// ─── Unit-of-work operations ─────────────────────────────────────────────────

/// [`ContactStore`] operations bound to one open transaction.
struct TxContacts<'a> {
  tx: &'a rusqlite::Transaction<'a>,
}

impl TxContacts<'_> {
  fn insert(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
    precedence: LinkPrecedence,
    linked_id: Option<i64>,
  ) -> rusqlite::Result<Contact> {
    let now = Utc::now();
    self.tx.execute(
      "INSERT INTO contacts (email, phone_number, link_precedence, linked_id, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
      rusqlite::params![
        email,
        phone,
        encode_precedence(precedence),
        linked_id,
        encode_dt(now),
      ],
    )?;
    Ok(Contact {
      id: self.tx.last_insert_rowid(),
      email: email.map(str::to_owned),
      phone_number: phone.map(str::to_owned),
      link_precedence: precedence,
      linked_id,
      created_at: now,
      updated_at: now,
      deleted_at: None,
    })
  }
}

impl ContactStore for TxContacts<'_> {
  type Error = rusqlite::Error;

  fn find_by_email_or_phone(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> rusqlite::Result<Vec<Contact>> {
    // A NULL parameter compares as unknown and so never matches a row.
    let mut stmt = self.tx.prepare(&format!(
      "SELECT {CONTACT_COLUMNS} FROM contacts
       WHERE (email = ?1 OR phone_number = ?2) AND deleted_at IS NULL
       ORDER BY created_at, id"
    ))?;
    stmt
      .query_map(rusqlite::params![email, phone], contact_from_row)?
      .collect()
  }

  fn insert_primary(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> rusqlite::Result<Contact> {
    self.insert(email, phone, LinkPrecedence::Primary, None)
  }

  fn insert_secondary(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
    primary_id: i64,
  ) -> rusqlite::Result<Contact> {
    self.insert(email, phone, LinkPrecedence::Secondary, Some(primary_id))
  }

  fn demote(&mut self, id: i64, primary_id: i64) -> rusqlite::Result<()> {
    self.tx.execute(
      "UPDATE contacts
       SET link_precedence = 'secondary', linked_id = ?1, updated_at = ?2
       WHERE id = ?3",
      rusqlite::params![primary_id, encode_dt(Utc::now()), id],
    )?;
    Ok(())
  }

  fn fetch_cluster(&mut self, primary_id: i64) -> rusqlite::Result<Vec<Contact>> {
    let mut stmt = self.tx.prepare(&format!(
      "SELECT {CONTACT_COLUMNS} FROM contacts
       WHERE (id = ?1 OR linked_id = ?1) AND deleted_at IS NULL
       ORDER BY created_at, id"
    ))?;
    stmt
      .query_map(rusqlite::params![primary_id], contact_from_row)?
      .collect()
  }
}

// ─── Test seeding ────────────────────────────────────────────────────────────

#[cfg(test)]
impl SqliteStore {
  /// Insert a fragment directly with a pinned `created_at`, bypassing
  /// resolution. Lets tests stage pre-existing clusters that `identify`
  /// alone could never produce (e.g. disconnected primaries that a later
  /// query merges).
  pub(crate) async fn seed_contact(
    &self,
    email: Option<&str>,
    phone: Option<&str>,
    precedence: LinkPrecedence,
    linked_id: Option<i64>,
    created_at: chrono::DateTime<Utc>,
  ) -> Result<i64> {
    let email = email.map(str::to_owned);
    let phone = phone.map(str::to_owned);
    let at = encode_dt(created_at);
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO contacts (email, phone_number, link_precedence, linked_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![email, phone, encode_precedence(precedence), linked_id, at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }
}
