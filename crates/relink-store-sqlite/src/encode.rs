//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings; link precedence as
//! `'primary' | 'secondary'`. Decoding happens inside row mappers, so the
//! helpers speak [`rusqlite::Error`] directly.

use chrono::{DateTime, Utc};
use relink_core::contact::{Contact, LinkPrecedence};
use rusqlite::{Row, types::Type};

/// Column list matching the field order [`contact_from_row`] expects.
pub const CONTACT_COLUMNS: &str =
  "id, email, phone_number, link_precedence, linked_id, created_at, updated_at, deleted_at";

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

fn decode_dt(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(&s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn encode_precedence(p: LinkPrecedence) -> &'static str {
  match p {
    LinkPrecedence::Primary => "primary",
    LinkPrecedence::Secondary => "secondary",
  }
}

fn decode_precedence(idx: usize, s: String) -> rusqlite::Result<LinkPrecedence> {
  match s.as_str() {
    "primary" => Ok(LinkPrecedence::Primary),
    "secondary" => Ok(LinkPrecedence::Secondary),
    other => Err(rusqlite::Error::FromSqlConversionFailure(
      idx,
      Type::Text,
      format!("unknown link precedence: {other:?}").into(),
    )),
  }
}

/// Map one row selected with [`CONTACT_COLUMNS`] to a [`Contact`].
pub fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
  let deleted_at: Option<String> = row.get(7)?;
  Ok(Contact {
    id:              row.get(0)?,
    email:           row.get(1)?,
    phone_number:    row.get(2)?,
    link_precedence: decode_precedence(3, row.get(3)?)?,
    linked_id:       row.get(4)?,
    created_at:      decode_dt(5, row.get(5)?)?,
    updated_at:      decode_dt(6, row.get(6)?)?,
    deleted_at:      deleted_at.map(|s| decode_dt(7, s)).transpose()?,
  })
}
