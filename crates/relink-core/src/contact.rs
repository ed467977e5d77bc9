//! Contact fragment — the sole persisted entity.
//!
//! A fragment holds one known email and/or one known phone number. Fragments
//! that transitively share an attribute form a cluster with exactly one
//! primary (the oldest member); every other member is a secondary pointing at
//! that primary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::IdentifyQuery;

/// Role of a fragment within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

/// One stored contact fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
  pub id:              i64,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub link_precedence: LinkPrecedence,
  /// Id of this fragment's primary; present iff the fragment is secondary.
  pub linked_id:       Option<i64>,
  /// Immutable after creation; the merge tie-break.
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// Soft-deletion marker. Deleted fragments are invisible to resolution.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl Contact {
  pub fn is_primary(&self) -> bool {
    matches!(self.link_precedence, LinkPrecedence::Primary)
  }

  /// True when this fragment already carries every field the query supplies.
  /// An absent query field matches anything.
  pub fn satisfies(&self, query: &IdentifyQuery) -> bool {
    let email_known = match query.email() {
      Some(e) => self.email.as_deref() == Some(e),
      None => true,
    };
    let phone_known = match query.phone_number() {
      Some(p) => self.phone_number.as_deref() == Some(p),
      None => true,
    };
    email_known && phone_known
  }
}

// ─── Materialised view ───────────────────────────────────────────────────────

/// The deduplicated read model for a resolved cluster — never stored, always
/// derived from the final cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCluster {
  pub primary_contact_id:    i64,
  pub emails:                Vec<String>,
  pub phone_numbers:         Vec<String>,
  pub secondary_contact_ids: Vec<i64>,
}

impl ResolvedCluster {
  /// Assemble the view from the final cluster membership.
  ///
  /// The primary's own values surface first so output order is
  /// deterministic; duplicates are dropped in encounter order.
  pub fn from_members(primary_id: i64, members: &[Contact]) -> Self {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    let mut secondary_contact_ids = Vec::new();

    let ordered = members
      .iter()
      .filter(|c| c.id == primary_id)
      .chain(members.iter().filter(|c| c.id != primary_id));

    for member in ordered {
      if let Some(email) = &member.email
        && !emails.contains(email)
      {
        emails.push(email.clone());
      }
      if let Some(phone) = &member.phone_number
        && !phone_numbers.contains(phone)
      {
        phone_numbers.push(phone.clone());
      }
      if member.id != primary_id {
        secondary_contact_ids.push(member.id);
      }
    }

    Self {
      primary_contact_id: primary_id,
      emails,
      phone_numbers,
      secondary_contact_ids,
    }
  }
}
