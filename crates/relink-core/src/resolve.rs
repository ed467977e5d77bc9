//! The resolution engine: graph walk, primary selection, merge, and view
//! assembly.
//!
//! Expressed as sequential logic over a [`ContactStore`] unit of work.
//! Backends run it to completion inside a single transaction so that
//! concurrent resolutions for overlapping identities fully serialize.

use std::collections::{HashSet, VecDeque};

use crate::{
  contact::{Contact, LinkPrecedence, ResolvedCluster},
  query::IdentifyQuery,
  store::ContactStore,
};

/// Resolve `query` against the store.
///
/// Discovers the connected component of fragments reachable from the query,
/// enforces a single oldest primary, persists the query as a new secondary
/// when it carries unseen information, and returns the merged view.
pub fn resolve<S: ContactStore>(
  store: &mut S,
  query: &IdentifyQuery,
) -> Result<ResolvedCluster, S::Error> {
  let seeds = store.find_by_email_or_phone(query.email(), query.phone_number())?;
  let component = connected_component(store, seeds)?;

  let Some(primary) = select_primary(&component).cloned() else {
    // Nothing shares an attribute with the query: bootstrap a new identity.
    let primary = store.insert_primary(query.email(), query.phone_number())?;
    return Ok(ResolvedCluster::from_members(
      primary.id,
      std::slice::from_ref(&primary),
    ));
  };

  for member in &component {
    if member.id == primary.id {
      continue;
    }
    let already_linked = member.link_precedence == LinkPrecedence::Secondary
      && member.linked_id == Some(primary.id);
    if !already_linked {
      store.demote(member.id, primary.id)?;
    }
  }

  if !component.iter().any(|c| c.satisfies(query)) {
    store.insert_secondary(query.email(), query.phone_number(), primary.id)?;
  }

  let cluster = store.fetch_cluster(primary.id)?;
  Ok(ResolvedCluster::from_members(primary.id, &cluster))
}

/// Expand the seed set to the full connected component.
///
/// A fragment found by email may share its phone with fragments the seed
/// query never saw, so each newly visited fragment is re-queried on its own
/// attributes until no new ids appear. The visited-id set bounds the walk.
fn connected_component<S: ContactStore>(
  store: &mut S,
  seeds: Vec<Contact>,
) -> Result<Vec<Contact>, S::Error> {
  let mut visited: HashSet<i64> = HashSet::new();
  let mut queue: VecDeque<Contact> = seeds.into();
  let mut component = Vec::new();

  while let Some(current) = queue.pop_front() {
    if !visited.insert(current.id) {
      continue;
    }
    let adjacent = store.find_by_email_or_phone(
      current.email.as_deref(),
      current.phone_number.as_deref(),
    )?;
    for contact in adjacent {
      if !visited.contains(&contact.id) {
        queue.push_back(contact);
      }
    }
    component.push(current);
  }

  Ok(component)
}

/// The oldest member wins; equal timestamps break toward the lowest id so
/// selection is deterministic.
fn select_primary(component: &[Contact]) -> Option<&Contact> {
  component.iter().min_by_key(|c| (c.created_at, c.id))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use chrono::{DateTime, Duration, TimeZone, Utc};

  use super::*;
  use crate::Error;

  /// In-memory [`ContactStore`] used to exercise the engine without SQL.
  /// Each insert ticks a fake clock so `created_at` values are distinct
  /// unless a test pins them explicitly.
  struct MemStore {
    rows:      Vec<Contact>,
    now:       DateTime<Utc>,
    demotions: usize,
  }

  impl MemStore {
    fn new() -> Self {
      Self {
        rows:      Vec::new(),
        now:       Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        demotions: 0,
      }
    }

    fn tick(&mut self) -> DateTime<Utc> {
      self.now += Duration::seconds(1);
      self.now
    }

    fn push(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
      precedence: LinkPrecedence,
      linked_id: Option<i64>,
    ) -> i64 {
      let at = self.tick();
      self.push_at(email, phone, precedence, linked_id, at)
    }

    fn push_at(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
      precedence: LinkPrecedence,
      linked_id: Option<i64>,
      at: DateTime<Utc>,
    ) -> i64 {
      let id = self.rows.len() as i64 + 1;
      self.rows.push(Contact {
        id,
        email: email.map(str::to_owned),
        phone_number: phone.map(str::to_owned),
        link_precedence: precedence,
        linked_id,
        created_at: at,
        updated_at: at,
        deleted_at: None,
      });
      id
    }

    fn row(&self, id: i64) -> &Contact {
      self.rows.iter().find(|c| c.id == id).unwrap()
    }
  }

  impl ContactStore for MemStore {
    type Error = Infallible;

    fn find_by_email_or_phone(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
    ) -> Result<Vec<Contact>, Infallible> {
      Ok(
        self
          .rows
          .iter()
          .filter(|c| c.deleted_at.is_none())
          .filter(|c| {
            (email.is_some() && c.email.as_deref() == email)
              || (phone.is_some() && c.phone_number.as_deref() == phone)
          })
          .cloned()
          .collect(),
      )
    }

    fn insert_primary(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
    ) -> Result<Contact, Infallible> {
      let id = self.push(email, phone, LinkPrecedence::Primary, None);
      Ok(self.row(id).clone())
    }

    fn insert_secondary(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
      primary_id: i64,
    ) -> Result<Contact, Infallible> {
      let id = self.push(email, phone, LinkPrecedence::Secondary, Some(primary_id));
      Ok(self.row(id).clone())
    }

    fn demote(&mut self, id: i64, primary_id: i64) -> Result<(), Infallible> {
      let at = self.tick();
      let row = self.rows.iter_mut().find(|c| c.id == id).unwrap();
      row.link_precedence = LinkPrecedence::Secondary;
      row.linked_id = Some(primary_id);
      row.updated_at = at;
      self.demotions += 1;
      Ok(())
    }

    fn fetch_cluster(&mut self, primary_id: i64) -> Result<Vec<Contact>, Infallible> {
      Ok(
        self
          .rows
          .iter()
          .filter(|c| c.deleted_at.is_none())
          .filter(|c| c.id == primary_id || c.linked_id == Some(primary_id))
          .cloned()
          .collect(),
      )
    }
  }

  fn query(email: Option<&str>, phone: Option<&str>) -> IdentifyQuery {
    IdentifyQuery::new(email.map(str::to_owned), phone.map(str::to_owned)).unwrap()
  }

  #[test]
  fn empty_query_is_rejected_before_any_store_access() {
    let err = IdentifyQuery::new(None, None).unwrap_err();
    assert!(matches!(err, Error::MissingIdentifier));
  }

  #[test]
  fn bootstrap_creates_primary_for_unknown_identity() {
    let mut store = MemStore::new();

    let view = resolve(&mut store, &query(Some("a@x.com"), None)).unwrap();

    assert_eq!(store.rows.len(), 1);
    let created = &store.rows[0];
    assert!(created.is_primary());
    assert_eq!(view.primary_contact_id, created.id);
    assert_eq!(view.emails, vec!["a@x.com"]);
    assert!(view.phone_numbers.is_empty());
    assert!(view.secondary_contact_ids.is_empty());
  }

  #[test]
  fn exact_resubmission_is_idempotent() {
    let mut store = MemStore::new();

    let first = resolve(&mut store, &query(Some("a@x.com"), Some("111"))).unwrap();
    let second = resolve(&mut store, &query(Some("a@x.com"), Some("111"))).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.rows.len(), 1);
    assert_eq!(store.demotions, 0);
  }

  #[test]
  fn new_attribute_links_a_secondary_to_the_known_primary() {
    let mut store = MemStore::new();
    let primary = store.push(Some("a@x.com"), Some("111"), LinkPrecedence::Primary, None);

    let view = resolve(&mut store, &query(Some("a@x.com"), Some("222"))).unwrap();

    assert_eq!(view.primary_contact_id, primary);
    assert_eq!(view.phone_numbers, vec!["111", "222"]);
    assert_eq!(store.rows.len(), 2);

    let secondary = store.row(store.rows[1].id);
    assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(secondary.linked_id, Some(primary));
    assert_eq!(view.secondary_contact_ids, vec![secondary.id]);
  }

  #[test]
  fn absent_query_field_matches_any_fragment() {
    let mut store = MemStore::new();
    store.push(Some("a@x.com"), Some("111"), LinkPrecedence::Primary, None);

    // Email-only query against a fragment that also has a phone: the
    // fragment already covers everything the query supplies.
    resolve(&mut store, &query(Some("a@x.com"), None)).unwrap();

    assert_eq!(store.rows.len(), 1);
  }

  #[test]
  fn walk_spans_transitively_shared_attributes() {
    let mut store = MemStore::new();
    let a = store.push(Some("e1"), Some("p1"), LinkPrecedence::Primary, None);
    let b = store.push(Some("e2"), Some("p1"), LinkPrecedence::Primary, None);
    let c = store.push(Some("e2"), Some("p3"), LinkPrecedence::Primary, None);

    // The query only matches A directly; B is reachable through the shared
    // phone and C through B's shared email.
    let view = resolve(&mut store, &query(Some("e1"), None)).unwrap();

    assert_eq!(view.primary_contact_id, a);
    assert_eq!(view.secondary_contact_ids, vec![b, c]);
    assert_eq!(view.emails, vec!["e1", "e2"]);
    assert_eq!(view.phone_numbers, vec!["p1", "p3"]);

    assert_eq!(store.row(b).linked_id, Some(a));
    assert_eq!(store.row(c).linked_id, Some(a));
    assert_eq!(store.rows.len(), 3);
  }

  #[test]
  fn oldest_primary_wins_and_stale_secondaries_are_repointed() {
    let mut store = MemStore::new();
    let p1 = store.push(Some("e1"), Some("p1"), LinkPrecedence::Primary, None);
    let p2 = store.push(Some("e2"), Some("p2"), LinkPrecedence::Primary, None);
    let s2 = store.push(Some("e3"), Some("p2"), LinkPrecedence::Secondary, Some(p2));

    // Shares the email of P1's cluster and the phone of P2's cluster.
    let view = resolve(&mut store, &query(Some("e1"), Some("p2"))).unwrap();

    assert_eq!(view.primary_contact_id, p1);
    assert_eq!(store.row(p2).link_precedence, LinkPrecedence::Secondary);
    assert_eq!(store.row(p2).linked_id, Some(p1));
    assert_eq!(store.row(s2).linked_id, Some(p1));

    // No existing member carried (e1, p2) together, so the query itself
    // was persisted as a new secondary.
    assert_eq!(store.rows.len(), 4);
    let inserted = &store.rows[3];
    assert_eq!(inserted.linked_id, Some(p1));
    assert!(view.secondary_contact_ids.contains(&inserted.id));

    // Cluster purity: exactly one primary, everyone else linked to it.
    let primaries: Vec<_> = store.rows.iter().filter(|c| c.is_primary()).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, p1);
    assert!(
      store
        .rows
        .iter()
        .filter(|c| !c.is_primary())
        .all(|c| c.linked_id == Some(p1))
    );
  }

  #[test]
  fn merged_cluster_resubmission_performs_no_further_mutation() {
    let mut store = MemStore::new();
    store.push(Some("e1"), Some("p1"), LinkPrecedence::Primary, None);
    store.push(Some("e2"), Some("p2"), LinkPrecedence::Primary, None);

    resolve(&mut store, &query(Some("e1"), Some("p2"))).unwrap();
    let rows = store.rows.len();
    let demotions = store.demotions;

    let view = resolve(&mut store, &query(Some("e1"), Some("p2"))).unwrap();

    assert_eq!(store.rows.len(), rows);
    assert_eq!(store.demotions, demotions);
    assert_eq!(view.primary_contact_id, 1);
  }

  #[test]
  fn equal_created_at_breaks_toward_lowest_id() {
    let mut store = MemStore::new();
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let x = store.push_at(Some("e1"), Some("p1"), LinkPrecedence::Primary, None, at);
    let y = store.push_at(Some("e2"), Some("p2"), LinkPrecedence::Primary, None, at);

    let view = resolve(&mut store, &query(Some("e1"), Some("p2"))).unwrap();

    assert_eq!(view.primary_contact_id, x);
    assert_eq!(store.row(y).linked_id, Some(x));
  }
}
