//! Requery – a saved-query / result-cursor engine.
//!
//! Requery is the machinery behind "index", "next/prev" and "advanced
//! search" pages: it turns an abstract search description into a persisted,
//! shareable handle, resolves that handle to an ordered list of entity
//! ids, and moves a cursor through the list -- including composed
//! traversals where an inner result set is scoped to the current element
//! of an outer one (paging through the images of a series of
//! observations).
//!
//! The moving parts:
//! * A [`spec::QuerySpec`] describes one search: an entity type, a search
//!   variant with a fixed parameter schema, and a canonical [`spec::Signature`].
//! * The [`store::QueryRecordStore`] is content-addressed: `find_or_create`
//!   persists exactly one [`store::QueryRecord`] per distinct signature and
//!   hands out shared references, so repeating a search never creates a
//!   second record.
//! * A [`cursor::Query`] wraps a record at runtime, resolves its ids once
//!   through a [`resolve::ResultResolver`], caches them, and moves its
//!   cursor with `next`/`prev`/`first`/`last`, reporting boundaries and
//!   stale ids as [`cursor::Step`] outcomes instead of errors.
//! * A [`nested::Nested`] pair freezes an inner query to one outer element
//!   and falls through outer boundaries, skipping empty scopes.
//! * [`params`] and [`codec`] shrink all of this to a single URL parameter
//!   and rebuild it on the next request, falling back to a default query
//!   when the reference has gone stale.
//!
//! ## Modules
//! * [`spec`] – search specifications, parameter canonicalization, signatures.
//! * [`pattern`] – the google-like search-pattern grammar (pest).
//! * [`store`] – SQLite-backed content-addressed record store.
//! * [`resolve`] – resolver/loader contracts and an in-memory reference dataset.
//! * [`cursor`] – runtime query handles and cursor movement.
//! * [`nested`] – composed (outer/inner) traversal.
//! * [`params`] – URL parameter round trip.
//! * [`codec`] – base-62 record-identity codec.
//! * [`server`] – a small axum surface for driving the engine.
//! * [`error`] – the crate error type.
//!
//! ## Quick Start
//! ```
//! use requery::cursor::{Query, Step};
//! use requery::resolve::MemoryDataset;
//! use requery::spec::{EntityType, QuerySpec, Variant};
//! use requery::store::{PersistenceMode, QueryRecordStore};
//!
//! let store = QueryRecordStore::new(PersistenceMode::InMemory).unwrap();
//! let mut data = MemoryDataset::new();
//! let alice = data.add_user("alice");
//! let cap = data.add_image(alice, "cap detail");
//! let gills = data.add_image(alice, "gill detail");
//!
//! let spec = QuerySpec::new(EntityType::Image, Variant::ByUser { user: alice }).unwrap();
//! let (record, reused) = store.find_or_create(&spec).unwrap();
//! assert!(!reused);
//!
//! let mut query = Query::new(&data, record);
//! assert_eq!(query.results().unwrap(), &[cap, gills]);
//! query.set_current(cap);
//! assert_eq!(query.next().unwrap(), Step::Moved(gills));
//! assert_eq!(query.next().unwrap(), Step::NoMore);
//! ```
//!
//! ## Snapshots, not live views
//! Result lists are resolved once per [`cursor::Query`] instance and then
//! never change, even if the backing data does. Across requests a new
//! instance re-resolves; within one composed traversal the inner snapshot
//! is frozen by construction. Staleness between the two is an accepted
//! trade: cursor movement needs a stable order more than it needs
//! freshness.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod nested;
pub mod params;
pub mod pattern;
pub mod resolve;
pub mod server;
pub mod spec;
pub mod store;
