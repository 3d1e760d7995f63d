//! Composed queries: an inner query scoped to one element of an outer one.
//!
//! Paging through the images of a series of observations pairs two
//! queries: the outer lists observations, the inner lists the images of a
//! single observation. The inner query's scope is frozen to whatever the
//! outer's current element was when the inner was created -- moving the
//! outer cursor later never retroactively changes an already-built inner
//! query. Crossing an inner boundary instead derives a *fresh* inner query
//! for the next outer element, skipping elements whose scope is empty.

use tracing::debug;

use crate::cursor::{Query, Step};
use crate::error::{RequeryError, Result};
use crate::resolve::ResultResolver;
use crate::spec::EntityId;
use crate::store::QueryRecordStore;

enum Direction {
    Forward,
    Backward,
}

/// An outer/inner query pair with the outer element snapshotted at inner
/// construction time.
pub struct Nested<'r> {
    store: &'r QueryRecordStore,
    resolver: &'r dyn ResultResolver,
    outer: Query<'r>,
    inner: Query<'r>,
    outer_element: EntityId,
}

impl std::fmt::Debug for Nested<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nested")
            .field("outer_element", &self.outer_element)
            .finish_non_exhaustive()
    }
}

impl<'r> Nested<'r> {
    /// Pair an inner query with its outer query. The inner spec must be a
    /// composable variant and must reference the given outer's record.
    pub fn new(
        store: &'r QueryRecordStore,
        resolver: &'r dyn ResultResolver,
        outer: Query<'r>,
        inner: Query<'r>,
    ) -> Result<Nested<'r>> {
        let element = inner.spec().parent_element().ok_or_else(|| {
            RequeryError::UnsupportedVariant {
                entity: inner.spec().entity().to_string(),
                variant: inner.spec().variant().kind().to_string(),
            }
        })?;
        match inner.spec().outer_record() {
            Some(outer_id) if outer_id == outer.record().id() => {}
            _ => {
                return Err(RequeryError::Invariant(format!(
                    "inner query record {} is not scoped under outer record {}",
                    inner.record().id(),
                    outer.record().id()
                )));
            }
        }
        Ok(Nested {
            store,
            resolver,
            outer,
            inner,
            outer_element: element,
        })
    }

    /// Rebuild the pair from the inner query alone, loading the outer
    /// record it references. This is how a composed cursor comes back from
    /// request parameters.
    pub fn from_inner(
        store: &'r QueryRecordStore,
        resolver: &'r dyn ResultResolver,
        inner: Query<'r>,
    ) -> Result<Nested<'r>> {
        let outer_id = inner
            .spec()
            .outer_record()
            .ok_or_else(|| RequeryError::UnsupportedVariant {
                entity: inner.spec().entity().to_string(),
                variant: inner.spec().variant().kind().to_string(),
            })?;
        let record = store.load(outer_id)?;
        let outer = Query::new(resolver, record);
        Nested::new(store, resolver, outer, inner)
    }

    pub fn inner(&self) -> &Query<'r> {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Query<'r> {
        &mut self.inner
    }

    pub fn outer(&self) -> &Query<'r> {
        &self.outer
    }

    pub fn into_inner(self) -> Query<'r> {
        self.inner
    }

    /// Forward movement with fallthrough across outer boundaries.
    pub fn next(&mut self) -> Result<Step> {
        match self.inner.next()? {
            Step::NoMore => self.fall(Direction::Forward),
            step => Ok(step),
        }
    }

    /// Backward movement with fallthrough across outer boundaries.
    pub fn prev(&mut self) -> Result<Step> {
        match self.inner.prev()? {
            Step::NoMore => self.fall(Direction::Backward),
            step => Ok(step),
        }
    }

    /// Walk the outer query from the snapshotted element until a non-empty
    /// inner scope turns up, then land on its first (forward) or last
    /// (backward) element. The outer's results are finite, so this
    /// terminates; an exhausted outer propagates `NoMore`, and an outer
    /// element that is not in the outer's results at all propagates
    /// `NotFoundInResults`.
    fn fall(&mut self, direction: Direction) -> Result<Step> {
        self.outer.set_current(self.outer_element);
        loop {
            let step = match direction {
                Direction::Forward => self.outer.next()?,
                Direction::Backward => self.outer.prev()?,
            };
            let element = match step {
                Step::Moved(element) => element,
                Step::NoMore => return Ok(Step::NoMore),
                Step::NotFoundInResults => return Ok(Step::NotFoundInResults),
            };
            let spec = self.inner.spec().rebind_parent(element)?;
            let (record, _) = self.store.find_or_create(&spec)?;
            let mut inner = Query::new(self.resolver, record);
            let landed = match direction {
                Direction::Forward => inner.first()?,
                Direction::Backward => inner.last()?,
            };
            if let Step::Moved(id) = landed {
                debug!(element, id, "fell through to a new inner scope");
                self.inner = inner;
                self.outer_element = element;
                return Ok(Step::Moved(id));
            }
            // Empty scope: keep walking the outer results.
        }
    }
}
