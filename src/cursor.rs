//! Runtime query handles and cursor movement.
//!
//! A [`Query`] wraps one shared [`QueryRecord`] for the duration of a
//! request. Its result ids are resolved at most once per instance and
//! cached for the instance's lifetime; the order the resolver returned is
//! authoritative and is never re-sorted. The only mutable state besides
//! the cache is the cursor, `current_id`, moved by the sequence operators.
//!
//! The sequence operators return a [`Step`] instead of signalling through
//! nil returns: either the cursor moved, or it sat at a boundary
//! (`NoMore`), or the current id was not a member of the results at all
//! (`NotFoundInResults`, the stale-link case). In the two non-moving
//! outcomes `current_id` is left untouched so the caller can keep showing
//! the same record alongside the notice.

use std::sync::Arc;

use crate::error::Result;
use crate::resolve::{EntityCard, EntityLoader, ResultResolver};
use crate::spec::{EntityId, QuerySpec};
use crate::store::QueryRecord;

/// Outcome of one cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The cursor moved to this id.
    Moved(EntityId),
    /// The cursor sat at the boundary; it has not moved.
    NoMore,
    /// The current id is not in the results; the cursor has not moved.
    NotFoundInResults,
}

impl Step {
    pub fn moved(self) -> Option<EntityId> {
        match self {
            Step::Moved(id) => Some(id),
            _ => None,
        }
    }

    /// The user-facing notice for a non-moving outcome.
    pub fn notice(self) -> Option<&'static str> {
        match self {
            Step::Moved(_) => None,
            Step::NoMore => Some("No more results."),
            Step::NotFoundInResults => {
                Some("Can't find that in the results. Please go back to the index and try again.")
            }
        }
    }
}

/// A per-request handle over one query record.
pub struct Query<'r> {
    resolver: &'r dyn ResultResolver,
    record: Arc<QueryRecord>,
    result_ids: Option<Vec<EntityId>>,
    current_id: Option<EntityId>,
    saved_current_id: Option<EntityId>,
}

impl<'r> Query<'r> {
    pub fn new(resolver: &'r dyn ResultResolver, record: Arc<QueryRecord>) -> Query<'r> {
        Query {
            resolver,
            record,
            result_ids: None,
            current_id: None,
            saved_current_id: None,
        }
    }

    pub fn record(&self) -> &Arc<QueryRecord> {
        &self.record
    }

    pub fn spec(&self) -> &QuerySpec {
        self.record.spec()
    }

    fn ensure_resolved(&mut self) -> Result<()> {
        if self.result_ids.is_none() {
            self.result_ids = Some(self.resolver.resolve(self.record.spec())?);
        }
        Ok(())
    }

    fn cached(&self) -> &[EntityId] {
        self.result_ids.as_deref().unwrap_or(&[])
    }

    /// The ordered result ids, resolved on first call and cached for the
    /// life of this handle.
    pub fn results(&mut self) -> Result<&[EntityId]> {
        self.ensure_resolved()?;
        Ok(self.cached())
    }

    pub fn num_results(&mut self) -> Result<usize> {
        Ok(self.results()?.len())
    }

    pub fn contains(&mut self, id: EntityId) -> Result<bool> {
        Ok(self.results()?.contains(&id))
    }

    pub fn index_of(&mut self, id: EntityId) -> Result<Option<usize>> {
        Ok(self.results()?.iter().position(|&other| other == id))
    }

    /// Place the cursor, whether or not the id is in the results. The id
    /// is also remembered for [`Query::reset`].
    pub fn set_current(&mut self, id: EntityId) {
        self.current_id = Some(id);
        self.saved_current_id = Some(id);
    }

    pub fn current_id(&self) -> Option<EntityId> {
        self.current_id
    }

    /// Move the cursor back to where the last `set_current` put it.
    pub fn reset(&mut self) {
        self.current_id = self.saved_current_id;
    }

    /// Dereference the current id for display. Unset cursors and deleted
    /// entities both come back as `None`; display is the only casualty.
    pub fn current_entity(&self, loader: &dyn EntityLoader) -> Option<EntityCard> {
        let id = self.current_id?;
        loader.load_entity(self.record.spec().entity(), id)
    }

    pub fn next(&mut self) -> Result<Step> {
        self.ensure_resolved()?;
        let ids = self.cached();
        let Some(current) = self.current_id else {
            return Ok(Step::NotFoundInResults);
        };
        let Some(index) = ids.iter().position(|&id| id == current) else {
            return Ok(Step::NotFoundInResults);
        };
        if index + 1 < ids.len() {
            let id = ids[index + 1];
            self.current_id = Some(id);
            Ok(Step::Moved(id))
        } else {
            Ok(Step::NoMore)
        }
    }

    pub fn prev(&mut self) -> Result<Step> {
        self.ensure_resolved()?;
        let ids = self.cached();
        let Some(current) = self.current_id else {
            return Ok(Step::NotFoundInResults);
        };
        let Some(index) = ids.iter().position(|&id| id == current) else {
            return Ok(Step::NotFoundInResults);
        };
        if index > 0 {
            let id = ids[index - 1];
            self.current_id = Some(id);
            Ok(Step::Moved(id))
        } else {
            Ok(Step::NoMore)
        }
    }

    /// Move to the first result; `NoMore` when there are no results.
    pub fn first(&mut self) -> Result<Step> {
        self.ensure_resolved()?;
        match self.cached().first().copied() {
            Some(id) => {
                self.current_id = Some(id);
                Ok(Step::Moved(id))
            }
            None => Ok(Step::NoMore),
        }
    }

    /// Move to the last result; `NoMore` when there are no results.
    pub fn last(&mut self) -> Result<Step> {
        self.ensure_resolved()?;
        match self.cached().last().copied() {
            Some(id) => {
                self.current_id = Some(id);
                Ok(Step::Moved(id))
            }
            None => Ok(Step::NoMore),
        }
    }
}
