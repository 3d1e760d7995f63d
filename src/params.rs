//! Reconstruction of queries from request parameters.
//!
//! A link carries everything needed to get the same query back on the next
//! request: the record identity, encoded through [`crate::codec`], in the
//! single `q` parameter. The cursor position is never encoded -- the target
//! entity travels as the ordinary `id` parameter and is re-applied with
//! [`crate::cursor::Query::set_current`] by the handler.
//!
//! An absent, malformed or dangling `q` is not a hard failure: callers fall
//! back to a default query for the page via [`query_or_default`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec;
use crate::cursor::Query;
use crate::error::{RequeryError, Result};
use crate::resolve::ResultResolver;
use crate::spec::{EntityId, QuerySpec};
use crate::store::{QueryRecord, QueryRecordStore};

/// The saved-query reference carried by links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

/// The minimal parameter set that reconstructs `query` on a later request.
pub fn to_params(query: &Query) -> QueryParams {
    QueryParams {
        q: Some(codec::encode(query.record().id())),
    }
}

/// Load the record referenced by `params.q`. Absence, malformed encodings
/// and dangling identities all come back as `NotFound` so callers treat
/// every one of them as "no saved query".
pub fn record_from_params(
    store: &QueryRecordStore,
    params: &QueryParams,
) -> Result<Arc<QueryRecord>> {
    let q = params
        .q
        .as_deref()
        .ok_or_else(|| RequeryError::NotFound("no saved query in params".to_string()))?;
    let id = codec::decode(q)
        .map_err(|_| RequeryError::NotFound(format!("malformed query parameter '{q}'")))?;
    store.load(id)
}

/// Reconstruct the saved query, or fall back to a default spec for the
/// current page when there is none to reconstruct.
pub fn query_or_default<'r>(
    store: &'r QueryRecordStore,
    resolver: &'r dyn ResultResolver,
    params: &QueryParams,
    fallback: &QuerySpec,
) -> Result<Query<'r>> {
    match record_from_params(store, params) {
        Ok(record) => Ok(Query::new(resolver, record)),
        Err(RequeryError::NotFound(_)) => {
            let (record, _) = store.find_or_create(fallback)?;
            Ok(Query::new(resolver, record))
        }
        Err(e) => Err(e),
    }
}

lazy_static! {
    static ref ID_PARAM: Regex = Regex::new(r"^[1-9]\d*$").unwrap();
}

/// Validate and parse the `id` cursor parameter.
pub fn parse_entity_id(raw: &str) -> Result<EntityId> {
    if !ID_PARAM.is_match(raw) {
        return Err(RequeryError::InvalidEncoding(format!(
            "'{raw}' is not an entity id"
        )));
    }
    raw.parse()
        .map_err(|_| RequeryError::InvalidEncoding(format!("entity id '{raw}' overflows")))
}
