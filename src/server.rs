//! HTTP surface over the engine.
//!
//! Two routes are enough to drive every contract end-to-end: `POST
//! /v1/search` materializes a saved query for a search request and returns
//! its `q` handle plus the resolved ids, and `GET /v1/step` moves a cursor
//! one place through the results referenced by `q`. Composed queries fall
//! through outer boundaries transparently; plain queries report the
//! boundary as a notice. The engine is synchronous, so handlers run it on
//! the blocking pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::Query as UrlParams;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::cursor::{Query, Step};
use crate::error::{RequeryError, Result};
use crate::nested::Nested;
use crate::params::{self, QueryParams};
use crate::resolve::MemoryDataset;
use crate::spec::{EntityId, EntityType, ParamValue, QuerySpec, Variant};
use crate::store::QueryRecordStore;

/// Everything a handler needs: the shared record store and the backing
/// dataset serving as resolver and entity loader.
pub struct EngineContext {
    pub store: QueryRecordStore,
    pub dataset: MemoryDataset,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub entity: String,
    pub variant: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<EntityId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct StepRequest {
    pub entity: String,
    pub dir: String,
    pub id: String,
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct StepResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct SearchOutcome {
    q: String,
    ids: Vec<EntityId>,
    reused: bool,
}

struct StepOutcome {
    step: Step,
    id: EntityId,
    q: Option<String>,
    label: Option<String>,
}

fn run_search(context: &EngineContext, request: &SearchRequest) -> Result<SearchOutcome> {
    let spec = QuerySpec::from_parts(&request.entity, &request.variant, &request.params)?;
    let (record, reused) = context.store.find_or_create(&spec)?;
    let mut query = Query::new(&context.dataset, record);
    let ids = query.results()?.to_vec();
    let q = params::to_params(&query)
        .q
        .ok_or_else(|| RequeryError::Invariant("saved query produced no handle".to_string()))?;
    Ok(SearchOutcome { q, ids, reused })
}

fn run_step(context: &EngineContext, request: &StepRequest) -> Result<StepOutcome> {
    let entity: EntityType = request.entity.parse()?;
    let fallback = QuerySpec::new(entity, Variant::All)?;
    let link = QueryParams {
        q: request.q.clone(),
    };
    let mut query = params::query_or_default(&context.store, &context.dataset, &link, &fallback)?;
    let id = params::parse_entity_id(&request.id)?;
    query.set_current(id);

    // A composed spec steps through the outer/inner pair; everything else
    // steps through its own results. An outer record that has been swept
    // leaves the inner query stepping alone.
    let outer = query
        .spec()
        .outer_record()
        .and_then(|outer_id| context.store.load(outer_id).ok())
        .map(|record| Query::new(&context.dataset, record));

    let (step, query) = match outer {
        Some(outer) => {
            let mut nested = Nested::new(&context.store, &context.dataset, outer, query)?;
            let step = match request.dir.as_str() {
                "prev" => nested.prev()?,
                _ => nested.next()?,
            };
            (step, nested.into_inner())
        }
        None => {
            let step = match request.dir.as_str() {
                "prev" => query.prev()?,
                _ => query.next()?,
            };
            (step, query)
        }
    };

    let label = query
        .current_entity(&context.dataset)
        .map(|card| card.label);
    Ok(StepOutcome {
        step,
        id: step.moved().unwrap_or(id),
        q: params::to_params(&query).q,
        label,
    })
}

fn error_status(e: &RequeryError) -> StatusCode {
    match e {
        RequeryError::Parse { .. }
        | RequeryError::UnsupportedVariant { .. }
        | RequeryError::InvalidEncoding(_) => StatusCode::BAD_REQUEST,
        RequeryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(context: Arc<EngineContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    let search_context = Arc::clone(&context);
    let step_context = context;
    Router::new()
        .route(
            "/v1/search",
            post(move |Json(request): Json<SearchRequest>| {
                let context = Arc::clone(&search_context);
                async move {
                    let outcome =
                        tokio::task::spawn_blocking(move || run_search(&context, &request))
                            .await
                            .map_err(|e| {
                                warn!(error = %e, "join error");
                                (StatusCode::INTERNAL_SERVER_ERROR, "join error")
                            })?;
                    match outcome {
                        Ok(found) => {
                            info!(q = %found.q, count = found.ids.len(), reused = found.reused, "search complete");
                            let body = SearchResponse {
                                status: "ok".into(),
                                q: Some(found.q),
                                count: Some(found.ids.len()),
                                ids: Some(found.ids),
                                reused: Some(found.reused),
                                error: None,
                            };
                            Ok::<_, (StatusCode, &'static str)>((StatusCode::OK, Json(body)))
                        }
                        Err(e) => {
                            let status = error_status(&e);
                            warn!(error = %e, code = %status.as_u16(), "search error");
                            let body = SearchResponse {
                                status: "error".into(),
                                q: None,
                                ids: None,
                                count: None,
                                reused: None,
                                error: Some(e.to_string()),
                            };
                            Ok::<_, (StatusCode, &'static str)>((status, Json(body)))
                        }
                    }
                }
            }),
        )
        .route(
            "/v1/step",
            get(move |UrlParams(request): UrlParams<StepRequest>| {
                let context = Arc::clone(&step_context);
                async move {
                    let outcome = tokio::task::spawn_blocking(move || run_step(&context, &request))
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "join error");
                            (StatusCode::INTERNAL_SERVER_ERROR, "join error")
                        })?;
                    match outcome {
                        Ok(stepped) => {
                            info!(id = stepped.id, moved = stepped.step.moved().is_some(), "step complete");
                            let body = StepResponse {
                                status: "ok".into(),
                                id: Some(stepped.id),
                                q: stepped.q,
                                label: stepped.label,
                                notice: stepped.step.notice().map(str::to_string),
                                error: None,
                            };
                            Ok::<_, (StatusCode, &'static str)>((StatusCode::OK, Json(body)))
                        }
                        Err(e) => {
                            let status = error_status(&e);
                            warn!(error = %e, code = %status.as_u16(), "step error");
                            let body = StepResponse {
                                status: "error".into(),
                                id: None,
                                q: None,
                                label: None,
                                notice: None,
                                error: Some(e.to_string()),
                            };
                            Ok::<_, (StatusCode, &'static str)>((status, Json(body)))
                        }
                    }
                }
            }),
        )
        .layer(cors)
}
