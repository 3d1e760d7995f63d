//! Search specifications and their canonical signatures.
//!
//! A [`QuerySpec`] is the immutable description of one search: which kind
//! of entity is being listed ([`EntityType`]), which kind of search it is
//! ([`Variant`]), and the parameters that search needs. Each variant
//! carries a fixed parameter schema, validated at construction, so a spec
//! that exists is always well-formed.
//!
//! Two specs that mean the same search must serialize identically: the
//! parameter map is sorted, list-typed values are normalized (a scalar
//! stands for a one-element list), pattern text is re-rendered in canonical
//! form, and the whole rendering is digested with blake3 to form the
//! [`Signature`] used as the deduplication key by the record store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RequeryError, Result};
use crate::pattern::PatternExpr;

/// Opaque identity of a domain entity (observation, image, ...).
pub type EntityId = u64;
/// Store-assigned identity of a persisted query record.
pub type RecordId = u64;

// ------------- EntityType -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    Observation,
    Image,
    Name,
    Location,
    Comment,
    User,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Observation,
        EntityType::Image,
        EntityType::Name,
        EntityType::Location,
        EntityType::Comment,
        EntityType::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Observation => "observation",
            EntityType::Image => "image",
            EntityType::Name => "name",
            EntityType::Location => "location",
            EntityType::Comment => "comment",
            EntityType::User => "user",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = RequeryError;
    fn from_str(s: &str) -> Result<Self> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| RequeryError::Parse {
                message: format!("unknown entity type '{s}'"),
            })
    }
}

// ------------- Variant -------------

/// The search kinds, without their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    All,
    ByUser,
    AtLocation,
    PatternSearch,
    AdvancedSearch,
    InSet,
    InsideObservation,
}

impl VariantKind {
    const ALL: [VariantKind; 7] = [
        VariantKind::All,
        VariantKind::ByUser,
        VariantKind::AtLocation,
        VariantKind::PatternSearch,
        VariantKind::AdvancedSearch,
        VariantKind::InSet,
        VariantKind::InsideObservation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::All => "all",
            VariantKind::ByUser => "by_user",
            VariantKind::AtLocation => "at_location",
            VariantKind::PatternSearch => "pattern_search",
            VariantKind::AdvancedSearch => "advanced_search",
            VariantKind::InSet => "in_set",
            VariantKind::InsideObservation => "inside_observation",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VariantKind {
    type Err = RequeryError;
    fn from_str(s: &str) -> Result<Self> {
        VariantKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| RequeryError::Parse {
                message: format!("unknown search variant '{s}'"),
            })
    }
}

/// A search kind together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// Every entity of the type, in its default order.
    All,
    /// Entities created by one user.
    ByUser { user: EntityId },
    /// Observations recorded at one location.
    AtLocation { location: EntityId },
    /// Entities whose searchable text matches a pattern.
    PatternSearch { pattern: PatternExpr },
    /// Per-dimension patterns, intersected.
    AdvancedSearch {
        name: Option<String>,
        location: Option<String>,
        user: Option<String>,
        content: Option<String>,
    },
    /// A fixed id list; the given order is the result order.
    InSet { ids: Vec<EntityId> },
    /// Images attached to one observation, scoped under an outer
    /// observation query for composed traversal.
    InsideObservation {
        observation: EntityId,
        outer: RecordId,
    },
}

impl Variant {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::All => VariantKind::All,
            Variant::ByUser { .. } => VariantKind::ByUser,
            Variant::AtLocation { .. } => VariantKind::AtLocation,
            Variant::PatternSearch { .. } => VariantKind::PatternSearch,
            Variant::AdvancedSearch { .. } => VariantKind::AdvancedSearch,
            Variant::InSet { .. } => VariantKind::InSet,
            Variant::InsideObservation { .. } => VariantKind::InsideObservation,
        }
    }
}

/// Which searches are registered for which entity type.
fn registered(entity: EntityType, kind: VariantKind) -> bool {
    use EntityType::*;
    use VariantKind::*;
    match entity {
        Observation => matches!(
            kind,
            All | ByUser | AtLocation | PatternSearch | AdvancedSearch | InSet
        ),
        Image => matches!(
            kind,
            All | ByUser | PatternSearch | AdvancedSearch | InSet | InsideObservation
        ),
        Name | Location => matches!(kind, All | ByUser | PatternSearch | InSet),
        Comment => matches!(kind, All | ByUser | PatternSearch | InSet),
        User => matches!(kind, All | PatternSearch | InSet),
    }
}

// ------------- ParamValue -------------

/// Loosely-typed parameter value, as found in requests and stored rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// A one-element list collapses to its only member.
    fn into_scalar(self) -> ParamValue {
        match self {
            ParamValue::List(mut items) if items.len() == 1 => items.remove(0),
            other => other,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            ParamValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ParamValue::Int(i) => out.push_str(&i.to_string()),
            ParamValue::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            ParamValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render(out);
                }
                out.push(']');
            }
        }
    }
}

// ------------- Signature -------------

/// Canonical rendering of a spec plus its blake3 digest. Signature
/// equality is spec equality; the digest is the store's lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    canonical: String,
    digest: [u8; 32],
}

impl Signature {
    fn of(canonical: String) -> Self {
        let digest = *blake3::hash(canonical.as_bytes()).as_bytes();
        Self { canonical, digest }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn digest_hex(&self) -> String {
        blake3::Hash::from(self.digest).to_hex().to_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.digest_hex())
    }
}

// ------------- QuerySpec -------------

/// Immutable, validated description of one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    entity: EntityType,
    variant: Variant,
}

impl QuerySpec {
    /// Validate the (entity, variant) combination against the registry and
    /// canonicalize the parameters.
    pub fn new(entity: EntityType, variant: Variant) -> Result<QuerySpec> {
        if !registered(entity, variant.kind()) {
            return Err(RequeryError::UnsupportedVariant {
                entity: entity.to_string(),
                variant: variant.kind().to_string(),
            });
        }
        let variant = match variant {
            Variant::AdvancedSearch {
                name,
                location,
                user,
                content,
            } => Variant::AdvancedSearch {
                name: normalize_opt(name),
                location: normalize_opt(location),
                user: normalize_opt(user),
                content: normalize_opt(content),
            },
            Variant::InSet { ids } => Variant::InSet {
                ids: dedup_preserving_order(ids),
            },
            other => other,
        };
        Ok(QuerySpec { entity, variant })
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// The canonical ordered parameter map for this spec.
    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        let mut map = BTreeMap::new();
        match &self.variant {
            Variant::All => {}
            Variant::ByUser { user } => {
                map.insert("user".to_string(), ParamValue::Int(*user as i64));
            }
            Variant::AtLocation { location } => {
                map.insert("location".to_string(), ParamValue::Int(*location as i64));
            }
            Variant::PatternSearch { pattern } => {
                map.insert("pattern".to_string(), ParamValue::Str(pattern.canonical()));
            }
            Variant::AdvancedSearch {
                name,
                location,
                user,
                content,
            } => {
                for (key, value) in [
                    ("name", name),
                    ("location", location),
                    ("user", user),
                    ("content", content),
                ] {
                    if let Some(text) = value {
                        map.insert(key.to_string(), ParamValue::Str(text.clone()));
                    }
                }
            }
            Variant::InSet { ids } => {
                map.insert(
                    "ids".to_string(),
                    ParamValue::List(ids.iter().map(|&id| ParamValue::Int(id as i64)).collect()),
                );
            }
            Variant::InsideObservation { observation, outer } => {
                map.insert(
                    "observation".to_string(),
                    ParamValue::Int(*observation as i64),
                );
                map.insert("outer".to_string(), ParamValue::Int(*outer as i64));
            }
        }
        map
    }

    /// Deterministic canonical signature: `entity:variant:{sorted params}`
    /// digested with blake3.
    pub fn signature(&self) -> Signature {
        let mut canonical = String::new();
        canonical.push_str(self.entity.as_str());
        canonical.push(':');
        canonical.push_str(self.variant.kind().as_str());
        canonical.push(':');
        canonical.push('{');
        for (i, (key, value)) in self.params().iter().enumerate() {
            if i > 0 {
                canonical.push(',');
            }
            canonical.push_str(key);
            canonical.push('=');
            value.render(&mut canonical);
        }
        canonical.push('}');
        Signature::of(canonical)
    }

    /// Rebuild a spec from loosely-typed parts (an incoming request, a
    /// stored row), validating the parameter schema for the variant.
    pub fn from_parts(
        entity: &str,
        variant: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<QuerySpec> {
        let entity: EntityType = entity.parse()?;
        let kind: VariantKind = variant.parse()?;
        let mut params = params.clone();
        let variant = match kind {
            VariantKind::All => Variant::All,
            VariantKind::ByUser => Variant::ByUser {
                user: take_id(&mut params, "user", entity, kind)?,
            },
            VariantKind::AtLocation => Variant::AtLocation {
                location: take_id(&mut params, "location", entity, kind)?,
            },
            VariantKind::PatternSearch => {
                let raw = take_str(&mut params, "pattern", entity, kind)?;
                Variant::PatternSearch {
                    pattern: PatternExpr::parse(&raw)?,
                }
            }
            VariantKind::AdvancedSearch => Variant::AdvancedSearch {
                name: take_opt_str(&mut params, "name")?,
                location: take_opt_str(&mut params, "location")?,
                user: take_opt_str(&mut params, "user")?,
                content: take_opt_str(&mut params, "content")?,
            },
            VariantKind::InSet => Variant::InSet {
                ids: take_id_list(&mut params, "ids", entity, kind)?,
            },
            VariantKind::InsideObservation => Variant::InsideObservation {
                observation: take_id(&mut params, "observation", entity, kind)?,
                outer: take_id(&mut params, "outer", entity, kind)?,
            },
        };
        if let Some(extra) = params.keys().next() {
            return Err(RequeryError::Parse {
                message: format!("unexpected parameter '{extra}' for {entity} {kind} query"),
            });
        }
        QuerySpec::new(entity, variant)
    }

    /// For composable variants, the same search scoped to a different
    /// parent element. The composed traversal uses this to derive a fresh
    /// inner spec per outer element.
    pub fn rebind_parent(&self, element: EntityId) -> Result<QuerySpec> {
        match &self.variant {
            Variant::InsideObservation { outer, .. } => QuerySpec::new(
                self.entity,
                Variant::InsideObservation {
                    observation: element,
                    outer: *outer,
                },
            ),
            _ => Err(RequeryError::UnsupportedVariant {
                entity: self.entity.to_string(),
                variant: self.variant.kind().to_string(),
            }),
        }
    }

    /// The outer query record this spec is scoped under, if composed.
    pub fn outer_record(&self) -> Option<RecordId> {
        match &self.variant {
            Variant::InsideObservation { outer, .. } => Some(*outer),
            _ => None,
        }
    }

    /// The parent element this spec is scoped to, if composed.
    pub fn parent_element(&self) -> Option<EntityId> {
        match &self.variant {
            Variant::InsideObservation { observation, .. } => Some(*observation),
            _ => None,
        }
    }

    /// The entity type of the parent element, if composed.
    pub fn parent_entity(&self) -> Option<EntityType> {
        match &self.variant {
            Variant::InsideObservation { .. } => Some(EntityType::Observation),
            _ => None,
        }
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature().canonical())
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}

fn dedup_preserving_order(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn missing(key: &str, entity: EntityType, kind: VariantKind) -> RequeryError {
    RequeryError::Parse {
        message: format!("missing parameter '{key}' for {entity} {kind} query"),
    }
}

fn value_as_id(value: ParamValue, key: &str) -> Result<EntityId> {
    match value.into_scalar() {
        ParamValue::Int(i) if i > 0 => Ok(i as EntityId),
        ParamValue::Str(s)
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && !s.starts_with('0') =>
        {
            s.parse().map_err(|_| RequeryError::Parse {
                message: format!("value for '{key}' overflows an id"),
            })
        }
        other => Err(RequeryError::Parse {
            message: format!("value for '{key}' should be a positive id, got {other:?}"),
        }),
    }
}

fn take_id(
    params: &mut BTreeMap<String, ParamValue>,
    key: &str,
    entity: EntityType,
    kind: VariantKind,
) -> Result<EntityId> {
    let value = params.remove(key).ok_or_else(|| missing(key, entity, kind))?;
    value_as_id(value, key)
}

fn take_id_list(
    params: &mut BTreeMap<String, ParamValue>,
    key: &str,
    entity: EntityType,
    kind: VariantKind,
) -> Result<Vec<EntityId>> {
    let value = params.remove(key).ok_or_else(|| missing(key, entity, kind))?;
    // A scalar stands for a one-element list.
    let items = match value {
        ParamValue::List(items) => items,
        scalar => vec![scalar],
    };
    items
        .into_iter()
        .map(|item| value_as_id(item, key))
        .collect()
}

fn take_str(
    params: &mut BTreeMap<String, ParamValue>,
    key: &str,
    entity: EntityType,
    kind: VariantKind,
) -> Result<String> {
    let value = params.remove(key).ok_or_else(|| missing(key, entity, kind))?;
    match value.into_scalar() {
        ParamValue::Str(s) => Ok(s),
        ParamValue::Int(i) => Ok(i.to_string()),
        other => Err(RequeryError::Parse {
            message: format!("value for '{key}' should be a string, got {other:?}"),
        }),
    }
}

fn take_opt_str(params: &mut BTreeMap<String, ParamValue>, key: &str) -> Result<Option<String>> {
    match params.remove(key) {
        None => Ok(None),
        Some(value) => match value.into_scalar() {
            ParamValue::Str(s) => Ok(Some(s)),
            other => Err(RequeryError::Parse {
                message: format!("value for '{key}' should be a string, got {other:?}"),
            }),
        },
    }
}
