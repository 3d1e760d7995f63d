//! Result resolution.
//!
//! The engine never executes searches itself: a [`ResultResolver`] turns a
//! [`QuerySpec`] into a deterministic ordered list of unique entity ids,
//! and an [`EntityLoader`] dereferences ids for display. Both are
//! collaborator traits so the engine can sit on top of any backing data
//! store.
//!
//! [`MemoryDataset`] is a complete in-memory implementation of both traits
//! with fixed, documented orderings. The binary serves it as a demo corpus
//! and the integration tests drive the engine through it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use roaring::RoaringTreemap;

use crate::error::Result;
use crate::pattern::PatternExpr;
use crate::spec::{EntityId, EntityType, QuerySpec, Variant};

/// Executes a spec against the backing data. Must be a pure function of
/// the spec and the data's state at call time: same spec, same data, same
/// ordered ids, with ties broken by entity id. Result lists are snapshots;
/// the engine never assumes live freshness.
pub trait ResultResolver {
    fn resolve(&self, spec: &QuerySpec) -> Result<Vec<EntityId>>;
}

/// Dereferences an entity id for display. A missing entity is `None`,
/// never an error: a deleted record must not break cursor navigation.
pub trait EntityLoader {
    fn load_entity(&self, entity: EntityType, id: EntityId) -> Option<EntityCard>;
}

/// The little that the engine needs to know about a dereferenced entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCard {
    pub entity: EntityType,
    pub id: EntityId,
    pub label: String,
}

// ------------- IdSet -------------

/// An unordered id set used while combining filter dimensions. Most
/// filters produce none or one id, so those shapes are kept flat and only
/// genuine multi-id sets pay for a bitmap.
#[derive(Debug, Clone, PartialEq)]
pub enum IdSet {
    Empty,
    Single(EntityId),
    Multi(RoaringTreemap),
}

impl IdSet {
    pub fn new() -> IdSet {
        IdSet::Empty
    }

    pub fn push(&mut self, id: EntityId) {
        match self {
            IdSet::Empty => *self = IdSet::Single(id),
            IdSet::Single(existing) => {
                if *existing != id {
                    let mut multi = RoaringTreemap::new();
                    multi.insert(*existing);
                    multi.insert(id);
                    *self = IdSet::Multi(multi);
                }
            }
            IdSet::Multi(multi) => {
                multi.insert(id);
            }
        }
    }

    pub fn intersect_with(&mut self, other: &IdSet) {
        let current = std::mem::replace(self, IdSet::Empty);
        *self = match (current, other) {
            (IdSet::Empty, _) | (_, IdSet::Empty) => IdSet::Empty,
            (IdSet::Single(a), IdSet::Single(b)) => {
                if a == *b {
                    IdSet::Single(a)
                } else {
                    IdSet::Empty
                }
            }
            (IdSet::Single(a), IdSet::Multi(multi)) => {
                if multi.contains(a) {
                    IdSet::Single(a)
                } else {
                    IdSet::Empty
                }
            }
            (IdSet::Multi(multi), IdSet::Single(b)) => {
                if multi.contains(*b) {
                    IdSet::Single(*b)
                } else {
                    IdSet::Empty
                }
            }
            (IdSet::Multi(mut multi), IdSet::Multi(other_multi)) => {
                multi &= other_multi;
                match multi.len() {
                    0 => IdSet::Empty,
                    1 => IdSet::Single(multi.min().unwrap_or_default()),
                    _ => IdSet::Multi(multi),
                }
            }
        };
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match self {
            IdSet::Empty => false,
            IdSet::Single(existing) => *existing == id,
            IdSet::Multi(multi) => multi.contains(id),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            IdSet::Empty => 0,
            IdSet::Single(_) => 1,
            IdSet::Multi(multi) => multi.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, IdSet::Empty)
    }
}

impl Default for IdSet {
    fn default() -> Self {
        IdSet::new()
    }
}

impl FromIterator<EntityId> for IdSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut set = IdSet::new();
        for id in iter {
            set.push(id);
        }
        set
    }
}

// ------------- MemoryDataset -------------

#[derive(Debug)]
struct UserRow {
    login: String,
}

#[derive(Debug)]
struct LocationRow {
    name: String,
    user: EntityId,
}

#[derive(Debug)]
struct NameRow {
    text: String,
    user: EntityId,
}

#[derive(Debug)]
struct ObservationRow {
    when: NaiveDate,
    user: EntityId,
    name: Option<EntityId>,
    location: Option<EntityId>,
    notes: String,
    images: Vec<EntityId>,
}

#[derive(Debug)]
struct ImageRow {
    user: EntityId,
    notes: String,
}

#[derive(Debug)]
struct CommentRow {
    user: EntityId,
    observation: EntityId,
    summary: String,
}

/// In-memory reference data with deterministic orderings:
/// observations newest-first then by id, names and locations
/// alphabetically then by id, users by login then by id, images and
/// comments in creation order, images of one observation in attachment
/// order, and fixed id sets in their given order.
#[derive(Debug, Default)]
pub struct MemoryDataset {
    last_id: EntityId,
    users: BTreeMap<EntityId, UserRow>,
    locations: BTreeMap<EntityId, LocationRow>,
    names: BTreeMap<EntityId, NameRow>,
    observations: BTreeMap<EntityId, ObservationRow>,
    images: BTreeMap<EntityId, ImageRow>,
    comments: BTreeMap<EntityId, CommentRow>,
}

impl MemoryDataset {
    pub fn new() -> MemoryDataset {
        MemoryDataset::default()
    }

    fn generate(&mut self) -> EntityId {
        self.last_id += 1;
        self.last_id
    }

    pub fn add_user(&mut self, login: &str) -> EntityId {
        let id = self.generate();
        self.users.insert(
            id,
            UserRow {
                login: login.to_string(),
            },
        );
        id
    }

    pub fn add_location(&mut self, name: &str, user: EntityId) -> EntityId {
        let id = self.generate();
        self.locations.insert(
            id,
            LocationRow {
                name: name.to_string(),
                user,
            },
        );
        id
    }

    pub fn add_name(&mut self, text: &str, user: EntityId) -> EntityId {
        let id = self.generate();
        self.names.insert(
            id,
            NameRow {
                text: text.to_string(),
                user,
            },
        );
        id
    }

    pub fn add_observation(
        &mut self,
        when: NaiveDate,
        user: EntityId,
        name: Option<EntityId>,
        location: Option<EntityId>,
        notes: &str,
    ) -> EntityId {
        let id = self.generate();
        self.observations.insert(
            id,
            ObservationRow {
                when,
                user,
                name,
                location,
                notes: notes.to_string(),
                images: Vec::new(),
            },
        );
        id
    }

    pub fn add_image(&mut self, user: EntityId, notes: &str) -> EntityId {
        let id = self.generate();
        self.images.insert(
            id,
            ImageRow {
                user,
                notes: notes.to_string(),
            },
        );
        id
    }

    /// Attach an image to an observation; attachment order is the order
    /// images are listed when paging inside the observation.
    pub fn attach_image(&mut self, observation: EntityId, image: EntityId) {
        if !self.images.contains_key(&image) {
            return;
        }
        if let Some(row) = self.observations.get_mut(&observation) {
            if !row.images.contains(&image) {
                row.images.push(image);
            }
        }
    }

    pub fn add_comment(
        &mut self,
        user: EntityId,
        observation: EntityId,
        summary: &str,
    ) -> EntityId {
        let id = self.generate();
        self.comments.insert(
            id,
            CommentRow {
                user,
                observation,
                summary: summary.to_string(),
            },
        );
        id
    }

    fn exists(&self, entity: EntityType, id: EntityId) -> bool {
        match entity {
            EntityType::Observation => self.observations.contains_key(&id),
            EntityType::Image => self.images.contains_key(&id),
            EntityType::Name => self.names.contains_key(&id),
            EntityType::Location => self.locations.contains_key(&id),
            EntityType::Comment => self.comments.contains_key(&id),
            EntityType::User => self.users.contains_key(&id),
        }
    }

    fn all_ids(&self, entity: EntityType) -> Vec<EntityId> {
        match entity {
            EntityType::Observation => self.observations.keys().copied().collect(),
            EntityType::Image => self.images.keys().copied().collect(),
            EntityType::Name => self.names.keys().copied().collect(),
            EntityType::Location => self.locations.keys().copied().collect(),
            EntityType::Comment => self.comments.keys().copied().collect(),
            EntityType::User => self.users.keys().copied().collect(),
        }
    }

    /// The default ordering for an entity type, filtered down to `keep`
    /// when a filter applies. Ties always break by id.
    fn ordered(&self, entity: EntityType, keep: Option<&IdSet>) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .all_ids(entity)
            .into_iter()
            .filter(|&id| keep.is_none_or(|set| set.contains(id)))
            .collect();
        match entity {
            EntityType::Observation => {
                ids.sort_by_key(|&id| {
                    let when = self
                        .observations
                        .get(&id)
                        .map(|row| row.when)
                        .unwrap_or(NaiveDate::MIN);
                    (std::cmp::Reverse(when), id)
                });
            }
            EntityType::Name => {
                ids.sort_by_key(|&id| {
                    let text = self
                        .names
                        .get(&id)
                        .map(|row| row.text.to_lowercase())
                        .unwrap_or_default();
                    (text, id)
                });
            }
            EntityType::Location => {
                ids.sort_by_key(|&id| {
                    let name = self
                        .locations
                        .get(&id)
                        .map(|row| row.name.to_lowercase())
                        .unwrap_or_default();
                    (name, id)
                });
            }
            EntityType::User => {
                ids.sort_by_key(|&id| {
                    let login = self
                        .users
                        .get(&id)
                        .map(|row| row.login.to_lowercase())
                        .unwrap_or_default();
                    (login, id)
                });
            }
            // Creation order, which id order already is.
            EntityType::Image | EntityType::Comment => {}
        }
        ids
    }

    /// All text a pattern search runs against for one entity.
    fn searchable_text(&self, entity: EntityType, id: EntityId) -> String {
        match entity {
            EntityType::Observation => {
                let Some(row) = self.observations.get(&id) else {
                    return String::new();
                };
                let mut text = String::new();
                if let Some(name) = row.name.and_then(|n| self.names.get(&n)) {
                    text.push_str(&name.text);
                    text.push(' ');
                }
                if let Some(location) = row.location.and_then(|l| self.locations.get(&l)) {
                    text.push_str(&location.name);
                    text.push(' ');
                }
                text.push_str(&row.notes);
                text
            }
            EntityType::Image => {
                let Some(row) = self.images.get(&id) else {
                    return String::new();
                };
                let mut text = row.notes.clone();
                for observation in self.observations.values() {
                    if observation.images.contains(&id) {
                        if let Some(name) = observation.name.and_then(|n| self.names.get(&n)) {
                            text.push(' ');
                            text.push_str(&name.text);
                        }
                    }
                }
                text
            }
            EntityType::Name => self
                .names
                .get(&id)
                .map(|row| row.text.clone())
                .unwrap_or_default(),
            EntityType::Location => self
                .locations
                .get(&id)
                .map(|row| row.name.clone())
                .unwrap_or_default(),
            EntityType::Comment => self
                .comments
                .get(&id)
                .map(|row| row.summary.clone())
                .unwrap_or_default(),
            EntityType::User => self
                .users
                .get(&id)
                .map(|row| row.login.clone())
                .unwrap_or_default(),
        }
    }

    fn by_user(&self, entity: EntityType, user: EntityId) -> IdSet {
        match entity {
            EntityType::Observation => self
                .observations
                .iter()
                .filter(|(_, row)| row.user == user)
                .map(|(&id, _)| id)
                .collect(),
            EntityType::Image => self
                .images
                .iter()
                .filter(|(_, row)| row.user == user)
                .map(|(&id, _)| id)
                .collect(),
            EntityType::Name => self
                .names
                .iter()
                .filter(|(_, row)| row.user == user)
                .map(|(&id, _)| id)
                .collect(),
            EntityType::Location => self
                .locations
                .iter()
                .filter(|(_, row)| row.user == user)
                .map(|(&id, _)| id)
                .collect(),
            EntityType::Comment => self
                .comments
                .iter()
                .filter(|(_, row)| row.user == user)
                .map(|(&id, _)| id)
                .collect(),
            EntityType::User => IdSet::Empty,
        }
    }

    fn matching(&self, entity: EntityType, pattern: &PatternExpr) -> IdSet {
        self.all_ids(entity)
            .into_iter()
            .filter(|&id| pattern.matches(&self.searchable_text(entity, id)))
            .collect()
    }

    /// Observation set matching the provided advanced-search dimensions,
    /// or `None` when no dimension constrains the search.
    fn advanced_observations(
        &self,
        name: &Option<String>,
        location: &Option<String>,
        user: &Option<String>,
        content: &Option<String>,
    ) -> Result<Option<IdSet>> {
        let mut result: Option<IdSet> = None;
        if let Some(raw) = name {
            let pattern = PatternExpr::parse(raw)?;
            let set = self
                .observations
                .iter()
                .filter(|(_, row)| {
                    row.name
                        .and_then(|n| self.names.get(&n))
                        .is_some_and(|n| pattern.matches(&n.text))
                })
                .map(|(&id, _)| id)
                .collect();
            merge(&mut result, set);
        }
        if let Some(raw) = location {
            let pattern = PatternExpr::parse(raw)?;
            let set = self
                .observations
                .iter()
                .filter(|(_, row)| {
                    row.location
                        .and_then(|l| self.locations.get(&l))
                        .is_some_and(|l| pattern.matches(&l.name))
                })
                .map(|(&id, _)| id)
                .collect();
            merge(&mut result, set);
        }
        if let Some(raw) = user {
            let pattern = PatternExpr::parse(raw)?;
            let set = self
                .observations
                .iter()
                .filter(|(_, row)| {
                    self.users
                        .get(&row.user)
                        .is_some_and(|u| pattern.matches(&u.login))
                })
                .map(|(&id, _)| id)
                .collect();
            merge(&mut result, set);
        }
        if let Some(raw) = content {
            let pattern = PatternExpr::parse(raw)?;
            let mut set = IdSet::new();
            for (&id, row) in &self.observations {
                let commented = || {
                    self.comments
                        .values()
                        .any(|c| c.observation == id && pattern.matches(&c.summary))
                };
                if pattern.matches(&row.notes) || commented() {
                    set.push(id);
                }
            }
            merge(&mut result, set);
        }
        Ok(result)
    }

    /// Images for an advanced search: observation-side dimensions narrow
    /// through the attachments, content matches the image's own notes.
    fn advanced_images(
        &self,
        name: &Option<String>,
        location: &Option<String>,
        user: &Option<String>,
        content: &Option<String>,
    ) -> Result<Option<IdSet>> {
        let mut result: Option<IdSet> = None;
        if name.is_some() || location.is_some() || user.is_some() {
            let observations = self
                .advanced_observations(name, location, user, &None)?
                .unwrap_or_else(|| self.observations.keys().copied().collect());
            let mut images = IdSet::new();
            for (&id, row) in &self.observations {
                if observations.contains(id) {
                    for &image in &row.images {
                        images.push(image);
                    }
                }
            }
            merge(&mut result, images);
        }
        if let Some(raw) = content {
            let pattern = PatternExpr::parse(raw)?;
            let set = self
                .images
                .iter()
                .filter(|(_, row)| pattern.matches(&row.notes))
                .map(|(&id, _)| id)
                .collect();
            merge(&mut result, set);
        }
        Ok(result)
    }
}

fn merge(result: &mut Option<IdSet>, set: IdSet) {
    match result {
        None => *result = Some(set),
        Some(existing) => existing.intersect_with(&set),
    }
}

impl ResultResolver for MemoryDataset {
    fn resolve(&self, spec: &QuerySpec) -> Result<Vec<EntityId>> {
        let entity = spec.entity();
        match spec.variant() {
            Variant::All => Ok(self.ordered(entity, None)),
            Variant::ByUser { user } => {
                let set = self.by_user(entity, *user);
                Ok(self.ordered(entity, Some(&set)))
            }
            Variant::AtLocation { location } => {
                let set: IdSet = self
                    .observations
                    .iter()
                    .filter(|(_, row)| row.location == Some(*location))
                    .map(|(&id, _)| id)
                    .collect();
                Ok(self.ordered(entity, Some(&set)))
            }
            Variant::PatternSearch { pattern } => {
                let set = self.matching(entity, pattern);
                Ok(self.ordered(entity, Some(&set)))
            }
            Variant::AdvancedSearch {
                name,
                location,
                user,
                content,
            } => {
                let set = match entity {
                    EntityType::Image => self.advanced_images(name, location, user, content)?,
                    _ => self.advanced_observations(name, location, user, content)?,
                };
                Ok(self.ordered(entity, set.as_ref()))
            }
            Variant::InSet { ids } => Ok(ids
                .iter()
                .copied()
                .filter(|&id| self.exists(entity, id))
                .collect()),
            Variant::InsideObservation { observation, .. } => Ok(self
                .observations
                .get(observation)
                .map(|row| row.images.clone())
                .unwrap_or_default()),
        }
    }
}

impl EntityLoader for MemoryDataset {
    fn load_entity(&self, entity: EntityType, id: EntityId) -> Option<EntityCard> {
        let label = match entity {
            EntityType::Observation => {
                let row = self.observations.get(&id)?;
                let name = row
                    .name
                    .and_then(|n| self.names.get(&n))
                    .map(|n| n.text.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                format!("{} on {}", name, row.when)
            }
            EntityType::Image => {
                let row = self.images.get(&id)?;
                if row.notes.is_empty() {
                    format!("image {id}")
                } else {
                    row.notes.clone()
                }
            }
            EntityType::Name => self.names.get(&id)?.text.clone(),
            EntityType::Location => self.locations.get(&id)?.name.clone(),
            EntityType::Comment => self.comments.get(&id)?.summary.clone(),
            EntityType::User => self.users.get(&id)?.login.clone(),
        };
        Some(EntityCard { entity, id, label })
    }
}
