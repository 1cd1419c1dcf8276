//! Group registry - a monotonically growing set of groups keyed by id.
//!
//! Lookups vastly outnumber registrations (the build engine runs many
//! tasks concurrently, each classifying problems against existing
//! groups), so reads take a shared lock and only registration takes the
//! write lock.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::group::{DuplicateGroupError, ProblemGroup, PREDEFINED_IDS};

/// Process-wide registry of problem groups.
///
/// The predefined groups are inserted exactly once at construction, in a
/// fixed order. Registered ids never disappear; a successful
/// registration is visible to every subsequent lookup.
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, ProblemGroup>>,
}

impl GroupRegistry {
    /// Create a registry holding the predefined groups.
    pub fn new() -> Self {
        let mut groups = HashMap::new();
        for id in PREDEFINED_IDS {
            groups.insert(id.to_owned(), ProblemGroup::new(id));
        }
        GroupRegistry {
            groups: RwLock::new(groups),
        }
    }

    /// Register a new group under `id`.
    ///
    /// Fails if the id is already taken, including the predefined ids.
    pub fn register(&self, id: impl AsRef<str>) -> Result<ProblemGroup, DuplicateGroupError> {
        self.register_group(ProblemGroup::new(id))
    }

    /// Register an already-constructed group, revalidating id uniqueness.
    ///
    /// This is the path for groups rebuilt via
    /// [`ProblemGroup::from_serialized_fields`], which bypass the
    /// registry when constructed.
    pub fn register_group(
        &self,
        group: ProblemGroup,
    ) -> Result<ProblemGroup, DuplicateGroupError> {
        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(group.id()) {
            return Err(DuplicateGroupError {
                id: group.id().to_owned(),
            });
        }
        groups.insert(group.id().to_owned(), group.clone());
        Ok(group)
    }

    /// Look up a group by id.
    pub fn lookup(&self, id: &str) -> Option<ProblemGroup> {
        self.groups.read().unwrap().get(id).cloned()
    }

    /// Number of registered groups, predefined included.
    pub fn len(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    /// A registry is never empty (the predefined groups always exist).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
