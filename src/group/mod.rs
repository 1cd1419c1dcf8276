//! Problem groups - named classification buckets for problems.
//!
//! Every problem belongs to exactly one group (e.g. deprecation,
//! type validation). A fixed set of predefined groups exists before any
//! user registration; additional groups are registered through the
//! [`GroupRegistry`].

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod registry;

pub use registry::GroupRegistry;

/// Group id for problems with no more specific classification.
pub const GENERIC_ID: &str = "generic";

/// Group id for task/property type validation problems.
pub const TYPE_VALIDATION_ID: &str = "type_validation";

/// Group id for deprecation warnings.
pub const DEPRECATION_ID: &str = "deprecation";

/// Group id for version catalog problems.
pub const VERSION_CATALOG_ID: &str = "version_catalog";

/// Predefined group ids, in registration order.
pub(crate) const PREDEFINED_IDS: [&str; 4] =
    [GENERIC_ID, TYPE_VALIDATION_ID, DEPRECATION_ID, VERSION_CATALOG_ID];

/// A named classification bucket for problems.
///
/// Groups are immutable after creation and cheap to clone (the id is
/// shared). Normal construction goes through [`GroupRegistry::register`],
/// which guarantees id uniqueness within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SerializedGroup", into = "SerializedGroup")]
pub struct ProblemGroup {
    id: Arc<str>,
}

impl ProblemGroup {
    /// Registry-internal constructor. User code registers groups instead.
    pub(crate) fn new(id: impl AsRef<str>) -> Self {
        ProblemGroup {
            id: Arc::from(id.as_ref()),
        }
    }

    /// Reconstruct a group from a flattened serialized representation.
    ///
    /// Compatibility seam for process-isolated workers that serialize
    /// problems field-by-field and rebuild them on the other side. Groups
    /// built this way bypass registry uniqueness: re-register them with
    /// [`GroupRegistry::register_group`] before use against a live
    /// registry.
    pub fn from_serialized_fields(id: impl AsRef<str>) -> Self {
        ProblemGroup::new(id)
    }

    /// The unique group id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this is one of the predefined groups.
    pub fn is_predefined(&self) -> bool {
        PREDEFINED_IDS.contains(&self.id())
    }
}

impl fmt::Display for ProblemGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Flattened wire shape used by the reconstruction seam.
///
/// The id defaults to empty so a field-by-field deserializer can build
/// the object before it has seen the id field.
#[derive(Serialize, Deserialize)]
struct SerializedGroup {
    #[serde(default)]
    id: String,
}

impl From<SerializedGroup> for ProblemGroup {
    fn from(raw: SerializedGroup) -> Self {
        ProblemGroup::from_serialized_fields(raw.id)
    }
}

impl From<ProblemGroup> for SerializedGroup {
    fn from(group: ProblemGroup) -> Self {
        SerializedGroup {
            id: group.id().to_owned(),
        }
    }
}

/// Registration of a group id that is already present.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("problem group `{id}` is already registered")]
#[diagnostic(
    code(foghorn::group::duplicate),
    help("Use `lookup_group` to fetch the existing group")
)]
pub struct DuplicateGroupError {
    /// The id that was registered twice.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_display_and_id() {
        let group = ProblemGroup::new("deprecation");
        assert_eq!(group.id(), "deprecation");
        assert_eq!(group.to_string(), "deprecation");
    }

    #[test]
    fn predefined_detection() {
        assert!(ProblemGroup::new(GENERIC_ID).is_predefined());
        assert!(ProblemGroup::new(VERSION_CATALOG_ID).is_predefined());
        assert!(!ProblemGroup::new("custom").is_predefined());
    }

    #[test]
    fn clones_share_id() {
        let group = ProblemGroup::new("shared");
        let clone = group.clone();
        assert_eq!(group, clone);
        assert_eq!(clone.id(), "shared");
    }

    #[test]
    fn serde_round_trip() {
        let group = ProblemGroup::new("type_validation");
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(json, r#"{"id":"type_validation"}"#);

        let back: ProblemGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn reconstruction_tolerates_missing_id() {
        // Field-by-field deserializers may present an empty object first.
        let group: ProblemGroup = serde_json::from_str("{}").unwrap();
        assert_eq!(group.id(), "");
    }

    #[test]
    fn from_serialized_fields_is_plain_construction() {
        let group = ProblemGroup::from_serialized_fields("rebuilt");
        assert_eq!(group.id(), "rebuilt");
        assert!(!group.is_predefined());
    }
}
