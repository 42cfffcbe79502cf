//! Entity trait: identity + audit metadata.

use crate::audit::RecordMeta;

/// Persisted entity with a store-assigned identifier.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Name used in error messages and log fields (e.g. "invoice").
    const NAME: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Returns the audit metadata.
    fn meta(&self) -> &RecordMeta;
}
