//! Shipped analysis variants.

pub mod tumor_only;

use std::sync::Arc;

use crate::registry::JobTypeRegistry;

/// Registry pre-populated with every shipped variant.
pub fn builtin_registry() -> JobTypeRegistry {
    let mut registry = JobTypeRegistry::new();
    registry.register(Arc::new(tumor_only::TumorOnlyAnalysis));
    registry
}
