//! Discriminator-to-implementation lookup for job types.
//!
//! Dispatch is closed; registration is open. Adding an analysis variant
//! means registering one more implementation; nothing else changes.

use std::collections::HashMap;
use std::sync::Arc;

use oncoflow_db::models::job::Job;

use crate::contract::JobType;

/// Maps a `job_type` discriminator to its implementation.
#[derive(Default)]
pub struct JobTypeRegistry {
    types: HashMap<&'static str, Arc<dyn JobType>>,
}

impl JobTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its discriminator.
    ///
    /// Exactly one implementation may own a discriminator; a duplicate
    /// registration is a programming error caught at startup.
    pub fn register(&mut self, job_type: Arc<dyn JobType>) {
        let discriminator = job_type.discriminator();
        let previous = self.types.insert(discriminator, job_type);
        assert!(
            previous.is_none(),
            "duplicate job type registration: {discriminator}"
        );
    }

    /// Resolve a discriminator to its implementation.
    pub fn resolve(&self, discriminator: &str) -> Option<&Arc<dyn JobType>> {
        self.types.get(discriminator)
    }

    /// Readable type name for a record; unknown discriminators fall back
    /// to the raw value.
    pub fn display_name_for(&self, job: &Job) -> String {
        match self.resolve(&job.job_type) {
            Some(job_type) => job_type.display_name().to_string(),
            None => job.job_type.clone(),
        }
    }

    /// All registered discriminators.
    pub fn discriminators(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.types.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types;

    #[test]
    fn builtin_discriminators_resolve_uniquely() {
        let registry = types::builtin_registry();
        for discriminator in registry.discriminators() {
            let job_type = registry.resolve(discriminator).unwrap();
            assert_eq!(job_type.discriminator(), discriminator);
        }
    }

    #[test]
    fn builtin_includes_tumor_only() {
        let registry = types::builtin_registry();
        let job_type = registry.resolve(types::tumor_only::TUMOR_ONLY).unwrap();
        assert_eq!(job_type.display_name(), "Tumor Only");
    }

    #[test]
    fn unknown_discriminator_does_not_resolve() {
        let registry = types::builtin_registry();
        assert!(registry.resolve("no_such_analysis").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate job type registration")]
    fn duplicate_registration_panics() {
        let mut registry = types::builtin_registry();
        registry.register(Arc::new(types::tumor_only::TumorOnlyAnalysis));
    }
}
