//! Maps case ids to their [`CaseDescriptor`]s.

use chainbench_bolts::Error;
use hashbrown::HashMap;

use crate::adapter::CaseDescriptor;

/// All cases a harness can run
#[derive(Debug, Default, Clone)]
pub struct CaseRegistry {
    cases: HashMap<&'static str, CaseDescriptor>,
}

impl CaseRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a case. Ids must be unique.
    pub fn register(&mut self, desc: CaseDescriptor) -> Result<(), Error> {
        if self.cases.contains_key(desc.id) {
            return Err(Error::key_exists(format!("case {}", desc.id)));
        }
        self.cases.insert(desc.id, desc);
        Ok(())
    }

    /// Looks up the case `id`
    pub fn get(&self, id: &str) -> Result<&CaseDescriptor, Error> {
        self.cases
            .get(id)
            .ok_or_else(|| Error::key_not_found(format!("case {id}")))
    }

    /// All registered ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.cases.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All registered cases, sorted by id
    pub fn iter(&self) -> impl Iterator<Item = &CaseDescriptor> {
        self.ids().into_iter().filter_map(|id| self.cases.get(id))
    }

    /// Number of registered cases
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns `true` if no case is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chainbench_bolts::Error;

    use super::CaseRegistry;
    use crate::{
        adapter::{CaseDescriptor, VulnKind},
        context::CaseContext,
        ledger::{Action, Segment},
    };

    fn nop(_ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn case(id: &'static str) -> CaseDescriptor {
        CaseDescriptor::new(id, 190, VulnKind::IntOverflow, Segment::Data, Action::Trigger, nop)
    }

    #[test]
    fn test_registry() {
        let mut registry = CaseRegistry::new();
        registry.register(case("b")).unwrap();
        registry.register(case("a")).unwrap();
        assert!(matches!(
            registry.register(case("a")),
            Err(Error::KeyExists(..))
        ));

        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().id, "b");
        assert!(matches!(registry.get("c"), Err(Error::KeyNotFound(..))));
        assert_eq!(registry.iter().count(), 2);
    }
}
