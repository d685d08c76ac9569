//! Per-resolve scratch storage.
//!
//! A [`ResolveContext`] lives exactly as long as one top-level resolve
//! call and backs the `Resolution` lifecycle: the first production of a
//! registration within the call is cached here and every further request
//! for it inside the same resolution tree observes that instance.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::provider::Instance;
use crate::registration::RegistrationId;

/// Maps registrations to the instance produced for them within one
/// top-level resolve call.
#[derive(Default)]
pub struct ResolveContext {
    entries: Mutex<HashMap<RegistrationId, Instance>>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RegistrationId) -> Option<Instance> {
        self.entries.lock().get(&id).cloned()
    }

    /// Caches an instance for a registration, first write wins.
    pub(crate) fn insert(&self, id: RegistrationId, instance: Instance) -> Instance {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(existing) => existing.clone(),
            None => {
                entries.insert(id, instance.clone());
                instance
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ServiceIdentifier;
    use crate::provider::Provider;
    use crate::registration::Registration;
    use std::sync::Arc;

    #[test]
    fn miss_then_hit() {
        let registration =
            Registration::new(ServiceIdentifier::named("svc"), Provider::value(0u32));
        let context = ResolveContext::new();
        assert!(context.get(registration.id()).is_none());

        let instance: Instance = Arc::new(7u32);
        context.insert(registration.id(), instance.clone());
        let hit = context.get(registration.id()).unwrap();
        assert!(Arc::ptr_eq(&hit, &instance));
    }

    #[test]
    fn first_write_wins() {
        let registration =
            Registration::new(ServiceIdentifier::named("svc"), Provider::value(0u32));
        let context = ResolveContext::new();

        let first: Instance = Arc::new(1u32);
        let winner = context.insert(registration.id(), first.clone());
        assert!(Arc::ptr_eq(&winner, &first));

        let winner = context.insert(registration.id(), Arc::new(2u32));
        assert!(Arc::ptr_eq(&winner, &first));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn contexts_are_independent() {
        let registration =
            Registration::new(ServiceIdentifier::named("svc"), Provider::value(0u32));
        let a = ResolveContext::new();
        let b = ResolveContext::new();

        a.insert(registration.id(), Arc::new(1u32));
        assert!(b.get(registration.id()).is_none());
        assert!(b.is_empty());
    }
}
