//! Registrations and the per-container registration table.
//!
//! A [`Registration`] binds one identifier to one provider and owns the
//! singleton slot for it. The [`RegistrationTable`] keeps an ordered list
//! of registrations per identifier; duplicates are intentional, they back
//! multi-resolution.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::identifier::ServiceIdentifier;
use crate::provider::{Instance, Provider};

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique handle to one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One identifier-to-provider binding.
///
/// The singleton slot lives here: a singleton instance belongs to its
/// registration, not to the container as a whole, so two registrations for
/// the same identifier cache independently.
pub struct Registration {
    id: RegistrationId,
    identifier: ServiceIdentifier,
    provider: Provider,
    slot: RwLock<Option<Instance>>,
    registered: AtomicBool,
}

impl Registration {
    pub(crate) fn new(identifier: ServiceIdentifier, provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            id: RegistrationId(NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed)),
            identifier,
            provider,
            slot: RwLock::new(None),
            registered: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    #[inline]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    #[inline]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// True once the singleton slot holds an instance.
    pub fn is_resolved(&self) -> bool {
        self.slot.read().is_some()
    }

    /// True until the registration is removed from its table.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn cached(&self) -> Option<Instance> {
        self.slot.read().clone()
    }

    /// Fills the singleton slot, first write wins.
    ///
    /// A factory may re-enter resolution and fill the slot before its own
    /// caller gets to; the instance already in the slot is returned in that
    /// case and the late one is dropped.
    pub(crate) fn store(&self, instance: Instance) -> Instance {
        let mut slot = self.slot.write();
        match &*slot {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(instance.clone());
                instance
            }
        }
    }

    pub(crate) fn clear(&self) {
        *self.slot.write() = None;
    }

    pub(crate) fn mark_unregistered(&self) {
        self.registered.store(false, Ordering::Release);
        self.clear();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("provider", &self.provider)
            .field("resolved", &self.is_resolved())
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Maps identifiers to their ordered registration lists.
///
/// Insertion order within a list is preserved; it is the order
/// multi-resolution returns instances in, and the *last* entry is the one
/// single resolution picks.
#[derive(Default)]
pub(crate) struct RegistrationTable {
    entries: DashMap<ServiceIdentifier, Vec<Arc<Registration>>>,
}

impl RegistrationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a registration under its own identifier.
    pub(crate) fn insert(&self, registration: Arc<Registration>) {
        self.entries
            .entry(registration.identifier().clone())
            .or_default()
            .push(registration);
    }

    /// The registration list for `identifier`, empty if absent.
    pub(crate) fn get(&self, identifier: &ServiceIdentifier) -> Vec<Arc<Registration>> {
        self.entries
            .get(identifier)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, identifier: &ServiceIdentifier) -> bool {
        self.entries
            .get(identifier)
            .is_some_and(|entry| !entry.value().is_empty())
    }

    /// Removes one registration (by id) or the whole list for `identifier`.
    ///
    /// Removed registrations are marked unregistered and their singleton
    /// slots cleared, so stale references to them stop resolving. Returns
    /// the number of registrations removed.
    pub(crate) fn remove(
        &self,
        identifier: &ServiceIdentifier,
        which: Option<RegistrationId>,
    ) -> usize {
        let mut removed = Vec::new();
        match which {
            None => {
                if let Some((_, list)) = self.entries.remove(identifier) {
                    removed = list;
                }
            }
            Some(id) => {
                if let Some(mut entry) = self.entries.get_mut(identifier) {
                    let list = entry.value_mut();
                    if let Some(index) = list.iter().position(|r| r.id() == id) {
                        removed.push(list.remove(index));
                    }
                }
                // Drop the key once its list is empty.
                self.entries
                    .remove_if(identifier, |_, list| list.is_empty());
            }
        }
        for registration in &removed {
            trace!(target: "silsila", identifier = %identifier, id = %registration.id(), "Unregistered");
            registration.mark_unregistered();
        }
        removed.len()
    }

    /// All identifiers with at least one registration.
    pub(crate) fn identifiers(&self) -> Vec<ServiceIdentifier> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Total number of registrations across all identifiers.
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears every singleton slot, leaving the registrations in place.
    pub(crate) fn clear_instances(&self) {
        for entry in self.entries.iter() {
            for registration in entry.value() {
                registration.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Arc<Registration> {
        Registration::new(ServiceIdentifier::named(name), Provider::value(0u32))
    }

    #[test]
    fn insert_and_get_preserve_order() {
        let table = RegistrationTable::new();
        let first = reg("svc");
        let second = reg("svc");
        table.insert(first.clone());
        table.insert(second.clone());

        let list = table.get(&ServiceIdentifier::named("svc"));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id(), first.id());
        assert_eq!(list[1].id(), second.id());
    }

    #[test]
    fn get_missing_is_empty() {
        let table = RegistrationTable::new();
        assert!(table.get(&ServiceIdentifier::named("nope")).is_empty());
        assert!(!table.contains(&ServiceIdentifier::named("nope")));
    }

    #[test]
    fn remove_all_for_identifier() {
        let table = RegistrationTable::new();
        let first = reg("svc");
        table.insert(first.clone());
        table.insert(reg("svc"));
        table.insert(reg("other"));

        assert_eq!(table.remove(&ServiceIdentifier::named("svc"), None), 2);
        assert!(!table.contains(&ServiceIdentifier::named("svc")));
        assert!(table.contains(&ServiceIdentifier::named("other")));
        assert!(!first.is_registered());
    }

    #[test]
    fn remove_single_registration() {
        let table = RegistrationTable::new();
        let first = reg("svc");
        let second = reg("svc");
        table.insert(first.clone());
        table.insert(second.clone());

        assert_eq!(
            table.remove(&ServiceIdentifier::named("svc"), Some(first.id())),
            1
        );
        let list = table.get(&ServiceIdentifier::named("svc"));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id(), second.id());
        assert!(!first.is_registered());
        assert!(second.is_registered());
    }

    #[test]
    fn remove_last_drops_key() {
        let table = RegistrationTable::new();
        let only = reg("svc");
        table.insert(only.clone());
        table.remove(&ServiceIdentifier::named("svc"), Some(only.id()));
        assert!(table.identifiers().is_empty());
    }

    #[test]
    fn singleton_slot_first_write_wins() {
        let registration = reg("svc");
        assert!(!registration.is_resolved());

        let first: Instance = Arc::new(1u32);
        let second: Instance = Arc::new(2u32);
        let stored = registration.store(first.clone());
        assert!(Arc::ptr_eq(&stored, &first));

        let stored = registration.store(second);
        assert!(Arc::ptr_eq(&stored, &first));
        assert!(registration.is_resolved());
    }

    #[test]
    fn clear_instances_keeps_registrations() {
        let table = RegistrationTable::new();
        let registration = reg("svc");
        table.insert(registration.clone());
        registration.store(Arc::new(5u32));

        table.clear_instances();
        assert!(!registration.is_resolved());
        assert!(table.contains(&ServiceIdentifier::named("svc")));
    }

    #[test]
    fn identifier_key_matches_registration() {
        let table = RegistrationTable::new();
        table.insert(reg("svc"));
        let ids = table.identifiers();
        assert_eq!(ids, vec![ServiceIdentifier::named("svc")]);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
