//! [`TransportRegistry`] – maps each [`BusKind`] to the factory that opens
//! its transport.
//!
//! A [`BusContext`][crate::context::BusContext] resolves the endpoint scheme
//! to a [`BusKind`] and asks the registry for a transport handle.  Kinds that
//! parse but have no registered factory are rejected the same way as unknown
//! schemes.

use std::collections::HashMap;
use std::sync::Arc;

use databus_types::{BusKind, DataBusError};

use crate::transport::{Transport, TransportFactory};

#[derive(Default, Clone)]
pub struct TransportRegistry {
    factories: HashMap<BusKind, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `kind`.  Any previously registered factory
    /// for the same kind is replaced.
    pub fn register(&mut self, kind: BusKind, factory: impl TransportFactory + 'static) {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Builder form of [`register`][Self::register].
    pub fn with(mut self, kind: BusKind, factory: impl TransportFactory + 'static) -> Self {
        self.register(kind, factory);
        self
    }

    pub fn supports(&self, kind: BusKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Open a fresh transport handle for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DataBusError::UnsupportedBusKind`] when no factory is
    /// registered for `kind`.
    pub fn open(&self, kind: BusKind) -> Result<Arc<dyn Transport>, DataBusError> {
        self.factories
            .get(&kind)
            .map(|factory| factory.open())
            .ok_or_else(|| {
                DataBusError::UnsupportedBusKind(format!("no transport registered for {kind}"))
            })
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackHub;

    #[test]
    fn empty_registry_rejects_every_kind() {
        let registry = TransportRegistry::new();
        assert!(!registry.supports(BusKind::Opcua));
        assert!(matches!(
            registry.open(BusKind::Opcua),
            Err(DataBusError::UnsupportedBusKind(_))
        ));
    }

    #[test]
    fn registered_factory_opens_fresh_handles() {
        let hub = LoopbackHub::default();
        let registry = TransportRegistry::new().with(BusKind::Opcua, hub.factory());
        assert!(registry.supports(BusKind::Opcua));

        let first = registry.open(BusKind::Opcua).unwrap();
        let second = registry.open(BusKind::Opcua).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn debug_lists_registered_kinds() {
        let registry = TransportRegistry::new().with(BusKind::Opcua, LoopbackHub::default().factory());
        assert!(format!("{registry:?}").contains("Opcua"));
    }
}
