//! Handler factory registry
//!
//! Maps handler type names to factories. Handlers linked into the binary
//! can register themselves with [`inventory`] through
//! [`submit_handler!`](crate::submit_handler); [`HandlerRegistry::with_builtin`]
//! collects every such submission.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::contract::Handler;
use crate::{Error, Result};

/// Factory trait for creating handler instances
pub trait HandlerFactory: Send + Sync {
    /// Create a fresh, unloaded handler instance
    fn create(&self) -> Result<Box<dyn Handler>>;

    /// Handler type this factory creates
    fn handler_type(&self) -> &str;
}

/// Inventory submission produced by [`submit_handler!`](crate::submit_handler)
pub struct HandlerRegistration {
    pub handler_type: &'static str,
    pub constructor: fn() -> Box<dyn Handler>,
}

impl HandlerRegistration {
    pub const fn new(handler_type: &'static str, constructor: fn() -> Box<dyn Handler>) -> Self {
        Self {
            handler_type,
            constructor,
        }
    }
}

inventory::collect!(HandlerRegistration);

struct RegisteredFactory {
    handler_type: &'static str,
    constructor: fn() -> Box<dyn Handler>,
}

impl HandlerFactory for RegisteredFactory {
    fn create(&self) -> Result<Box<dyn Handler>> {
        Ok((self.constructor)())
    }

    fn handler_type(&self) -> &str {
        self.handler_type
    }
}

/// Registry of handler factories keyed by handler type
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every inventory-submitted handler
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        for registration in inventory::iter::<HandlerRegistration> {
            registry.register(Arc::new(RegisteredFactory {
                handler_type: registration.handler_type,
                constructor: registration.constructor,
            }))?;
        }
        Ok(registry)
    }

    /// Register a factory; a handler type may only be registered once
    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) -> Result<()> {
        let handler_type = factory.handler_type().to_string();
        if self.factories.contains_key(&handler_type) {
            return Err(Error::ConfigError(format!(
                "handler type '{}' registered twice",
                handler_type
            )));
        }
        debug!("Registered handler type: {}", handler_type);
        self.factories.insert(handler_type, factory);
        Ok(())
    }

    pub fn create(&self, handler_type: &str) -> Result<Box<dyn Handler>> {
        let factory = self
            .factories
            .get(handler_type)
            .ok_or_else(|| Error::UnknownHandlerType {
                handler_type: handler_type.to_string(),
                available: self.list_types(),
            })?;
        factory.create()
    }

    pub fn has_type(&self, handler_type: &str) -> bool {
        self.factories.contains_key(handler_type)
    }

    /// Registered handler types, sorted
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}
