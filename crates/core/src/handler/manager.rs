//! Handler instantiation, ordering and loading

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::contract::{Handler, HandlerInfo};
use super::registry::HandlerRegistry;
use crate::config::{EngineConfig, HandlerConfig};
use crate::{Error, Result};

/// A handler that has been loaded and can be shared by sessions
#[derive(Clone)]
pub struct LoadedHandler {
    pub info: HandlerInfo,
    pub config: HandlerConfig,
    pub handler: Arc<dyn Handler>,
}

impl LoadedHandler {
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

struct PendingHandler {
    info: HandlerInfo,
    config: HandlerConfig,
    handler: Box<dyn Handler>,
}

/// Creates configured handlers, orders them by load priority and loads them
/// once per process
#[derive(Default)]
pub struct HandlerManager {
    pending: Vec<PendingHandler>,
    loaded: Vec<LoadedHandler>,
}

impl HandlerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every enabled handler in `config` through `registry`
    pub fn from_config(registry: &HandlerRegistry, config: &EngineConfig) -> Result<Self> {
        let mut manager = Self::new();
        for (name, handler_config) in &config.handler_configs {
            if !handler_config.enabled {
                info!("Handler {} disabled, skipped", name);
                continue;
            }
            let handler = registry.create(handler_config.handler_type(name))?;
            manager.add_handler(name, handler, handler_config.clone())?;
        }
        Ok(manager)
    }

    /// Queue a handler instance under `name`
    pub fn add_handler(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn Handler>,
        config: HandlerConfig,
    ) -> Result<()> {
        let name = name.into();
        let taken = self.pending.iter().any(|p| p.info.name == name)
            || self.loaded.iter().any(|l| l.info.name == name);
        if taken {
            return Err(Error::DuplicateHandler { name });
        }
        let mut info = handler.info();
        info.name = name;
        if let Some(priority) = config.load_priority {
            info.load_priority = priority;
        }
        self.pending.push(PendingHandler {
            info,
            config,
            handler,
        });
        Ok(())
    }

    /// Load queued handlers in load-priority order
    ///
    /// Equal priorities keep their insertion order.
    pub fn load(&mut self, engine_config: &EngineConfig) -> Result<()> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|p| p.info.load_priority);
        for mut entry in pending {
            let start = Instant::now();
            entry.handler.load(engine_config, &entry.config)?;
            info!(
                "Handler {} loaded in {:.2}ms",
                entry.info.name,
                start.elapsed().as_secs_f64() * 1000.0
            );
            self.loaded.push(LoadedHandler {
                info: entry.info,
                config: entry.config,
                handler: Arc::from(entry.handler),
            });
        }
        self.loaded.sort_by_key(|l| l.info.load_priority);
        Ok(())
    }

    /// Loaded handlers in load-priority order
    pub fn handlers(&self) -> &[LoadedHandler] {
        &self.loaded
    }

    pub fn handler(&self, name: &str) -> Option<&LoadedHandler> {
        self.loaded.iter().find(|l| l.info.name == name)
    }
}
