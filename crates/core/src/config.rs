//! Service and engine configuration
//!
//! Configuration is read from YAML (or JSON) with the shape:
//!
//! ```yaml
//! logger:
//!   log_level: info
//! chat_engine:
//!   model_root: models
//!   concurrent_limit: 2
//!   handler_configs:
//!     Avatar:
//!       module: avatar
//!       fps: 25
//!   outputs:
//!     video: { handler: Avatar, type: avatar_video }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::{ChatDataType, EngineChannelType};
use crate::{Error, Result};

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub logger: LoggerConfig,
    pub chat_engine: EngineConfig,
}

impl ServiceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(Error::ConfigError(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Producer/type pair feeding an external output channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSourceConfig {
    pub handler: String,
    #[serde(rename = "type")]
    pub data_type: ChatDataType,
}

/// Chat engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model_root: String,
    /// Maximum number of live sessions
    pub concurrent_limit: usize,
    pub handler_configs: BTreeMap<String, HandlerConfig>,
    pub outputs: HashMap<EngineChannelType, OutputSourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_root: String::new(),
            concurrent_limit: 1,
            handler_configs: BTreeMap::new(),
            outputs: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Per-handler configuration block
///
/// Keys other than the common ones are kept in `params` and decoded by the
/// handler itself through [`HandlerConfig::parse_params`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Registered handler type; defaults to the handler name
    #[serde(default)]
    pub module: Option<String>,
    /// Overrides the handler's own load priority
    #[serde(default)]
    pub load_priority: Option<i32>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: None,
            load_priority: None,
            params: Map::new(),
        }
    }
}

impl HandlerConfig {
    pub fn for_module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Handler type to instantiate for the handler named `name`
    pub fn handler_type<'a>(&'a self, name: &'a str) -> &'a str {
        self.module.as_deref().unwrap_or(name)
    }

    /// Decode handler-specific settings
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| Error::ConfigError(format!("invalid handler parameters: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
logger:
  log_level: debug
chat_engine:
  model_root: models
  concurrent_limit: 2
  handler_configs:
    Avatar:
      module: avatar
      fps: 30
      debug: true
    Disabled:
      enabled: false
  outputs:
    video:
      handler: Avatar
      type: avatar_video
"#;

    #[test]
    fn test_parse_yaml() {
        let config = ServiceConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.logger.log_level, "debug");
        let engine = &config.chat_engine;
        assert_eq!(engine.concurrent_limit, 2);

        let avatar = &engine.handler_configs["Avatar"];
        assert!(avatar.enabled);
        assert_eq!(avatar.handler_type("Avatar"), "avatar");
        assert_eq!(avatar.params["fps"], Value::from(30));
        assert!(!engine.handler_configs["Disabled"].enabled);
        assert_eq!(
            engine.handler_configs["Disabled"].handler_type("Disabled"),
            "Disabled"
        );

        let output = &engine.outputs[&EngineChannelType::Video];
        assert_eq!(output.handler, "Avatar");
        assert_eq!(output.data_type, ChatDataType::AvatarVideo);
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.logger.log_level, "info");
        assert_eq!(config.chat_engine.concurrent_limit, 1);
        assert!(config.chat_engine.handler_configs.is_empty());
    }

    #[test]
    fn test_parse_params() {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Params {
            fps: u32,
            name: String,
        }
        let config = HandlerConfig::for_module("x").with_param("fps", 25);
        let params: Params = config.parse_params().unwrap();
        assert_eq!(params.fps, 25);
        assert_eq!(params.name, "");

        let bad = HandlerConfig::default().with_param("fps", "fast");
        assert!(bad.parse_params::<Params>().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.chat_engine.model_root, "models");

        let bad = dir.path().join("engine.toml");
        std::fs::write(&bad, "").unwrap();
        assert!(matches!(
            ServiceConfig::from_file(&bad),
            Err(Error::ConfigError(_))
        ));
    }
}
