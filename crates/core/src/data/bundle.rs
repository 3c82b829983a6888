//! Shape-checked payload bound to a locked definition

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::definition::{DataBundleDefinition, DataBundleEntry};
use super::event::EventData;
use super::store::{DataArray, DataStore, DataValue};
use crate::{Error, Result};

/// One modality's payload with metadata and stream-boundary flags
#[derive(Debug, Clone)]
pub struct DataBundle {
    definition: Arc<DataBundleDefinition>,
    stores: Vec<DataStore>,
    metadata: HashMap<String, Value>,
    events: Vec<EventData>,
    pub start_of_stream: bool,
    pub end_of_stream: bool,
}

impl DataBundle {
    /// Create an empty bundle; an unlocked definition is frozen first
    pub fn new(definition: &Arc<DataBundleDefinition>) -> Self {
        let definition = DataBundleDefinition::to_locked(definition);
        let stores = vec![DataStore::default(); definition.entries().len()];
        Self {
            definition,
            stores,
            metadata: HashMap::new(),
            events: Vec::new(),
            start_of_stream: false,
            end_of_stream: false,
        }
    }

    pub fn definition(&self) -> &Arc<DataBundleDefinition> {
        &self.definition
    }

    fn resolve(&self, name: &str) -> Result<(usize, &DataBundleEntry)> {
        let index = self
            .definition
            .entry_index(name)
            .ok_or_else(|| Error::UnknownEntry {
                name: name.to_string(),
            })?;
        Ok((index, &self.definition.entries()[index]))
    }

    /// Write an entry, validating array shapes against the definition
    pub fn set_data(&mut self, name: &str, value: impl Into<DataValue>) -> Result<()> {
        let value = value.into();
        let (index, entry) = self.resolve(name)?;
        if let DataValue::Array(array) = &value {
            validate_array(entry, array)?;
        }
        self.stores[index].set(value);
        Ok(())
    }

    pub fn set_main_data(&mut self, value: impl Into<DataValue>) -> Result<()> {
        let name = self
            .definition
            .main_entry_name()
            .ok_or_else(|| Error::InvalidData("definition has no main entry".to_string()))?
            .to_string();
        self.set_data(&name, value)
    }

    /// Read an entry; `None` when the name is unknown or nothing was written
    pub fn get_data(&self, name: &str) -> Option<&DataValue> {
        let index = self.definition.entry_index(name)?;
        self.stores[index].value()
    }

    pub fn get_main_data(&self) -> Option<&DataValue> {
        self.get_data(self.definition.main_entry_name()?)
    }

    pub fn take_main_data(&mut self) -> Option<DataValue> {
        let index = self
            .definition
            .entry_index(self.definition.main_entry_name()?)?;
        self.stores[index].take()
    }

    pub fn data_store(&self, name: &str) -> Option<&DataStore> {
        let index = self.definition.entry_index(name)?;
        self.stores.get(index)
    }

    /// Time-axis length of a written array entry
    pub fn time_axis_size(&self, name: &str) -> Result<usize> {
        let (index, entry) = self.resolve(name)?;
        match self.stores[index].value() {
            Some(DataValue::Array(array)) => entry.time_axis_size(array.shape()),
            _ => Ok(0),
        }
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn meta_bool(&self, key: &str, default: bool) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn add_event(&mut self, event: EventData) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[EventData] {
        &self.events
    }
}

fn validate_array(entry: &DataBundleEntry, array: &DataArray) -> Result<()> {
    let shape = array.shape();
    let time_size = entry.time_axis_size(shape)?;
    if time_size == 0 {
        return Err(Error::ShapeMismatch {
            entry: entry.name.clone(),
            expected: format!("{} with a non-empty time axis", entry.shape_string()),
            actual: shape.to_vec(),
        });
    }
    let allowed = entry.calculate_shape(Some(time_size), Some(shape))?;
    if allowed != shape {
        return Err(Error::ShapeMismatch {
            entry: entry.name.clone(),
            expected: format!("{:?}", allowed),
            actual: shape.to_vec(),
        });
    }
    Ok(())
}

impl fmt::Display for DataBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut valid = Vec::new();
        let mut missing = Vec::new();
        for (entry, store) in self.definition.entries().iter().zip(&self.stores) {
            match store.value() {
                Some(DataValue::Array(array)) => {
                    let length = entry.time_axis_size(array.shape()).unwrap_or(0);
                    valid.push(format!("{}: length={} {:?}", entry.name, length, entry.time_unit));
                }
                Some(DataValue::Text(text)) => valid.push(format!("{}: {}", entry.name, text)),
                None => missing.push(entry.name.clone()),
            }
        }
        write!(f, "DataBundle:")?;
        if !valid.is_empty() {
            write!(f, " ValidData=[{}];", valid.join(", "))?;
        }
        if !self.metadata.is_empty() {
            let mut meta: Vec<String> = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            meta.sort();
            write!(f, " Meta=[{}];", meta.join(", "))?;
        }
        if !missing.is_empty() {
            write!(f, " MissingData=[{}];", missing.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::definition::{ShapeDim, VariableSize};
    use ndarray::Array2;

    fn audio_definition() -> Arc<DataBundleDefinition> {
        let mut def = DataBundleDefinition::new();
        def.add_entry(DataBundleEntry::audio("mic_audio", 1, 16000))
            .unwrap();
        def.add_entry(DataBundleEntry::text("caption")).unwrap();
        def.lockdown()
    }

    #[test]
    fn test_audio_write_checks_channel_dimension() {
        let mut bundle = DataBundle::new(&audio_definition());

        bundle
            .set_data("mic_audio", Array2::<f32>::zeros((1, 3200)))
            .unwrap();
        assert_eq!(bundle.time_axis_size("mic_audio").unwrap(), 3200);

        let err = bundle
            .set_data("mic_audio", Array2::<f32>::zeros((2, 3200)))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        // The earlier write survives a rejected one
        assert_eq!(bundle.time_axis_size("mic_audio").unwrap(), 3200);
    }

    #[test]
    fn test_empty_time_axis_rejected() {
        let mut bundle = DataBundle::new(&audio_definition());
        let err = bundle
            .set_data("mic_audio", Array2::<f32>::zeros((1, 0)))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_variable_bounds_enforced() {
        let mut def = DataBundleDefinition::new();
        def.add_entry(DataBundleEntry {
            shape: vec![ShapeDim::Fixed(1), VariableSize::bounded(1, 100).into()],
            ..DataBundleEntry::audio("short", 1, 16000)
        })
        .unwrap();
        let mut bundle = DataBundle::new(&def.lockdown());
        assert!(bundle.set_data("short", Array2::<f32>::zeros((1, 100))).is_ok());
        assert!(bundle.set_data("short", Array2::<f32>::zeros((1, 101))).is_err());
    }

    #[test]
    fn test_unknown_entry_and_text() {
        let mut bundle = DataBundle::new(&audio_definition());
        assert!(matches!(
            bundle.set_data("nope", "text"),
            Err(Error::UnknownEntry { .. })
        ));
        bundle.set_data("caption", "hello").unwrap();
        assert_eq!(
            bundle.get_data("caption").and_then(DataValue::as_text),
            Some("hello")
        );
        assert!(bundle.get_data("nope").is_none());
    }

    #[test]
    fn test_main_data_and_meta() {
        let mut bundle = DataBundle::new(&audio_definition());
        assert!(bundle.get_main_data().is_none());
        bundle
            .set_main_data(Array2::<f32>::zeros((1, 160)))
            .unwrap();
        assert!(bundle.get_main_data().is_some());

        bundle.add_meta("speech_id", "s-1");
        bundle.add_meta("avatar_speech_end", true);
        assert_eq!(bundle.meta_str("speech_id"), Some("s-1"));
        assert!(bundle.meta_bool("avatar_speech_end", false));
        assert!(!bundle.meta_bool("missing", false));
        assert!(bundle.to_string().contains("MissingData=[caption]"));
    }

    #[test]
    fn test_bundle_freezes_unlocked_definition() {
        let mut def = DataBundleDefinition::new();
        def.add_entry(DataBundleEntry::text("t")).unwrap();
        let bundle = DataBundle::new(&Arc::new(def));
        assert!(bundle.definition().is_locked());
    }
}
