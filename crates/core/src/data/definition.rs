//! Schema for typed data containers
//!
//! A [`DataBundleDefinition`] is an ordered set of named, shaped entries.
//! It stays mutable until [`DataBundleDefinition::lockdown`] assigns entry
//! indices and hands out an immutable, shareable snapshot.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Unit of an entry's time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Untimed data (text, scalars)
    #[default]
    None,
    /// One step per video/motion frame
    Frame,
    /// One step per audio sample
    AudioSample,
    /// One step per second
    Second,
}

/// A dimension whose size may vary per write, bounded by `min`/`max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSize {
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub default: usize,
}

impl Default for VariableSize {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            default: 1,
        }
    }
}

impl VariableSize {
    pub fn bounded(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            default: min.max(1).min(max),
        }
    }

    /// Clamp `value` into `[min, max]`
    pub fn validate(&self, value: usize) -> usize {
        let mut value = value;
        if let Some(max) = self.max {
            value = value.min(max);
        }
        if let Some(min) = self.min {
            value = value.max(min);
        }
        value
    }

    pub fn contains(&self, value: usize) -> bool {
        self.validate(value) == value
    }
}

/// One axis of an entry shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeDim {
    Fixed(usize),
    Variable(VariableSize),
}

impl ShapeDim {
    /// Variable dimension without bounds
    pub fn var() -> Self {
        ShapeDim::Variable(VariableSize::default())
    }

    fn resolve(&self, reference: Option<usize>) -> usize {
        match (self, reference) {
            (ShapeDim::Fixed(size), _) => *size,
            (ShapeDim::Variable(var), Some(actual)) => var.validate(actual),
            (ShapeDim::Variable(var), None) => var.default,
        }
    }
}

impl From<usize> for ShapeDim {
    fn from(size: usize) -> Self {
        ShapeDim::Fixed(size)
    }
}

impl From<VariableSize> for ShapeDim {
    fn from(var: VariableSize) -> Self {
        ShapeDim::Variable(var)
    }
}

impl fmt::Display for ShapeDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeDim::Fixed(size) => write!(f, "{}", size),
            ShapeDim::Variable(var) => match (var.min, var.max) {
                (None, None) => write!(f, "*"),
                (min, max) => write!(
                    f,
                    "{}..{}",
                    min.map(|v| v.to_string()).unwrap_or_default(),
                    max.map(|v| v.to_string()).unwrap_or_default()
                ),
            },
        }
    }
}

/// A named, shaped field of a data bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBundleEntry {
    pub name: String,
    /// Position within the locked definition, `None` until lockdown
    #[serde(skip)]
    pub index: Option<usize>,
    pub shape: Vec<ShapeDim>,
    /// Index of the time axis, `None` for untimed entries
    pub time_axis: Option<usize>,
    pub sample_rate: u32,
    pub time_unit: TimeUnit,
    pub channel_axis: Option<usize>,
    pub channel_names: Option<Vec<String>>,
}

impl DataBundleEntry {
    /// Audio entry shaped `[channels, *]` with samples on axis 1
    pub fn audio(name: impl Into<String>, channels: usize, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            index: None,
            shape: vec![ShapeDim::Fixed(channels), ShapeDim::var()],
            time_axis: Some(1),
            sample_rate,
            time_unit: TimeUnit::AudioSample,
            channel_axis: None,
            channel_names: None,
        }
    }

    /// Frame-timed entry (video, motion data)
    pub fn framed(
        name: impl Into<String>,
        shape: Vec<ShapeDim>,
        time_axis: usize,
        frame_rate: u32,
        channel_axis: Option<usize>,
        channel_names: Option<Vec<String>>,
    ) -> Result<Self> {
        let name = name.into();
        if channel_axis.is_none() && channel_names.is_some() {
            return Err(Error::InvalidData(format!(
                "entry '{}': channel names given without a channel axis",
                name
            )));
        }
        if time_axis >= shape.len() {
            return Err(Error::InvalidData(format!(
                "entry '{}': time axis {} out of range for {} dimensions",
                name,
                time_axis,
                shape.len()
            )));
        }
        Ok(Self {
            name,
            index: None,
            shape,
            time_axis: Some(time_axis),
            sample_rate: frame_rate,
            time_unit: TimeUnit::Frame,
            channel_axis,
            channel_names,
        })
    }

    /// Untimed text entry
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            shape: vec![ShapeDim::var()],
            time_axis: None,
            sample_rate: 0,
            time_unit: TimeUnit::None,
            channel_axis: None,
            channel_names: None,
        }
    }

    pub fn is_temporal(&self) -> bool {
        self.time_unit != TimeUnit::None
    }

    fn checked_time_axis(&self, ndim: usize) -> Result<usize> {
        match self.time_axis {
            Some(axis) if axis < ndim => Ok(axis),
            _ => Err(Error::InvalidData(format!(
                "entry '{}': invalid time axis {:?} for {} dimensions",
                self.name, self.time_axis, ndim
            ))),
        }
    }

    /// Length of the time axis within `shape`; 0 for untimed entries
    pub fn time_axis_size(&self, shape: &[usize]) -> Result<usize> {
        if !self.is_temporal() {
            return Ok(0);
        }
        let axis = self.checked_time_axis(shape.len())?;
        Ok(shape[axis])
    }

    /// Concrete shape allowed for a write
    ///
    /// Variable dimensions resolve against `reference` when given (clamped to
    /// their bounds), otherwise to their defaults. `time_axis_size` overrides
    /// the time axis.
    pub fn calculate_shape(
        &self,
        time_axis_size: Option<usize>,
        reference: Option<&[usize]>,
    ) -> Result<Vec<usize>> {
        if let Some(reference) = reference {
            if reference.len() != self.shape.len() {
                return Err(Error::ShapeMismatch {
                    entry: self.name.clone(),
                    expected: self.shape_string(),
                    actual: reference.to_vec(),
                });
            }
        }
        let mut result: Vec<usize> = self
            .shape
            .iter()
            .enumerate()
            .map(|(i, dim)| dim.resolve(reference.map(|r| r[i])))
            .collect();
        if let Some(size) = time_axis_size {
            if self.is_temporal() {
                let axis = self.checked_time_axis(result.len())?;
                result[axis] = size;
            }
        }
        Ok(result)
    }

    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("[{}]", dims.join(", "))
    }
}

/// Ordered collection of entries with a designated main entry
#[derive(Debug, Clone, Default)]
pub struct DataBundleDefinition {
    entries: Vec<DataBundleEntry>,
    main_entry: Option<String>,
    conformed: bool,
    locked: bool,
    lockdown_copy: Option<Arc<DataBundleDefinition>>,
}

impl PartialEq for DataBundleDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.main_entry == other.main_entry
    }
}

impl DataBundleDefinition {
    pub fn new() -> Self {
        Self {
            conformed: true,
            ..Default::default()
        }
    }

    /// Definition holding a single entry, which becomes the main entry
    pub fn with_entry(entry: DataBundleEntry) -> Result<Self> {
        let mut definition = Self::new();
        definition.add_entry(entry)?;
        Ok(definition)
    }

    fn mark_dirty(&mut self) {
        self.conformed = false;
        self.lockdown_copy = None;
    }

    /// Append an entry; the first entry added becomes the main entry
    pub fn add_entry(&mut self, entry: DataBundleEntry) -> Result<()> {
        if self.locked {
            return Err(Error::DefinitionLocked);
        }
        if self.entry(&entry.name).is_some() {
            return Err(Error::DuplicateEntry { name: entry.name });
        }
        if self.main_entry.is_none() {
            self.main_entry = Some(entry.name.clone());
        }
        self.entries.push(entry);
        self.mark_dirty();
        Ok(())
    }

    pub fn set_main_entry(&mut self, name: &str) -> Result<()> {
        if self.locked {
            return Err(Error::DefinitionLocked);
        }
        if self.entry(name).is_none() {
            return Err(Error::UnknownEntry {
                name: name.to_string(),
            });
        }
        self.main_entry = Some(name.to_string());
        self.mark_dirty();
        Ok(())
    }

    /// Merge entries from `other`
    ///
    /// A name collision is an error unless `force_override` replaces the
    /// existing entry or `allow_partial_merge` keeps it.
    pub fn update(
        &mut self,
        other: &DataBundleDefinition,
        allow_partial_merge: bool,
        force_override: bool,
    ) -> Result<()> {
        if self.locked {
            return Err(Error::DefinitionLocked);
        }
        for entry in &other.entries {
            let mut entry = entry.clone();
            entry.index = None;
            match self.entries.iter().position(|e| e.name == entry.name) {
                Some(pos) if force_override => self.entries[pos] = entry,
                Some(_) if allow_partial_merge => continue,
                Some(_) => return Err(Error::DuplicateEntry { name: entry.name }),
                None => {
                    if self.main_entry.is_none() {
                        self.main_entry = Some(entry.name.clone());
                    }
                    self.entries.push(entry);
                }
            }
            self.mark_dirty();
        }
        Ok(())
    }

    fn conform(&mut self) {
        if self.conformed {
            return;
        }
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.index = Some(index);
        }
        self.conformed = true;
    }

    /// Freeze the definition
    ///
    /// Returns the same snapshot on repeated calls until the definition is
    /// mutated again. This holds for an already locked definition too.
    pub fn lockdown(&mut self) -> Arc<DataBundleDefinition> {
        if let Some(copy) = &self.lockdown_copy {
            return Arc::clone(copy);
        }
        self.conform();
        let snapshot = Arc::new(DataBundleDefinition {
            entries: self.entries.clone(),
            main_entry: self.main_entry.clone(),
            conformed: true,
            locked: true,
            lockdown_copy: None,
        });
        self.lockdown_copy = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Locked view of a shared definition, freezing a copy if needed
    pub fn to_locked(definition: &Arc<DataBundleDefinition>) -> Arc<DataBundleDefinition> {
        if definition.locked {
            Arc::clone(definition)
        } else {
            let mut copy = (**definition).clone();
            copy.lockdown()
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn entry(&self, name: &str) -> Option<&DataBundleEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[DataBundleEntry] {
        &self.entries
    }

    pub fn main_entry_name(&self) -> Option<&str> {
        self.main_entry.as_deref()
    }

    pub fn main_entry(&self) -> Option<&DataBundleEntry> {
        self.main_entry.as_deref().and_then(|name| self.entry(name))
    }

    pub(crate) fn entry_index(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}
