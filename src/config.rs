//! Mapping configuration for joy2hid
//!
//! The mapping table is a JSON document that maps normalized input event
//! names to keyboard output rules. It is loaded once at startup and can be
//! replaced at runtime through a [`MappingHandle`].
//!
//! ## Config File Location
//!
//! Defaults to `~/.config/joy2hid/mappings.json` on Linux. A missing file is
//! replaced by the built-in gamepad layout, which is written back immediately.
//!
//! ## Document Shape
//!
//! ```json
//! {
//!   "device_name": "Default Gamepad",
//!   "mappings": {
//!     "BTN_A": { "type": "keyboard", "key": "SPACE" },
//!     "BTN_TR": { "type": "keyboard_combo", "combo": ["LEFTCTRL", "C"] },
//!     "ABS_HAT0X": { "type": "dpad_horizontal", "positive_key": "RIGHT", "negative_key": "LEFT" }
//!   }
//! }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use joy2hid::config::{MappingEntry, MappingTable};
//!
//! let mut table = MappingTable::load("mappings.json").expect("bad config");
//! table.upsert("BTN_TL", MappingEntry::key("Q"));
//! table.persist().expect("Failed to save config");
//! ```

use crate::input;
use crate::keyboard::keymap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Config file is not a valid mapping document
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Returns the path to the mapping file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("joy2hid");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("mappings.json"))
}

/// Which hat/stick direction a d-pad mapping covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpadOrientation {
    Horizontal,
    Vertical,
}

/// How one input event is turned into keyboard output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntryDocument", into = "EntryDocument")]
pub enum MappingEntry {
    /// One key, pressed while the input is non-zero
    KeySingle {
        key: String,
        description: Option<String>,
    },
    /// A chord; modifier names go to the modifier byte
    KeyCombo {
        keys: Vec<String>,
        description: Option<String>,
    },
    /// Signed axis driving two mutually exclusive keys
    DpadAxis {
        orientation: DpadOrientation,
        positive_key: String,
        negative_key: String,
        description: Option<String>,
    },
}

impl MappingEntry {
    pub fn key(key: impl Into<String>) -> Self {
        MappingEntry::KeySingle {
            key: key.into(),
            description: None,
        }
    }

    pub fn combo<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MappingEntry::KeyCombo {
            keys: keys.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    pub fn dpad(
        orientation: DpadOrientation,
        positive_key: impl Into<String>,
        negative_key: impl Into<String>,
    ) -> Self {
        MappingEntry::DpadAxis {
            orientation,
            positive_key: positive_key.into(),
            negative_key: negative_key.into(),
            description: None,
        }
    }

    /// Parse a single entry, e.g. `{"type":"keyboard","key":"SPACE"}`
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Parse)
    }

    /// Attach a human-readable description
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            MappingEntry::KeySingle { description, .. }
            | MappingEntry::KeyCombo { description, .. }
            | MappingEntry::DpadAxis { description, .. } => *description = text,
        }
        self
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            MappingEntry::KeySingle { description, .. }
            | MappingEntry::KeyCombo { description, .. }
            | MappingEntry::DpadAxis { description, .. } => description.as_deref(),
        }
    }

    /// The `type` tag used in the JSON document
    pub fn type_name(&self) -> &'static str {
        match self {
            MappingEntry::KeySingle { .. } => "keyboard",
            MappingEntry::KeyCombo { .. } => "keyboard_combo",
            MappingEntry::DpadAxis {
                orientation: DpadOrientation::Horizontal,
                ..
            } => "dpad_horizontal",
            MappingEntry::DpadAxis {
                orientation: DpadOrientation::Vertical,
                ..
            } => "dpad_vertical",
        }
    }

    /// All key names referenced by this entry
    pub fn key_names(&self) -> Vec<&str> {
        match self {
            MappingEntry::KeySingle { key, .. } => vec![key.as_str()],
            MappingEntry::KeyCombo { keys, .. } => keys.iter().map(String::as_str).collect(),
            MappingEntry::DpadAxis {
                positive_key,
                negative_key,
                ..
            } => vec![positive_key.as_str(), negative_key.as_str()],
        }
    }
}

/// On-disk form of a mapping entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EntryDocument {
    Keyboard {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    KeyboardCombo {
        combo: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    DpadHorizontal {
        positive_key: String,
        negative_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    DpadVertical {
        positive_key: String,
        negative_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl From<EntryDocument> for MappingEntry {
    fn from(doc: EntryDocument) -> Self {
        match doc {
            EntryDocument::Keyboard { key, description } => {
                MappingEntry::KeySingle { key, description }
            }
            EntryDocument::KeyboardCombo { combo, description } => MappingEntry::KeyCombo {
                keys: combo,
                description,
            },
            EntryDocument::DpadHorizontal {
                positive_key,
                negative_key,
                description,
            } => MappingEntry::DpadAxis {
                orientation: DpadOrientation::Horizontal,
                positive_key,
                negative_key,
                description,
            },
            EntryDocument::DpadVertical {
                positive_key,
                negative_key,
                description,
            } => MappingEntry::DpadAxis {
                orientation: DpadOrientation::Vertical,
                positive_key,
                negative_key,
                description,
            },
        }
    }
}

impl From<MappingEntry> for EntryDocument {
    fn from(entry: MappingEntry) -> Self {
        match entry {
            MappingEntry::KeySingle { key, description } => {
                EntryDocument::Keyboard { key, description }
            }
            MappingEntry::KeyCombo { keys, description } => EntryDocument::KeyboardCombo {
                combo: keys,
                description,
            },
            MappingEntry::DpadAxis {
                orientation,
                positive_key,
                negative_key,
                description,
            } => match orientation {
                DpadOrientation::Horizontal => EntryDocument::DpadHorizontal {
                    positive_key,
                    negative_key,
                    description,
                },
                DpadOrientation::Vertical => EntryDocument::DpadVertical {
                    positive_key,
                    negative_key,
                    description,
                },
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default = "default_device_name")]
    device_name: String,
    #[serde(default)]
    mappings: BTreeMap<String, MappingEntry>,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

/// Event name -> mapping rule, plus the file it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    device_name: String,
    mappings: BTreeMap<String, MappingEntry>,
    path: PathBuf,
}

impl MappingTable {
    /// Empty table backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            device_name: default_device_name(),
            mappings: BTreeMap::new(),
            path: path.into(),
        }
    }

    /// The built-in gamepad layout: face buttons, start/select and the hat
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        let mut table = Self::new(path);
        table.device_name = "Default Gamepad".to_string();

        table.upsert("BTN_A", MappingEntry::key("SPACE").with_description("Jump/Confirm"));
        table.upsert("BTN_B", MappingEntry::key("ESC").with_description("Cancel/Back"));
        table.upsert("BTN_X", MappingEntry::key("X").with_description("Attack"));
        table.upsert("BTN_Y", MappingEntry::key("Y").with_description("Special"));
        table.upsert("BTN_START", MappingEntry::key("ENTER").with_description("Start/Pause"));
        table.upsert("BTN_SELECT", MappingEntry::key("TAB").with_description("Select/Menu"));
        table.upsert(
            "ABS_HAT0X",
            MappingEntry::dpad(DpadOrientation::Horizontal, "RIGHT", "LEFT")
                .with_description("D-pad Left/Right"),
        );
        table.upsert(
            "ABS_HAT0Y",
            MappingEntry::dpad(DpadOrientation::Vertical, "DOWN", "UP")
                .with_description("D-pad Up/Down"),
        );

        table
    }

    /// Load the table from `path`.
    ///
    /// A missing file is not an error: the default layout is created and
    /// persisted. Any other read or parse failure is returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            warn!("Config file not found: {}", path.display());
            let table = Self::with_defaults(path);
            table.persist()?;
            info!("Created default configuration at {}", path.display());
            return Ok(table);
        }

        let contents = fs::read_to_string(path)?;
        let table = Self::from_json_str(&contents, path)?;

        info!(
            "Loaded configuration for {} ({} mappings)",
            table.device_name,
            table.len()
        );
        table.report_problems();

        Ok(table)
    }

    /// Load from the default config location
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_path()?;
        Self::load(path)
    }

    /// Parse a whole mapping document
    pub fn from_json_str(json: &str, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        Ok(Self {
            device_name: doc.device_name,
            mappings: doc.mappings,
            path: path.into(),
        })
    }

    /// Serialize the whole mapping document
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let doc = ConfigDocument {
            device_name: self.device_name.clone(),
            mappings: self.mappings.clone(),
        };
        serde_json::to_string_pretty(&doc).map_err(ConfigError::Serialize)
    }

    /// Write the table to its backing file, creating parent directories
    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = self.to_json_string()?;
        fs::write(&self.path, contents)?;
        info!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    /// Re-read the backing file in place
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        *self = Self::load(&self.path)?;
        Ok(())
    }

    pub fn lookup(&self, event_name: &str) -> Option<&MappingEntry> {
        self.mappings.get(event_name)
    }

    /// Insert or replace the rule for an event, returning the old one
    pub fn upsert(
        &mut self,
        event_name: impl Into<String>,
        entry: MappingEntry,
    ) -> Option<MappingEntry> {
        self.mappings.insert(event_name.into(), entry)
    }

    /// Remove the rule for an event. Returns false if there was none.
    pub fn remove(&mut self, event_name: &str) -> bool {
        self.mappings.remove(event_name).is_some()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_device_name(&mut self, name: impl Into<String>) {
        self.device_name = name.into();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MappingEntry)> {
        self.mappings.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    /// `(event, key)` pairs whose key name is outside the HID vocabulary
    pub fn unknown_keys(&self) -> Vec<(String, String)> {
        self.entries()
            .flat_map(|(event, entry)| {
                entry
                    .key_names()
                    .into_iter()
                    .filter(|key| keymap::usage_for(key).is_none())
                    .map(move |key| (event.to_string(), key.to_string()))
            })
            .collect()
    }

    /// Mapped event names that no input event will ever carry
    pub fn unreachable_events(&self) -> Vec<&str> {
        self.event_names()
            .filter(|name| !input::is_event_name(name))
            .collect()
    }

    /// Warn about entries that can never produce output
    fn report_problems(&self) {
        for (event, key) in self.unknown_keys() {
            warn!("Mapping for {} uses unknown key {}", event, key);
        }
        for event in self.unreachable_events() {
            match input::canonical_event_name(event) {
                Some(canonical) => warn!(
                    "Mapping for {} never fires: that button is reported as {}",
                    event, canonical
                ),
                None => warn!("Mapping for {} never fires: no input event has that name", event),
            }
        }
    }
}

/// Shared, atomically swappable mapping table.
///
/// Readers take a snapshot and keep using it for the duration of one event;
/// writers clone the current table, edit the clone, persist it and only then
/// swap it in. A reader never sees a half-edited table.
#[derive(Debug, Clone)]
pub struct MappingHandle {
    current: Arc<RwLock<Arc<MappingTable>>>,
    writer: Arc<Mutex<()>>,
}

impl MappingHandle {
    pub fn new(table: MappingTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// The table as of now
    pub fn snapshot(&self) -> Arc<MappingTable> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new table without persisting it
    pub fn replace(&self, table: MappingTable) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Copy, edit, persist, swap. If persisting fails the live table is untouched.
    pub fn update<F, R>(&self, edit: F) -> Result<R, ConfigError>
    where
        F: FnOnce(&mut MappingTable) -> R,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = (*self.snapshot()).clone();
        let result = edit(&mut next);
        next.persist()?;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(result)
    }

    /// Add or replace the rule for one event and persist
    pub fn set_mapping(
        &self,
        event_name: &str,
        entry: MappingEntry,
    ) -> Result<Option<MappingEntry>, ConfigError> {
        let previous = self.update(|table| table.upsert(event_name, entry))?;
        self.snapshot().report_problems();
        info!("Mapped {}", event_name);
        Ok(previous)
    }

    /// Drop the rule for one event and persist. Returns whether it existed.
    pub fn remove_mapping(&self, event_name: &str) -> Result<bool, ConfigError> {
        let removed = self.update(|table| table.remove(event_name))?;
        if removed {
            info!("Removed mapping for {}", event_name);
        }
        Ok(removed)
    }

    pub fn rename_device(&self, name: &str) -> Result<(), ConfigError> {
        self.update(|table| table.set_device_name(name))?;
        info!("Device renamed to {}", name);
        Ok(())
    }

    /// Replace name and every mapping with a whole document, keeping the
    /// backing file. Returns the number of mappings imported.
    pub fn import_json(&self, json: &str) -> Result<usize, ConfigError> {
        let imported = MappingTable::from_json_str(json, PathBuf::new())?;
        let count = self.update(move |table| {
            table.device_name = imported.device_name;
            table.mappings = imported.mappings;
            table.len()
        })?;
        self.snapshot().report_problems();
        info!("Imported {} mappings", count);
        Ok(count)
    }

    /// Re-read the backing file and swap it in
    pub fn reload(&self) -> Result<(), ConfigError> {
        let path = self.snapshot().path().to_path_buf();
        self.replace(MappingTable::load(path)?);
        Ok(())
    }
}
