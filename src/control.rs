//! Control surface boundary.
//!
//! The on/off preference and the toggle that flips it live outside the core.
//! This module fixes their interface:
//!
//! - [`ControlMessage`] / [`Ack`]: the JSON messages exchanged with the
//!   controller (`{"action":"toggle","enabled":true}` → `{"success":true}`).
//! - [`PreferenceStore`]: one boolean under [`ENABLED_KEY`]. The controller
//!   only reads it, once, at startup.
//! - [`ControlSurface`]: the toggle logic of a control surface on top of a
//!   store.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Preference key holding the enabled flag.
pub const ENABLED_KEY: &str = "enabled";

const TOGGLE_ACTION: &str = "toggle";

/// Message sent by a control surface.
///
/// Both fields are optional on the wire; only a `toggle` action carrying a
/// boolean `enabled` changes controller state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ControlMessage {
    pub fn toggle(enabled: bool) -> Self {
        ControlMessage { action: Some(TOGGLE_ACTION.to_string()), enabled: Some(enabled) }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The requested state, if this is a well-formed toggle.
    pub fn toggle_target(&self) -> Option<bool> {
        if self.action.as_deref() != Some(TOGGLE_ACTION) {
            return None;
        }
        self.enabled
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Acknowledgment returned for every control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { success: true }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "success": self.success }).to_string()
    }
}

pub trait PreferenceStore {
    /// `Ok(None)` when the preference has never been recorded.
    fn get_enabled(&self) -> Result<Option<bool>, Error>;
    fn set_enabled(&self, enabled: bool) -> Result<(), Error>;
}

/// Startup resolution: absent or unreadable means enabled.
pub(crate) fn resolve_enabled<P: PreferenceStore + ?Sized>(prefs: &P) -> bool {
    match prefs.get_enabled() {
        Ok(value) => value.unwrap_or(true),
        Err(err) => {
            warn!(%err, "preference unreadable; defaulting to enabled");
            true
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    enabled: Cell<Option<bool>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(enabled: bool) -> Self {
        MemoryPreferences { enabled: Cell::new(Some(enabled)) }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_enabled(&self) -> Result<Option<bool>, Error> {
        Ok(self.enabled.get())
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.enabled.set(Some(enabled));
        Ok(())
    }
}

/// Preferences kept in a JSON object file. A missing file is an empty store;
/// keys other than [`ENABLED_KEY`] are preserved on write.
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFilePreferences { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, Error> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => return Err(Error::PreferenceIo { path: self.path.clone(), source }),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw).map_err(|source| Error::PreferenceFormat { path: self.path.clone(), source })
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get_enabled(&self) -> Result<Option<bool>, Error> {
        Ok(self.load()?.get(ENABLED_KEY).and_then(Value::as_bool))
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), Error> {
        let mut map = self.load()?;
        map.insert(ENABLED_KEY.to_string(), Value::Bool(enabled));

        let body = serde_json::to_string_pretty(&map)
            .map_err(|source| Error::PreferenceFormat { path: self.path.clone(), source })?;
        fs::write(&self.path, body).map_err(|source| Error::PreferenceIo { path: self.path.clone(), source })
    }
}

/// Toggle logic of a control surface.
#[derive(Debug)]
pub struct ControlSurface<P> {
    prefs: P,
}

impl<P: PreferenceStore> ControlSurface<P> {
    pub fn new(prefs: P) -> Self {
        ControlSurface { prefs }
    }

    pub fn prefs(&self) -> &P {
        &self.prefs
    }

    /// Current state. The first read of an unset preference records the
    /// enabled default.
    pub fn current(&self) -> Result<bool, Error> {
        match self.prefs.get_enabled()? {
            Some(enabled) => Ok(enabled),
            None => {
                self.prefs.set_enabled(true)?;
                Ok(true)
            }
        }
    }

    /// Flip and persist the preference; returns the message to deliver to
    /// the controller.
    pub fn toggle(&self) -> Result<ControlMessage, Error> {
        let next = !self.current()?;
        self.prefs.set_enabled(next)?;
        Ok(ControlMessage::toggle(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch_path(name: &str) -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("wordswap-{}-{}-{n}.json", std::process::id(), name))
    }

    #[test]
    fn toggle_message_round_trips_through_json() {
        let msg = ControlMessage::toggle(false);
        let raw = msg.to_json().unwrap();

        assert_eq!(raw, r#"{"action":"toggle","enabled":false}"#);
        assert_eq!(ControlMessage::parse(&raw).unwrap().toggle_target(), Some(false));
    }

    #[test]
    fn absent_fields_are_omitted_from_json() {
        let msg = ControlMessage { action: None, enabled: Some(true) };
        assert_eq!(msg.to_json().unwrap(), r#"{"enabled":true}"#);
        assert_eq!(ControlMessage::default().to_json().unwrap(), "{}");
    }

    #[test]
    fn only_a_boolean_toggle_has_a_target() {
        assert_eq!(ControlMessage::parse(r#"{"action":"toggle"}"#).unwrap().toggle_target(), None);
        assert_eq!(ControlMessage::parse(r#"{"action":"refresh","enabled":true}"#).unwrap().toggle_target(), None);
        assert!(ControlMessage::parse(r#"{"action":"toggle","enabled":"yes"}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn ack_serializes_as_success_object() {
        assert_eq!(Ack::ok().to_json(), r#"{"success":true}"#);
    }

    #[test]
    fn unset_preference_resolves_to_enabled() {
        assert!(resolve_enabled(&MemoryPreferences::new()));
        assert!(!resolve_enabled(&MemoryPreferences::with_enabled(false)));
    }

    #[test]
    fn surface_records_default_then_flips() {
        let surface = ControlSurface::new(MemoryPreferences::new());

        assert!(surface.current().unwrap());
        assert_eq!(surface.prefs().get_enabled().unwrap(), Some(true));

        assert_eq!(surface.toggle().unwrap(), ControlMessage::toggle(false));
        assert_eq!(surface.toggle().unwrap(), ControlMessage::toggle(true));
    }

    #[test]
    fn json_file_store_keeps_other_keys() {
        let path = scratch_path("keys");
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();
        let prefs = JsonFilePreferences::new(&path);

        assert_eq!(prefs.get_enabled().unwrap(), None);
        prefs.set_enabled(false).unwrap();
        assert_eq!(prefs.get_enabled().unwrap(), Some(false));

        let map: Map<String, Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(map.get("theme"), Some(&Value::String("dark".to_string())));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let prefs = JsonFilePreferences::new(scratch_path("missing"));
        assert_eq!(prefs.get_enabled().unwrap(), None);
    }

    #[test]
    fn malformed_file_is_reported_and_resolves_to_enabled() {
        let path = scratch_path("malformed");
        fs::write(&path, "{ nope").unwrap();
        let prefs = JsonFilePreferences::new(&path);

        assert!(matches!(prefs.get_enabled(), Err(Error::PreferenceFormat { .. })));
        assert!(resolve_enabled(&prefs));
        fs::remove_file(&path).unwrap();
    }
}
