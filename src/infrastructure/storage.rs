//! Macro persistence
//!
//! [`MacroLibrary`] stores [`UartMacro`] documents under their name in any
//! [`KeyValueStore`]. [`FileStore`] keeps one `<key>.json` file per entry.

use crate::domain::error::{DecodeError, ValidationError};
use crate::domain::uart::UartMacro;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

const EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no entry named '{0}'")]
    NotFound(String),

    #[error("an entry named '{0}' already exists")]
    AlreadyExists(String),

    #[error("'{0}' cannot be used as a key")]
    InvalidKey(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Stored keys, sorted
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

fn check_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// One file per key in a directory, created on first save
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, EXTENSION)))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, bytes)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // Nothing saved yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Lock error"))?;
        f(&mut entries)
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        self.with_entries(|e| {
            e.get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        })
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.with_entries(|e| {
            e.insert(key.to_string(), bytes.to_vec());
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.with_entries(|e| {
            e.remove(key)
                .map(|_| ())
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.with_entries(|e| Ok(e.keys().cloned().collect()))
    }
}

#[derive(Debug, Error)]
pub enum MacroLibraryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("stored macro is unreadable: {0}")]
    Decode(#[from] DecodeError),

    #[error("macro could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct MacroLibrary<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> MacroLibrary<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a macro under its name.
    ///
    /// `previous_name` is the name it was loaded under, `None` for a new
    /// macro. Saving over another macro's name fails with `AlreadyExists`;
    /// a rename removes the old entry.
    pub fn save(
        &self,
        uart_macro: &UartMacro,
        previous_name: Option<&str>,
    ) -> Result<(), MacroLibraryError> {
        uart_macro.validate()?;
        let name = uart_macro.name.as_str();

        let renamed = previous_name.is_some_and(|p| p != name);
        if (previous_name.is_none() || renamed) && self.contains(name)? {
            return Err(StorageError::AlreadyExists(name.to_string()).into());
        }

        self.store.save(name, &uart_macro.serialize()?)?;
        if let Some(previous) = previous_name.filter(|_| renamed) {
            match self.store.delete(previous) {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            info!("Renamed macro '{}' to '{}'", previous, name);
        } else {
            info!("Saved macro '{}'", name);
        }
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<UartMacro, MacroLibraryError> {
        let bytes = self.store.load(name)?;
        Ok(UartMacro::deserialize(&bytes)?)
    }

    pub fn delete(&self, name: &str) -> Result<(), MacroLibraryError> {
        self.store.delete(name)?;
        info!("Deleted macro '{}'", name);
        Ok(())
    }

    /// Names of the stored macros, sorted
    pub fn list(&self) -> Result<Vec<String>, MacroLibraryError> {
        Ok(self.store.keys()?)
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.store.keys()?.iter().any(|k| k == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::uart::UartCommand;

    fn sample(name: &str) -> UartMacro {
        let mut m = UartMacro::new(name, 100);
        m.push(UartCommand::text("Play", "Play"));
        m.push(UartCommand::data(vec![0xA0, 0x01], "Rewind"));
        m
    }

    fn temp_store() -> FileStore {
        FileStore::new(std::env::temp_dir().join(format!("ble_toolbox_macros_{}", uuid::Uuid::new_v4())))
    }

    #[test]
    fn test_save_and_load() {
        let library = MacroLibrary::new(MemoryStore::new());
        library.save(&sample("Media"), None).unwrap();
        assert_eq!(library.load("Media").unwrap(), sample("Media"));
        assert_eq!(library.list().unwrap(), vec!["Media".to_string()]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let library = MacroLibrary::new(MemoryStore::new());
        assert!(matches!(
            library.save(&sample(""), None),
            Err(MacroLibraryError::Validation(ValidationError::EmptyName))
        ));
        assert!(library.list().unwrap().is_empty());
    }

    #[test]
    fn test_new_macro_does_not_overwrite() {
        let library = MacroLibrary::new(MemoryStore::new());
        library.save(&sample("Media"), None).unwrap();
        assert!(matches!(
            library.save(&UartMacro::new("Media", 0), None),
            Err(MacroLibraryError::Storage(StorageError::AlreadyExists(_)))
        ));
        assert_eq!(library.load("Media").unwrap(), sample("Media"));
    }

    #[test]
    fn test_edit_in_place() {
        let library = MacroLibrary::new(MemoryStore::new());
        library.save(&sample("Media"), None).unwrap();
        let mut edited = sample("Media");
        edited.delay_ms = 0;
        library.save(&edited, Some("Media")).unwrap();
        assert_eq!(library.load("Media").unwrap().delay_ms, 0);
    }

    #[test]
    fn test_rename_removes_previous() {
        let library = MacroLibrary::new(MemoryStore::new());
        library.save(&sample("Media"), None).unwrap();
        library.save(&sample("Player"), Some("Media")).unwrap();
        assert_eq!(library.list().unwrap(), vec!["Player".to_string()]);

        library.save(&sample("Other"), None).unwrap();
        assert!(matches!(
            library.save(&sample("Other"), Some("Player")),
            Err(MacroLibraryError::Storage(StorageError::AlreadyExists(_)))
        ));
        assert_eq!(library.list().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_document() {
        let store = MemoryStore::new();
        store.save("Broken", b"{\"name\":").unwrap();
        let library = MacroLibrary::new(store);
        assert!(matches!(
            library.load("Broken"),
            Err(MacroLibraryError::Decode(DecodeError::InvalidDocument(_)))
        ));
    }

    #[test]
    fn test_delete_missing() {
        let library = MacroLibrary::new(MemoryStore::new());
        assert!(matches!(
            library.delete("Nope"),
            Err(MacroLibraryError::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let store = temp_store();
        assert!(store.keys().unwrap().is_empty());

        let library = MacroLibrary::new(store.clone());
        library.save(&sample("b"), None).unwrap();
        library.save(&sample("a"), None).unwrap();
        assert_eq!(library.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.root().join("a.json").exists());
        assert_eq!(library.load("b").unwrap(), sample("b"));

        library.delete("a").unwrap();
        assert!(matches!(
            store.load("a"),
            Err(StorageError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn test_invalid_keys() {
        let store = temp_store();
        for key in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                store.save(key, b"{}"),
                Err(StorageError::InvalidKey(_))
            ));
        }
        assert!(!store.root().exists());
    }
}
