use crate::domain::racp::ReportScope;
use crate::infrastructure::bluetooth::transport::WriteType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_toolbox".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseSettings {
    /// Records requested when the profile becomes ready
    #[serde(default)]
    pub default_scope: ReportScope,
    #[serde(default = "default_true")]
    pub auto_report_on_ready: bool,
    /// Give up on a RACP request after this long; 0 waits forever
    #[serde(default = "default_racp_timeout_ms")]
    pub racp_timeout_ms: u64,
}

impl Default for GlucoseSettings {
    fn default() -> Self {
        Self {
            default_scope: ReportScope::All,
            auto_report_on_ready: default_true(),
            racp_timeout_ms: default_racp_timeout_ms(),
        }
    }
}

fn default_racp_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartSettings {
    /// Longest single write to the RX characteristic (ATT MTU - 3)
    #[serde(default = "default_max_write_len")]
    pub max_write_len: usize,
    #[serde(default = "default_write_type")]
    pub write_type: WriteType,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            max_write_len: default_max_write_len(),
            write_type: default_write_type(),
        }
    }
}

fn default_max_write_len() -> usize {
    20
}
fn default_write_type() -> WriteType {
    WriteType::WithoutResponse
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub glucose: GlucoseSettings,
    #[serde(default)]
    pub uart: UartSettings,
    /// Where macros are stored; the platform data directory when unset
    #[serde(default)]
    pub macro_dir: Option<String>,
    #[serde(default)]
    pub last_peripheral: Option<String>,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is
    /// missing or unreadable
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleToolbox");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Directory for saved macros
    pub fn macro_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.settings.macro_dir {
            return Ok(PathBuf::from(dir));
        }
        let mut path = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        path.push("BleToolbox");
        path.push("macros");
        Ok(path)
    }

    pub fn set_last_peripheral(&mut self, peripheral_id: &str) -> anyhow::Result<()> {
        if self.settings.last_peripheral.as_deref() != Some(peripheral_id) {
            self.settings.last_peripheral = Some(peripheral_id.to_string());
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("ble_toolbox_settings_{}", uuid::Uuid::new_v4()))
            .join("settings.json")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let service = SettingsService::with_path(temp_path());
        let s = service.get();
        assert_eq!(s.glucose.default_scope, ReportScope::All);
        assert!(s.glucose.auto_report_on_ready);
        assert_eq!(s.uart.max_write_len, 20);
        assert_eq!(s.log_settings.level, "info");
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"glucose": {"default_scope": "last"}}"#).unwrap();
        assert_eq!(s.glucose.default_scope, ReportScope::Last);
        assert_eq!(s.glucose.racp_timeout_ms, 30_000);
        assert_eq!(s.uart.write_type, WriteType::WithoutResponse);
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path();
        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().glucose.racp_timeout_ms = 5;
        service.set_last_peripheral("AA:BB").unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.get().glucose.racp_timeout_ms, 5);
        assert_eq!(reloaded.get().last_peripheral.as_deref(), Some("AA:BB"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_explicit_macro_dir() {
        let mut service = SettingsService::with_path(temp_path());
        service.get_mut().macro_dir = Some("/tmp/macros".to_string());
        assert_eq!(service.macro_dir().unwrap(), PathBuf::from("/tmp/macros"));
    }
}
