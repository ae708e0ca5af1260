//! Pre-issued bearer tokens from an external INI-style file.
//!
//! The file bypasses OAuth entirely:
//!
//! ```text
//! # tokens handed to us by the host environment
//! [gdrive]
//! token = "ya29.abc"
//! email = me@example.com
//!
//! [gmail]
//! token = 'ya29.def'
//! ```
//!
//! Recognized sections are `gdrive`, `gmail` and `calendar`; recognized keys
//! are `token` and `email`. Everything else is ignored, and a missing file is
//! not an error.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;
use crate::model::Service;

const KNOWN_SECTIONS: &[&str] = &["gdrive", "gmail", "calendar"];

/// Token and optional account email configured for one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalEntry {
    pub token: String,
    pub email: String,
}

/// Parsed external token config, keyed by lower-cased section name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalTokenConfig {
    sections: HashMap<String, ExternalEntry>,
}

impl ExternalTokenConfig {
    /// Parse file contents. Malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(section.trim().to_lowercase());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some(section) = current.as_deref() else {
                continue;
            };
            if !KNOWN_SECTIONS.contains(&section) {
                continue;
            }

            let value = unquote(value.trim());
            let entry = config.sections.entry(section.to_string()).or_default();
            match key.trim() {
                "token" => entry.token = value.to_string(),
                "email" => entry.email = value.to_string(),
                _ => {}
            }
        }

        config
    }

    /// Entry for a raw section name (`gdrive`, `gmail`, `calendar`).
    pub fn section(&self, name: &str) -> Option<&ExternalEntry> {
        self.sections.get(&name.to_lowercase())
    }

    /// Token configured for a service, if non-empty.
    pub fn token(&self, service: Service) -> Option<&str> {
        self.section(service.external_section())
            .map(|e| e.token.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Token configured for a free-form service label (`drive`, `gmail`, ...).
    pub fn token_for_label(&self, label: &str) -> Option<&str> {
        Service::from_label(label).and_then(|s| self.token(s))
    }

    /// Account email configured for a service, if non-empty.
    pub fn email(&self, service: Service) -> Option<&str> {
        self.section(service.external_section())
            .map(|e| e.email.as_str())
            .filter(|e| !e.is_empty())
    }

    pub fn has_token(&self, service: Service) -> bool {
        self.token(service).is_some()
    }
}

/// Strip one pair of matching single or double quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Read and parse the external config at `path`.
///
/// Returns `Ok(None)` when the file does not exist; any other read failure
/// is an error.
pub fn read_external_config(path: &Path) -> Result<Option<ExternalTokenConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(ExternalTokenConfig::parse(&content))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Supplies the external token config.
///
/// The file is re-read on every call; nothing is cached.
pub trait ExternalConfigReader: Send + Sync {
    fn read(&self) -> Result<Option<ExternalTokenConfig>, ConfigError>;
}

/// Reads the external config from a fixed path.
#[derive(Debug, Clone)]
pub struct FileExternalConfig {
    path: PathBuf,
}

impl FileExternalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExternalConfigReader for FileExternalConfig {
    fn read(&self) -> Result<Option<ExternalTokenConfig>, ConfigError> {
        read_external_config(&self.path)
    }
}

/// Reader that never finds an external config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalConfig;

impl ExternalConfigReader for NoExternalConfig {
    fn read(&self) -> Result<Option<ExternalTokenConfig>, ConfigError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let config = ExternalTokenConfig::parse(
            "[gdrive]\ntoken=abc123\nemail=me@example.com\n\n[gmail]\ntoken=def\n[calendar]\ntoken=ghi\n",
        );

        assert_eq!(config.token(Service::Drive), Some("abc123"));
        assert_eq!(config.email(Service::Drive), Some("me@example.com"));
        assert_eq!(config.token(Service::Gmail), Some("def"));
        assert_eq!(config.token(Service::Calendar), Some("ghi"));
        assert_eq!(config.email(Service::Gmail), None);
    }

    #[test]
    fn test_parse_unquotes_values() {
        let config = ExternalTokenConfig::parse(
            "[gdrive]\ntoken = \"quoted\"\n[gmail]\ntoken='single'\n[calendar]\ntoken=\"mismatched'\n",
        );

        assert_eq!(config.token(Service::Drive), Some("quoted"));
        assert_eq!(config.token(Service::Gmail), Some("single"));
        assert_eq!(config.token(Service::Calendar), Some("\"mismatched'"));
    }

    #[test]
    fn test_parse_skips_comments_and_malformed_lines() {
        let config = ExternalTokenConfig::parse(
            "# comment\n; also comment\n[GDrive]\nnot a pair\n\ntoken=after-junk\nunknown=1\n",
        );

        assert_eq!(config.token(Service::Drive), Some("after-junk"));
    }

    #[test]
    fn test_token_without_section_is_dropped() {
        let config = ExternalTokenConfig::parse("token=orphan\n[gmail]\ntoken=kept\n");

        assert_eq!(config.token(Service::Drive), None);
        assert_eq!(config.token(Service::Gmail), Some("kept"));
    }

    #[test]
    fn test_unknown_section_ignored() {
        let config = ExternalTokenConfig::parse("[sheets]\ntoken=x\n[gdrive]\n");

        assert!(config.section("sheets").is_none());
        assert!(!config.has_token(Service::Drive));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let config = ExternalTokenConfig::parse("[gmail]\ntoken=a=b==\n");
        assert_eq!(config.token(Service::Gmail), Some("a=b=="));
    }

    #[test]
    fn test_token_for_label() {
        let config = ExternalTokenConfig::parse("[gdrive]\ntoken=abc\n");
        assert_eq!(config.token_for_label("drive"), Some("abc"));
        assert_eq!(config.token_for_label("sheets"), None);
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_external_config(&dir.path().join("absent.conf")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_read_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_external_config(dir.path()).is_err());
    }

    #[test]
    fn test_file_reader_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.conf");
        let reader = FileExternalConfig::new(&path);

        std::fs::write(&path, "[gmail]\ntoken=one\n").unwrap();
        assert_eq!(reader.read().unwrap().unwrap().token(Service::Gmail), Some("one"));

        std::fs::write(&path, "[gmail]\ntoken=two\n").unwrap();
        assert_eq!(reader.read().unwrap().unwrap().token(Service::Gmail), Some("two"));
    }
}
