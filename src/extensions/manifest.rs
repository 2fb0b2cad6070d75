//! Extension manifest parsing.
//!
//! Each extension directory carries a `package.json` that doubles as its
//! manifest. Besides the usual npm fields it defines:
//! - Display metadata (title, description, icon)
//! - Commands (searchable, runnable units)
//! - Third-party dependencies that must be installed before bundling
//!
//! Command entries are parsed one by one so that a single malformed entry
//! only removes itself, never the rest of the extension.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::{ExtensionError, ExtensionResult};

/// File name of the manifest inside an extension directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Manifest parsed from an extension's `package.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// npm package name (informational, the extension id is the directory name).
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,

    /// Human-readable display name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    /// Short description.
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    /// Icon filename, looked up in `assets/` then the extension root.
    #[serde(default)]
    pub icon: Option<String>,

    /// Declared commands; malformed entries are dropped while parsing.
    #[serde(default, deserialize_with = "lenient_commands")]
    pub commands: Vec<CommandConfig>,

    /// Runtime dependencies (`name -> version range`).
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,

    /// Extension-wide preferences shared by all commands.
    #[serde(default, deserialize_with = "lenient_preferences")]
    pub preferences: Vec<PreferenceConfig>,
}

impl ExtensionManifest {
    /// Load the manifest from an extension directory.
    pub fn load(extension_dir: &Path) -> ExtensionResult<Self> {
        let manifest_path = extension_dir.join(MANIFEST_FILE);

        if !manifest_path.exists() {
            return Err(ExtensionError::ManifestNotFound(
                extension_dir.to_path_buf(),
            ));
        }

        let content = std::fs::read_to_string(&manifest_path)?;

        serde_json::from_str(&content).map_err(|e| ExtensionError::ManifestInvalid {
            path: manifest_path,
            message: e.to_string(),
        })
    }

    /// Whether a directory looks like an extension (has a manifest file).
    pub fn exists_in(extension_dir: &Path) -> bool {
        extension_dir.join(MANIFEST_FILE).is_file()
    }

    /// Find a command by name.
    pub fn command(&self, name: &str) -> Option<&CommandConfig> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Like [`command`](Self::command), but a missing command is an error.
    pub fn require_command(&self, extension_id: &str, name: &str) -> ExtensionResult<&CommandConfig> {
        self.command(name).ok_or_else(|| ExtensionError::CommandNotFound {
            extension: extension_id.to_string(),
            command: name.to_string(),
        })
    }

    /// Whether the manifest declares any runtime dependency.
    pub fn declares_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Default preference values for a command.
    ///
    /// Command-level preferences override extension-level ones of the same name.
    pub fn preference_defaults(&self, command: &str) -> serde_json::Map<String, serde_json::Value> {
        let command_preferences = self
            .command(command)
            .map(|c| c.preferences.as_slice())
            .unwrap_or_default();

        self.preferences
            .iter()
            .chain(command_preferences)
            .filter_map(|p| Some((p.name.clone(), p.default.clone()?)))
            .collect()
    }

    /// Display title, falling back to the package name and then the directory id.
    pub fn display_title<'a>(&'a self, extension_id: &'a str) -> &'a str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.name.is_empty() {
            &self.name
        } else {
            extension_id
        }
    }
}

/// Command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command identifier within the extension; also the entry file stem.
    pub name: String,

    /// Human-readable command title.
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    /// Command description.
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    /// Execution mode, `view` unless declared otherwise.
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: CommandMode,

    /// Command-specific icon (overrides the extension icon).
    #[serde(default)]
    pub icon: Option<String>,

    /// Additional search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Command-specific preferences.
    #[serde(default, deserialize_with = "lenient_preferences")]
    pub preferences: Vec<PreferenceConfig>,
}

/// A user preference declared in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceConfig {
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    /// Input kind such as `textfield`, `password` or `dropdown`.
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,

    #[serde(default)]
    pub required: bool,

    /// Value used until the user sets one.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl CommandConfig {
    /// Display title, falling back to the command name.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// How a command executes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CommandMode {
    /// Renders an interactive view.
    #[default]
    View,
    /// Fire-and-forget action.
    NoView,
    /// Background/status item, executed like a no-view command.
    MenuBar,
}

impl CommandMode {
    /// Parse a manifest mode string. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(CommandMode::View),
            "no-view" => Some(CommandMode::NoView),
            "menu-bar" => Some(CommandMode::MenuBar),
            _ => None,
        }
    }

    /// Whether the declared mode alone forces one-shot execution.
    pub fn runs_without_view(self) -> bool {
        matches!(self, CommandMode::NoView | CommandMode::MenuBar)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandMode::View => "view",
            CommandMode::NoView => "no-view",
            CommandMode::MenuBar => "menu-bar",
        }
    }
}

/// `null` reads as an empty string; other non-string values still fail.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<CommandMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(CommandMode::parse)
        .unwrap_or_default())
}

fn lenient_commands<'de, D>(deserializer: D) -> Result<Vec<CommandConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let entries = match raw {
        Some(serde_json::Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<CommandConfig>(entry) {
            Ok(command) if !command.name.trim().is_empty() => Some(command),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed command entry");
                None
            }
        })
        .collect())
}

fn lenient_preferences<'de, D>(deserializer: D) -> Result<Vec<PreferenceConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let entries = match raw {
        Some(serde_json::Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PreferenceConfig>(entry).ok())
        .filter(|preference| !preference.name.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_manifest() {
        let json = r#"{ "name": "test", "title": "Test Extension" }"#;

        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.name, "test");
        assert_eq!(manifest.title, "Test Extension");
        assert!(manifest.commands.is_empty());
        assert!(!manifest.declares_dependencies());
    }

    #[test]
    fn test_parse_full_manifest() {
        let json = r#"{
            "name": "github",
            "title": "GitHub",
            "description": "Manage PRs and issues",
            "icon": "icon.png",
            "commands": [
                { "name": "search-repos", "title": "Search Repositories", "mode": "view", "keywords": ["gh"] },
                { "name": "sync", "title": "Sync", "mode": "no-view" },
                { "name": "status", "title": "Status", "mode": "menu-bar", "icon": "status.svg" }
            ],
            "dependencies": { "node-fetch": "^3.0.0" },
            "devDependencies": { "typescript": "^5" }
        }"#;

        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.commands.len(), 3);
        assert_eq!(manifest.commands[0].mode, CommandMode::View);
        assert_eq!(manifest.commands[0].keywords, vec!["gh"]);
        assert_eq!(manifest.commands[1].mode, CommandMode::NoView);
        assert_eq!(manifest.commands[2].mode, CommandMode::MenuBar);
        assert_eq!(manifest.commands[2].icon.as_deref(), Some("status.svg"));
        assert!(manifest.declares_dependencies());
    }

    #[test]
    fn test_malformed_commands_are_dropped_individually() {
        let json = r#"{
            "title": "Mixed",
            "commands": [
                { "name": "good", "title": "Good" },
                { "name": "", "title": "Empty name" },
                { "title": "No name" },
                42,
                { "name": "bad-title", "title": 7 },
                { "name": "also-good" }
            ]
        }"#;

        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        let names: Vec<_> = manifest.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["good", "also-good"]);
        assert_eq!(manifest.commands[1].display_title(), "also-good");
    }

    #[test]
    fn test_non_array_commands_yield_none() {
        let json = r#"{ "title": "Odd", "commands": "oops" }"#;
        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert!(manifest.commands.is_empty());
    }

    #[test]
    fn test_unknown_mode_defaults_to_view() {
        let json = r#"{ "commands": [ { "name": "a", "mode": "sideways" }, { "name": "b", "mode": null } ] }"#;
        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.commands[0].mode, CommandMode::View);
        assert_eq!(manifest.commands[1].mode, CommandMode::View);
    }

    #[test]
    fn test_null_strings_read_as_empty() {
        let json = r#"{
            "name": null,
            "title": "Nulls",
            "description": null,
            "commands": [ { "name": "a", "title": null, "description": null } ],
            "preferences": [ { "name": "p", "title": null, "type": null } ]
        }"#;

        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert!(manifest.description.is_empty());
        assert_eq!(manifest.display_title("dir-id"), "Nulls");
        assert_eq!(manifest.commands.len(), 1);
        assert_eq!(manifest.commands[0].display_title(), "a");
        assert_eq!(manifest.preferences.len(), 1);
        assert!(manifest.preferences[0].kind.is_empty());

        let untitled: ExtensionManifest = serde_json::from_str(r#"{ "title": null }"#).unwrap();
        assert_eq!(untitled.display_title("dir-id"), "dir-id");
    }

    #[test]
    fn test_require_command() {
        let json = r#"{ "commands": [ { "name": "sync" } ] }"#;
        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();

        assert_eq!(manifest.require_command("demo", "sync").unwrap().name, "sync");
        let err = manifest.require_command("demo", "gone").unwrap_err();
        assert!(matches!(
            &err,
            ExtensionError::CommandNotFound { extension, command } if extension == "demo" && command == "gone"
        ));
    }

    #[test]
    fn test_load_errors() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            ExtensionManifest::load(temp.path()),
            Err(ExtensionError::ManifestNotFound(_))
        ));

        std::fs::write(temp.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(matches!(
            ExtensionManifest::load(temp.path()),
            Err(ExtensionError::ManifestInvalid { .. })
        ));
    }

    #[test]
    fn test_preference_defaults() {
        let json = r#"{
            "preferences": [
                { "name": "token", "type": "password", "required": true },
                { "name": "limit", "type": "textfield", "default": "10" },
                "junk"
            ],
            "commands": [
                { "name": "search", "preferences": [ { "name": "limit", "default": "25" } ] },
                { "name": "other" }
            ]
        }"#;

        let manifest: ExtensionManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.preferences.len(), 2);

        let search = manifest.preference_defaults("search");
        assert_eq!(search.get("limit"), Some(&serde_json::json!("25")));
        assert!(!search.contains_key("token"));

        let other = manifest.preference_defaults("other");
        assert_eq!(other.get("limit"), Some(&serde_json::json!("10")));
        assert_eq!(manifest.preference_defaults("missing").len(), 1);
    }

    #[test]
    fn test_display_title_fallbacks() {
        let mut manifest = ExtensionManifest::default();
        assert_eq!(manifest.display_title("dir-id"), "dir-id");
        manifest.name = "pkg".to_string();
        assert_eq!(manifest.display_title("dir-id"), "pkg");
        manifest.title = "Pretty".to_string();
        assert_eq!(manifest.display_title("dir-id"), "Pretty");
    }
}
