//! Metadata catalog - discovers extensions and their commands.
//!
//! The catalog walks the extensions directory on every call. Each
//! subdirectory with a manifest contributes one descriptor per declared
//! command. Failures are contained per extension: a broken manifest or an
//! unreadable icon drops that extension (or just its icon), never the scan.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;

use super::error::ExtensionResult;
use super::manifest::{CommandMode, ExtensionManifest};
use super::{CommandId, ExtensionId};

/// Icon files smaller than this are treated as placeholders and ignored.
pub const MIN_ICON_BYTES: u64 = 100;

/// Immutable snapshot of one runnable command, handed to the launcher UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    /// Stable id derived from the extension id and command name.
    pub id: String,
    pub extension_id: ExtensionId,
    pub command_name: CommandId,
    pub extension_title: String,
    pub title: String,
    pub description: String,
    pub mode: CommandMode,
    /// Lower-cased concatenation of extension and command metadata.
    pub keywords: String,
    /// Inline `data:` URI for the command (or extension) icon.
    pub icon: Option<String>,
}

/// Build the stable descriptor id for a command.
pub fn command_id(extension_id: &str, command_name: &str) -> String {
    format!("{}.{}", extension_id, command_name)
}

/// Scans an extensions root for command metadata.
pub struct Catalog {
    extensions_dir: PathBuf,
    matcher: SkimMatcherV2,
}

impl Catalog {
    pub fn new(extensions_dir: impl Into<PathBuf>) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
            matcher: SkimMatcherV2::default(),
        }
    }

    pub fn extensions_dir(&self) -> &Path {
        &self.extensions_dir
    }

    /// List every command of every discoverable extension.
    ///
    /// A missing extensions root yields an empty list.
    pub fn list(&self) -> Vec<CommandDescriptor> {
        let entries = match fs::read_dir(&self.extensions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(
                    path = %self.extensions_dir.display(),
                    error = %e,
                    "extensions directory unavailable"
                );
                return Vec::new();
            }
        };

        let mut dirs: Vec<(ExtensionId, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if !path.is_dir() || !ExtensionManifest::exists_in(&path) {
                    return None;
                }
                let id = entry.file_name().to_str()?.to_string();
                Some((id, path))
            })
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut descriptors = Vec::new();
        for (extension_id, path) in dirs {
            match describe_extension(&extension_id, &path) {
                Ok(mut commands) => descriptors.append(&mut commands),
                Err(e) => {
                    tracing::warn!(
                        extension = %extension_id,
                        error = %e,
                        "skipping extension"
                    );
                }
            }
        }

        descriptors
    }

    /// Search commands by fuzzy-matching their keywords.
    ///
    /// An empty query returns all commands in discovery order.
    pub fn search(&self, query: &str) -> Vec<CommandDescriptor> {
        let descriptors = self.list();
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return descriptors;
        }

        let mut scored: Vec<(i64, CommandDescriptor)> = descriptors
            .into_iter()
            .filter_map(|d| {
                self.matcher
                    .fuzzy_match(&d.keywords, &query)
                    .map(|score| (score, d))
            })
            .collect();

        // Stable sort keeps discovery order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, d)| d).collect()
    }
}

fn describe_extension(extension_id: &str, path: &Path) -> ExtensionResult<Vec<CommandDescriptor>> {
    let manifest = ExtensionManifest::load(path)?;
    let extension_title = manifest.display_title(extension_id).to_string();
    let extension_icon = manifest
        .icon
        .as_deref()
        .and_then(|icon| load_icon(path, icon));

    let descriptors = manifest
        .commands
        .iter()
        .map(|command| {
            let icon = command
                .icon
                .as_deref()
                .and_then(|icon| load_icon(path, icon))
                .or_else(|| extension_icon.clone());

            let extra_keywords = command.keywords.join(" ");
            let keywords = [
                extension_id,
                extension_title.as_str(),
                manifest.description.as_str(),
                command.name.as_str(),
                command.display_title(),
                command.description.as_str(),
                extra_keywords.as_str(),
            ]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

            CommandDescriptor {
                id: command_id(extension_id, &command.name),
                extension_id: extension_id.to_string(),
                command_name: command.name.clone(),
                extension_title: extension_title.clone(),
                title: command.display_title().to_string(),
                description: command.description.clone(),
                mode: command.mode,
                keywords,
                icon,
            }
        })
        .collect();

    Ok(descriptors)
}

/// Resolve an icon reference to an inline data URI.
///
/// Tries `assets/<icon>` first, then `<icon>` at the extension root. Files
/// below [`MIN_ICON_BYTES`] or that cannot be read are rejected, as are
/// names that could reach outside the extension directory.
pub fn load_icon(extension_dir: &Path, icon: &str) -> Option<String> {
    if !is_plain_file_name(icon) {
        tracing::warn!(icon = %icon, dir = %extension_dir.display(), "rejecting icon path");
        return None;
    }

    let candidates = [extension_dir.join("assets").join(icon), extension_dir.join(icon)];

    for candidate in candidates.iter() {
        let Ok(metadata) = fs::metadata(candidate) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if metadata.len() < MIN_ICON_BYTES {
            tracing::debug!(path = %candidate.display(), "icon too small, ignoring");
            continue;
        }
        match fs::read(candidate) {
            Ok(bytes) => {
                return Some(format!(
                    "data:{};base64,{}",
                    image_mime(candidate),
                    BASE64.encode(bytes)
                ));
            }
            Err(e) => {
                tracing::debug!(path = %candidate.display(), error = %e, "unreadable icon");
            }
        }
    }

    None
}

fn is_plain_file_name(name: &str) -> bool {
    !(name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute())
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("svg") => "image/svg+xml",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_extension(root: &Path, id: &str, manifest: &str) -> PathBuf {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
        dir
    }

    #[test]
    fn test_list_commands() {
        let temp = TempDir::new().unwrap();
        write_extension(
            temp.path(),
            "github",
            r#"{ "title": "GitHub", "commands": [
                { "name": "search-repos", "title": "Search Repositories", "description": "Find repos" },
                { "name": "sync", "title": "Sync", "mode": "no-view" }
            ] }"#,
        );

        let catalog = Catalog::new(temp.path());
        let commands = catalog.list();

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].id, "github.search-repos");
        assert_eq!(commands[0].extension_title, "GitHub");
        assert_eq!(commands[0].mode, CommandMode::View);
        assert!(commands[0].keywords.contains("search repositories"));
        assert!(commands[0].keywords.contains("find repos"));
        assert_eq!(commands[1].mode, CommandMode::NoView);
    }

    #[test]
    fn test_ids_are_stable_across_scans() {
        let temp = TempDir::new().unwrap();
        write_extension(temp.path(), "a", r#"{ "commands": [ { "name": "x" } ] }"#);

        let catalog = Catalog::new(temp.path());
        assert_eq!(catalog.list()[0].id, catalog.list()[0].id);
        assert_eq!(catalog.list()[0].id, command_id("a", "x"));
    }

    #[test]
    fn test_bad_extension_does_not_abort_scan() {
        let temp = TempDir::new().unwrap();
        write_extension(temp.path(), "broken", "{ this is not json");
        write_extension(
            temp.path(),
            "partial",
            r#"{ "commands": [ { "name": "" }, { "name": "ok" }, "junk" ] }"#,
        );
        write_extension(temp.path(), "empty", r#"{ "title": "Nothing" }"#);
        fs::create_dir_all(temp.path().join("not-an-extension")).unwrap();
        fs::write(temp.path().join("stray-file.txt"), "hi").unwrap();

        let catalog = Catalog::new(temp.path());
        let commands = catalog.list();

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id, "partial.ok");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let catalog = Catalog::new("/nonexistent/nova/extensions");
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_icon_resolution() {
        let temp = TempDir::new().unwrap();
        let dir = write_extension(
            temp.path(),
            "icons",
            r#"{ "icon": "logo.png", "commands": [
                { "name": "plain" },
                { "name": "vector", "icon": "cmd.svg" },
                { "name": "tiny", "icon": "tiny.jpg" }
            ] }"#,
        );

        fs::create_dir_all(dir.join("assets")).unwrap();
        fs::write(dir.join("assets").join("logo.png"), vec![7u8; 256]).unwrap();
        fs::write(dir.join("cmd.svg"), vec![b'<'; 200]).unwrap();
        fs::write(dir.join("assets").join("tiny.jpg"), vec![1u8; 10]).unwrap();

        let commands = Catalog::new(temp.path()).list();

        let plain = commands[0].icon.as_deref().unwrap();
        assert!(plain.starts_with("data:image/png;base64,"));

        let vector = commands[1].icon.as_deref().unwrap();
        assert!(vector.starts_with("data:image/svg+xml;base64,"));

        // Too small: falls back to the extension icon
        assert_eq!(commands[2].icon.as_deref(), Some(plain));
    }

    #[test]
    fn test_icon_prefers_assets_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("assets")).unwrap();
        fs::write(temp.path().join("assets").join("i.jpeg"), vec![1u8; 150]).unwrap();
        fs::write(temp.path().join("i.jpeg"), vec![2u8; 150]).unwrap();

        let uri = load_icon(temp.path(), "i.jpeg").unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(uri, format!("data:image/jpeg;base64,{}", BASE64.encode(vec![1u8; 150])));

        assert!(load_icon(temp.path(), "missing.png").is_none());
    }

    #[test]
    fn test_icon_cannot_escape_extension_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ext");
        fs::create_dir_all(dir.join("assets").join("nested")).unwrap();
        fs::write(temp.path().join("secret.png"), vec![9u8; 256]).unwrap();
        fs::write(dir.join("assets").join("nested").join("i.png"), vec![9u8; 256]).unwrap();

        let absolute = temp.path().join("secret.png");
        for icon in [
            "../secret.png",
            "../../secret.png",
            "nested/i.png",
            "nested\\i.png",
            "..",
            "",
            absolute.to_str().unwrap(),
        ] {
            assert!(load_icon(&dir, icon).is_none(), "{icon} should be rejected");
        }

        write_extension(
            temp.path(),
            "leaky",
            r#"{ "icon": "../secret.png", "commands": [ { "name": "a" } ] }"#,
        );
        let commands = Catalog::new(temp.path()).list();
        let leaky = commands.iter().find(|c| c.extension_id == "leaky").unwrap();
        assert!(leaky.icon.is_none());
    }

    #[test]
    fn test_search_commands() {
        let temp = TempDir::new().unwrap();
        write_extension(
            temp.path(),
            "github",
            r#"{ "title": "GitHub", "commands": [ { "name": "repos", "title": "Search Repositories" } ] }"#,
        );
        write_extension(
            temp.path(),
            "jira",
            r#"{ "title": "Jira", "commands": [ { "name": "issues", "title": "My Issues" } ] }"#,
        );

        let catalog = Catalog::new(temp.path());

        let results = catalog.search("git");
        assert!(!results.is_empty());
        assert_eq!(results[0].extension_id, "github");

        assert_eq!(catalog.search("").len(), 2);
        assert!(catalog.search("zzzzqqq").is_empty());
    }
}
