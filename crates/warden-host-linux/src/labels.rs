//! App labels from freedesktop desktop entries

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use warden_host_api::AppLabelResolver;
use warden_util::AppId;

/// Resolves `Name=` from `<app_id>.desktop` in the XDG application dirs
pub struct DesktopEntryLabels {
    dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<AppId, Option<String>>>,
}

impl DesktopEntryLabels {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `$XDG_DATA_HOME/applications` followed by each `$XDG_DATA_DIRS` entry
    pub fn from_xdg() -> Self {
        let mut search_dirs = Vec::new();

        if let Some(data_home) = dirs::data_dir() {
            search_dirs.push(data_home.join("applications"));
        }

        let data_dirs = std::env::var("XDG_DATA_DIRS")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
        search_dirs.extend(
            data_dirs
                .split(':')
                .filter(|d| !d.is_empty())
                .map(|d| Path::new(d).join("applications")),
        );

        Self::new(search_dirs)
    }

    fn lookup(&self, app_id: &AppId) -> Option<String> {
        let candidates = [
            format!("{}.desktop", app_id.as_str()),
            format!("{}.desktop", app_id.as_str().to_lowercase()),
        ];

        for dir in &self.dirs {
            for file in &candidates {
                let path = dir.join(file);
                if let Ok(content) = std::fs::read_to_string(&path)
                    && let Some(name) = parse_desktop_name(&content)
                {
                    debug!(app_id = %app_id, path = %path.display(), "Resolved app label");
                    return Some(name);
                }
            }
        }

        None
    }
}

impl AppLabelResolver for DesktopEntryLabels {
    fn label_for(&self, app_id: &AppId) -> Option<String> {
        if let Some(cached) = self.cache.lock().unwrap().get(app_id) {
            return cached.clone();
        }

        let label = self.lookup(app_id);
        self.cache
            .lock()
            .unwrap()
            .insert(app_id.clone(), label.clone());
        label
    }
}

/// Unlocalized `Name=` of the `[Desktop Entry]` group
pub fn parse_desktop_name(content: &str) -> Option<String> {
    let mut in_entry = false;

    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some(value) = line.strip_prefix("Name=") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unlocalized_name() {
        let content = "\
[Desktop Entry]
Type=Application
Name[de]=Dampf
Name=Steam
Exec=steam

[Desktop Action Big]
Name=Big Picture
";
        assert_eq!(parse_desktop_name(content), Some("Steam".to_string()));
    }

    #[test]
    fn ignores_names_outside_entry_group() {
        let content = "[Desktop Action New]\nName=New Window\n";
        assert_eq!(parse_desktop_name(content), None);
    }

    #[test]
    fn resolves_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("org.telegram.desktop.desktop"),
            "[Desktop Entry]\nName=Telegram Desktop\n",
        )
        .unwrap();

        let labels = DesktopEntryLabels::new(vec![dir.path().to_path_buf()]);
        assert_eq!(
            labels.label_for(&AppId::new("org.telegram.desktop")),
            Some("Telegram Desktop".to_string())
        );
        assert_eq!(labels.label_for(&AppId::new("unknown")), None);
    }
}
