//! Index of XDG desktop entries, used to recognize graphical applications.

use anyhow::{Context, Result};
use apptrack_core::IconRef;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The parts of a `.desktop` file the registry cares about
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopEntry {
    /// Desktop file id, e.g. `org.gnome.TextEditor`
    pub id: String,
    /// Name in the user's locale when declared, otherwise the default `Name=`
    pub name: String,
    pub icon: Option<IconRef>,
    pub no_display: bool,
    pub path: PathBuf,
    exec_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DesktopEntryIndex {
    by_exec: HashMap<String, DesktopEntry>,
}

impl DesktopEntryIndex {
    /// Scan `extra_dirs` first, then the user and system XDG data directories
    pub fn load(extra_dirs: &[PathBuf]) -> Self {
        let locales = user_locales();
        let mut index = Self::default();

        for dir in extra_dirs.iter().cloned().chain(xdg_application_dirs()) {
            if !dir.is_dir() {
                continue;
            }
            match index.scan_dir(&dir, &locales) {
                Ok(count) => debug!(dir = %dir.display(), count, "Indexed desktop entries"),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to scan desktop entries"),
            }
        }
        index
    }

    /// Index every desktop file under `dir`. Entries already indexed take precedence.
    pub fn scan_dir(&mut self, dir: &Path, locales: &[String]) -> Result<usize> {
        let mut count = 0;
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let read = fs::read_dir(&current)
                .with_context(|| format!("Failed to read {}", current.display()))?;

            for item in read.flatten() {
                let path = item.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_none_or(|ext| ext != "desktop") {
                    continue;
                }

                let Ok(contents) = fs::read_to_string(&path) else {
                    debug!(path = %path.display(), "Skipping unreadable desktop entry");
                    continue;
                };
                let Some(id) = desktop_file_id(dir, &path) else {
                    continue;
                };
                if let Some(entry) = parse_desktop_entry(id, &path, &contents, locales) {
                    count += 1;
                    self.insert(entry);
                }
            }
        }
        Ok(count)
    }

    fn insert(&mut self, entry: DesktopEntry) {
        for exec in &entry.exec_names {
            self.by_exec
                .entry(exec.clone())
                .or_insert_with(|| entry.clone());
        }
    }

    /// Entry whose `Exec=` or `TryExec=` program matches the executable's file name
    pub fn lookup(&self, exe: &Path) -> Option<&DesktopEntry> {
        let name = exe.file_name()?.to_str()?;
        self.by_exec.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_exec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_exec.is_empty()
    }
}

/// Parse the `[Desktop Entry]` group. Returns `None` for hidden or non-application entries.
pub fn parse_desktop_entry(
    id: String,
    path: &Path,
    contents: &str,
    locales: &[String],
) -> Option<DesktopEntry> {
    let mut in_main_group = false;
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_main_group = line == "[Desktop Entry]";
            continue;
        }
        if !in_main_group {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.entry(key.trim()).or_insert(value.trim());
        }
    }

    if fields.get("Type").copied() != Some("Application") || is_true(fields.get("Hidden")) {
        return None;
    }

    let name = locales
        .iter()
        .find_map(|locale| fields.get(format!("Name[{locale}]").as_str()))
        .or_else(|| fields.get("Name"))
        .map(|name| name.to_string())?;

    let exec_names: Vec<String> = ["TryExec", "Exec"]
        .iter()
        .filter_map(|key| fields.get(key).and_then(|value| program_name(value)))
        .collect();
    if exec_names.is_empty() {
        return None;
    }

    let icon = fields.get("Icon").filter(|icon| !icon.is_empty()).map(|icon| {
        let path = Path::new(icon);
        if path.is_absolute() {
            IconRef::File(path.to_path_buf())
        } else {
            IconRef::Named(icon.to_string())
        }
    });

    Some(DesktopEntry {
        id,
        name,
        icon,
        no_display: is_true(fields.get("NoDisplay")),
        path: path.to_path_buf(),
        exec_names,
    })
}

fn is_true(value: Option<&&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// File name of the program an `Exec=` line starts, skipping `env VAR=value` prefixes
fn program_name(exec: &str) -> Option<String> {
    let mut tokens = exec
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '"' || c == '\''));

    let mut program = tokens.next()?;
    if program == "env" || program.ends_with("/env") {
        program = tokens.find(|token| !token.contains('=') && !token.starts_with('-'))?;
    }

    let name = Path::new(program).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// `applications/org/example/App.desktop` becomes `org-example-App`
fn desktop_file_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("-");
    joined.strip_suffix(".desktop").map(str::to_string)
}

fn xdg_application_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = dirs::data_dir().into_iter().collect();

    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    dirs.extend(system.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));

    dirs.into_iter().map(|d| d.join("applications")).collect()
}

/// `fr_FR.UTF-8@euro` yields `fr_FR@euro`, `fr_FR`, `fr@euro`, `fr`
pub fn user_locales() -> Vec<String> {
    let raw = ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
    raw.map(|value| locale_variants(&value)).unwrap_or_default()
}

fn locale_variants(value: &str) -> Vec<String> {
    let (base, modifier) = match value.split_once('@') {
        Some((base, modifier)) => (base, Some(modifier)),
        None => (value, None),
    };
    let base = base.split('.').next().unwrap_or(base);
    let lang = base.split('_').next().unwrap_or(base);

    let mut variants = Vec::new();
    if let Some(modifier) = modifier {
        variants.push(format!("{base}@{modifier}"));
    }
    variants.push(base.to_string());
    if lang != base {
        if let Some(modifier) = modifier {
            variants.push(format!("{lang}@{modifier}"));
        }
        variants.push(lang.to_string());
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDITOR: &str = "\
[Desktop Entry]
Type=Application
Name=Text Editor
Name[fr]=Éditeur de texte
Exec=env GTK_THEME=Adwaita /usr/bin/gnome-text-editor %U
Icon=org.gnome.TextEditor

[Desktop Action new-window]
Name=New Window
Exec=other-binary
";

    #[test]
    fn test_parse_localized_entry() {
        let entry = parse_desktop_entry(
            "org.gnome.TextEditor".to_string(),
            Path::new("/usr/share/applications/org.gnome.TextEditor.desktop"),
            EDITOR,
            &["fr_FR".to_string(), "fr".to_string()],
        )
        .unwrap();

        assert_eq!(entry.name, "Éditeur de texte");
        assert_eq!(entry.icon, Some(IconRef::Named("org.gnome.TextEditor".to_string())));
        assert_eq!(entry.exec_names, vec!["gnome-text-editor"]);
        assert!(!entry.no_display);
    }

    #[test]
    fn test_hidden_and_non_application_entries() {
        let hidden = "[Desktop Entry]\nType=Application\nName=X\nExec=x\nHidden=true\n";
        let link = "[Desktop Entry]\nType=Link\nName=Docs\nURL=https://example.com\n";
        assert!(parse_desktop_entry("x".into(), Path::new("x.desktop"), hidden, &[]).is_none());
        assert!(parse_desktop_entry("d".into(), Path::new("d.desktop"), link, &[]).is_none());
    }

    #[test]
    fn test_scan_dir_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("org").join("example");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            nested.join("Player.desktop"),
            "[Desktop Entry]\nType=Application\nName=Player\nExec=\"/opt/player/bin/player\" --new\nIcon=/opt/player/icon.png\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("agent.desktop"),
            "[Desktop Entry]\nType=Application\nName=Agent\nTryExec=sync-agent\nExec=sync-agent --daemon\nNoDisplay=true\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a desktop file").unwrap();

        let mut index = DesktopEntryIndex::default();
        assert_eq!(index.scan_dir(dir.path(), &[]).unwrap(), 2);

        let player = index.lookup(Path::new("/opt/player/bin/player")).unwrap();
        assert_eq!(player.id, "org-example-Player");
        assert_eq!(player.icon, Some(IconRef::File(PathBuf::from("/opt/player/icon.png"))));

        let agent = index.lookup(Path::new("/usr/bin/sync-agent")).unwrap();
        assert!(agent.no_display);
        assert!(index.lookup(Path::new("/usr/bin/unknown")).is_none());
    }

    #[test]
    fn test_locale_variants() {
        assert_eq!(
            locale_variants("fr_FR.UTF-8@euro"),
            vec!["fr_FR@euro", "fr_FR", "fr@euro", "fr"]
        );
        assert_eq!(locale_variants("de"), vec!["de"]);
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name("/usr/bin/foo %F"), Some("foo".to_string()));
        assert_eq!(program_name("env A=1 B=2 bar --flag"), Some("bar".to_string()));
        assert_eq!(program_name(""), None);
    }
}
