//! Recognizes executables living inside macOS `.app` bundles.

use apptrack_core::IconRef;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct AppBundle {
    /// The `.app` directory
    pub path: PathBuf,
    pub identifier: String,
    pub name: Option<String>,
    pub icon: IconRef,
    /// Helper bundle embedded in another application's bundle
    pub nested: bool,
}

impl AppBundle {
    /// Bundle owning `exe`, when `exe` sits in `<Name>.app/Contents/MacOS/`
    pub fn enclosing(exe: &Path) -> Option<Self> {
        let macos = exe.parent()?;
        let contents = macos.parent()?;
        let bundle = contents.parent()?;
        if macos.file_name()? != "MacOS"
            || contents.file_name()? != "Contents"
            || bundle.extension()? != "app"
        {
            return None;
        }

        let nested = bundle
            .ancestors()
            .skip(1)
            .any(|dir| dir.extension().is_some_and(|ext| ext == "app"));

        // Binary property lists are not valid UTF-8 and fall back to the bundle name
        let info = fs::read_to_string(contents.join("Info.plist")).ok();
        let info = info.as_deref();

        let identifier = info
            .and_then(|xml| plist_string(xml, "CFBundleIdentifier"))
            .or_else(|| Some(bundle.file_stem()?.to_string_lossy().into_owned()))?;

        let name = info.and_then(|xml| {
            plist_string(xml, "CFBundleDisplayName").or_else(|| plist_string(xml, "CFBundleName"))
        });

        let icon = info
            .and_then(|xml| plist_string(xml, "CFBundleIconFile"))
            .map(|file| {
                let mut path = contents.join("Resources").join(file);
                if path.extension().is_none() {
                    path.set_extension("icns");
                }
                path
            })
            .filter(|path| path.exists())
            .map(IconRef::File)
            .unwrap_or(IconRef::Generic);

        Some(Self {
            path: bundle.to_path_buf(),
            identifier,
            name,
            icon,
            nested,
        })
    }
}

/// `<string>` value following `<key>{key}</key>` in an XML property list
fn plist_string(xml: &str, key: &str) -> Option<String> {
    let marker = format!("<key>{key}</key>");
    let start = xml.find(&marker)? + marker.len();
    let value = xml[start..].trim_start().strip_prefix("<string>")?;
    let end = value.find("</string>")?;
    let value = value[..end]
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    (!value.trim().is_empty()).then_some(value)
}
