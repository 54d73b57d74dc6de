use crate::error::{Result, SchedError};
use crate::store;
use common::{IntervalUnit, ScriptType, Template};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Template as found on disk, with the file it came from.
#[derive(Debug, Clone)]
pub struct StoredTemplate {
    pub template: Template,
    pub path: PathBuf,
}

/// Job presets, one `<slug>.json` file per template.
pub struct TemplateStore {
    dir: PathBuf,
}

/// Lowercases, turns spaces into hyphens and drops everything outside
/// `[a-zA-Z0-9_-]`.
pub fn slugify(name: &str) -> String {
    name.replace(' ', "-")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every readable template keyed by name. Unreadable files are skipped and
    /// reported in the second element.
    pub fn list(&self) -> (BTreeMap<String, StoredTemplate>, Vec<SchedError>) {
        let mut templates = BTreeMap::new();
        let mut errors = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (templates, errors),
            Err(e) => {
                errors.push(SchedError::persistence("list", &self.dir, e));
                return (templates, errors);
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match read_template(&path) {
                Ok(template) => {
                    templates.insert(template.name.clone(), StoredTemplate { template, path });
                }
                Err(e) => {
                    log::warn!("Skipping template: {}", e);
                    errors.push(e);
                }
            }
        }
        (templates, errors)
    }

    pub fn save(&self, template: &Template) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", slugify(&template.name)));
        store::save_json(&path, template)?;
        log::info!("Saved template {} to {:?}", template.name, path);
        Ok(path)
    }

    /// Best effort, like script removal.
    pub fn delete(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => log::info!("Deleted template {:?}", path),
            Err(e) => log::warn!("Failed to delete template {:?}: {}", path, e),
        }
    }
}

fn read_template(path: &Path) -> Result<Template> {
    let content = fs::read_to_string(path).map_err(|e| SchedError::persistence("read", path, e))?;
    let value: Value = serde_json::from_str(&content).map_err(|source| SchedError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let empty = Map::new();
    let fields = value.as_object().unwrap_or(&empty);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(from_fields(fields, &stem))
}

/// Builds a template from raw file fields. Older files spell some keys
/// `inteval` and `intertval-unit`; those are used when the correct key is
/// absent.
fn from_fields(fields: &Map<String, Value>, fallback_name: &str) -> Template {
    Template {
        name: text(fields, &["name"]).unwrap_or_else(|| fallback_name.to_string()),
        script_type: text(fields, &["script-type"])
            .map(ScriptType::from)
            .unwrap_or(ScriptType::Python),
        script_content: text(fields, &["script-content"]).unwrap_or_default(),
        interval_value: first(fields, &["interval", "inteval"])
            .and_then(Value::as_u64)
            .unwrap_or(1),
        interval_unit: text(fields, &["interval-unit", "intertval-unit"])
            .map(IntervalUnit::from)
            .unwrap_or_default(),
        enabled: first(fields, &["enabled"])
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

fn first<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

fn text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first(fields, keys).and_then(Value::as_str).map(str::to_string)
}
