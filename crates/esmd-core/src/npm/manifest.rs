//! Normalized `package.json`.
//!
//! Field shapes vary across the registry (string or object `browser`,
//! `module` spelled `es2015` or `jsnext:main`, string or object `exports`).
//! [`PackageManifest::from_json`] folds them into one shape so resolution
//! never has to look at raw JSON again.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// One node of an `exports` tree: a target path or a nested condition map.
///
/// Map order is the declaration order from `package.json`; condition
/// negotiation depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Path(String),
    Conditions(IndexMap<String, ConditionValue>),
}

impl ConditionValue {
    /// Convert a JSON exports node.
    ///
    /// Fallback arrays keep their first usable element; `null` targets and
    /// other non-string scalars are dropped.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Path(s.clone())),
            Value::Object(map) => {
                let conditions: IndexMap<String, ConditionValue> = map
                    .iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|cv| (k.clone(), cv)))
                    .collect();
                Some(Self::Conditions(conditions))
            }
            Value::Array(items) => items.iter().find_map(Self::from_json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Path(p) => Some(p),
            Self::Conditions(_) => None,
        }
    }

    #[must_use]
    pub fn as_conditions(&self) -> Option<&IndexMap<String, ConditionValue>> {
        match self {
            Self::Path(_) => None,
            Self::Conditions(c) => Some(c),
        }
    }

    /// Substitute `*` in every leaf path.
    #[must_use]
    pub fn replace_star(&self, value: &str) -> Self {
        match self {
            Self::Path(p) => Self::Path(p.replace('*', value)),
            Self::Conditions(c) => Self::Conditions(
                c.iter()
                    .map(|(k, v)| (k.clone(), v.replace_star(value)))
                    .collect(),
            ),
        }
    }
}

/// Package module format from the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    CommonJs,
    Module,
}

/// `typesVersions`: range key to (pattern to replacement list).
pub type TypesVersions = IndexMap<String, IndexMap<String, Vec<String>>>;

/// Normalized package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub kind: ModuleKind,
    pub main: String,
    pub module: String,
    pub types: String,
    pub typings: String,
    /// Browser remaps. `"."` holds a string-form `browser`; `""` means excluded.
    pub browser: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    /// A string `exports` is stored as `{".": path}`.
    pub exports: IndexMap<String, ConditionValue>,
    pub types_versions: TypesVersions,
}

const JS_MODULE_EXTS: &[&str] = &[".js", ".mjs", ".cjs", ".jsx", ".ts", ".mts", ".tsx"];

fn is_module_path(s: &str) -> bool {
    JS_MODULE_EXTS.iter().any(|ext| s.ends_with(ext))
}

/// `main`-like fields: a string, or the first string of an array.
fn main_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let s = v.as_str()?;
                    (!k.is_empty() && !s.is_empty()).then(|| (k.clone(), s.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_types_versions(value: Option<&Value>) -> TypesVersions {
    let Some(obj) = value.and_then(Value::as_object) else {
        return TypesVersions::new();
    };
    obj.iter()
        .filter_map(|(range, mapping)| {
            let mapping = mapping.as_object()?;
            let entries = mapping
                .iter()
                .map(|(pattern, targets)| {
                    let targets = match targets {
                        Value::Array(items) => items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect(),
                        Value::String(s) => vec![s.clone()],
                        _ => Vec::new(),
                    };
                    (pattern.clone(), targets)
                })
                .collect();
            Some((range.clone(), entries))
        })
        .collect()
}

impl PackageManifest {
    /// Normalize a parsed `package.json` value.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(Error::invalid_spec("package.json is not an object"));
        };
        let str_field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let kind = if str_field("type") == "module" {
            ModuleKind::Module
        } else {
            ModuleKind::CommonJs
        };

        let mut browser = BTreeMap::new();
        match obj.get("browser") {
            Some(Value::String(s)) if is_module_path(s) => {
                browser.insert(".".to_string(), s.clone());
            }
            Some(Value::Object(map)) => {
                for (k, v) in map {
                    match v {
                        Value::String(s) => {
                            browser.insert(k.clone(), s.clone());
                        }
                        Value::Bool(false) => {
                            browser.insert(k.clone(), String::new());
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let exports = match obj.get("exports") {
            Some(Value::String(s)) if !s.is_empty() => {
                IndexMap::from([(".".to_string(), ConditionValue::Path(s.clone()))])
            }
            Some(value @ Value::Object(_)) => match ConditionValue::from_json(value) {
                Some(ConditionValue::Conditions(map)) => map,
                _ => IndexMap::new(),
            },
            Some(value @ Value::Array(_)) => ConditionValue::from_json(value)
                .map(|cv| IndexMap::from([(".".to_string(), cv)]))
                .unwrap_or_default(),
            _ => IndexMap::new(),
        };

        let mut manifest = Self {
            name: str_field("name"),
            version: str_field("version"),
            kind,
            main: main_string(obj.get("main")),
            module: main_string(obj.get("module")),
            types: main_string(obj.get("types")),
            typings: main_string(obj.get("typings")),
            browser,
            dependencies: string_map(obj.get("dependencies")),
            peer_dependencies: string_map(obj.get("peerDependencies")),
            exports,
            types_versions: parse_types_versions(obj.get("typesVersions")),
        };

        if manifest.module.is_empty() {
            let es2015 = main_string(obj.get("es2015"));
            let jsnext = main_string(obj.get("jsnext:main"));
            if !es2015.is_empty() {
                manifest.module = es2015;
            } else if !jsnext.is_empty() {
                manifest.module = jsnext;
            } else if !manifest.main.is_empty()
                && (manifest.kind == ModuleKind::Module || manifest.main.ends_with(".mjs"))
            {
                manifest.module = std::mem::take(&mut manifest.main);
            }
        }

        Ok(manifest)
    }

    /// Parse `package.json` text.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::invalid_spec(format!("invalid package.json: {e}")))?;
        Self::from_json(&value)
    }

    /// Read and parse a `package.json` file.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn is_module(&self) -> bool {
        self.kind == ModuleKind::Module
    }

    /// Whether `exports` declares any `./subpath` key.
    #[must_use]
    pub fn has_subpath_exports(&self) -> bool {
        self.exports.keys().any(|k| k.starts_with("./"))
    }

    /// The root export: the `"."` entry, or the whole map when it is a
    /// bare condition object (no key starts with `.`).
    #[must_use]
    pub fn root_export(&self) -> Option<ConditionValue> {
        if let Some(dot) = self.exports.get(".") {
            return Some(dot.clone());
        }
        if !self.exports.is_empty() && !self.exports.keys().any(|k| k.starts_with('.')) {
            return Some(ConditionValue::Conditions(self.exports.clone()));
        }
        None
    }

    /// Version constraint declared for a dependency, peers included.
    #[must_use]
    pub fn dependency_version(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.peer_dependencies.get(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exports_preserve_declaration_order() {
        let manifest = PackageManifest::from_json(&json!({
            "name": "pkg",
            "exports": {
                ".": { "node": "./n.js", "browser": "./b.js", "default": "./d.js" },
                "./z": "./z.js",
                "./a": "./a.js"
            }
        }))
        .unwrap();

        let keys: Vec<&str> = manifest.exports.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![".", "./z", "./a"]);

        let root = manifest.root_export().unwrap();
        let conditions: Vec<&str> = root
            .as_conditions()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(conditions, vec!["node", "browser", "default"]);
    }

    #[test]
    fn test_string_exports_is_root() {
        let manifest = PackageManifest::from_json(&json!({ "exports": "./index.mjs" })).unwrap();
        assert_eq!(
            manifest.root_export(),
            Some(ConditionValue::Path("./index.mjs".into()))
        );
        assert!(!manifest.has_subpath_exports());
    }

    #[test]
    fn test_bare_condition_exports_is_root() {
        let manifest = PackageManifest::from_json(&json!({
            "exports": { "import": "./i.mjs", "require": "./r.cjs" }
        }))
        .unwrap();
        let root = manifest.root_export().unwrap();
        assert_eq!(root.as_conditions().unwrap().len(), 2);
    }

    #[test]
    fn test_exports_fallback_array_and_null() {
        let manifest = PackageManifest::from_json(&json!({
            "exports": {
                ".": [{ "import": "./i.mjs" }, "./fallback.js"],
                "./internal/*": null
            }
        }))
        .unwrap();
        assert!(manifest.exports.get("./internal/*").is_none());
        assert!(manifest.exports["."].as_conditions().is_some());
    }

    #[test]
    fn test_module_field_fallbacks() {
        let m = PackageManifest::from_json(&json!({ "main": "a.js", "es2015": "es.js" })).unwrap();
        assert_eq!(m.module, "es.js");
        assert_eq!(m.main, "a.js");

        let m = PackageManifest::from_json(&json!({ "jsnext:main": "next.js" })).unwrap();
        assert_eq!(m.module, "next.js");

        let m = PackageManifest::from_json(&json!({ "type": "module", "main": "index.js" }))
            .unwrap();
        assert_eq!(m.module, "index.js");
        assert_eq!(m.main, "");
        assert!(m.is_module());

        let m = PackageManifest::from_json(&json!({ "main": "index.mjs" })).unwrap();
        assert_eq!(m.module, "index.mjs");
        assert!(!m.is_module());
    }

    #[test]
    fn test_browser_shapes() {
        let m = PackageManifest::from_json(&json!({ "browser": "./browser.js" })).unwrap();
        assert_eq!(m.browser.get("."), Some(&"./browser.js".to_string()));

        let m = PackageManifest::from_json(&json!({
            "browser": { "fs": false, "./lib/node.js": "./lib/browser.js", "x": true }
        }))
        .unwrap();
        assert_eq!(m.browser.get("fs"), Some(&String::new()));
        assert_eq!(
            m.browser.get("./lib/node.js"),
            Some(&"./lib/browser.js".to_string())
        );
        assert!(!m.browser.contains_key("x"));
    }

    #[test]
    fn test_dependencies() {
        let m = PackageManifest::from_json(&json!({
            "dependencies": { "react": "^18", "empty": "" },
            "peerDependencies": { "react-dom": "^18" }
        }))
        .unwrap();
        assert_eq!(m.dependency_version("react"), Some("^18"));
        assert_eq!(m.dependency_version("react-dom"), Some("^18"));
        assert_eq!(m.dependency_version("empty"), None);
    }

    #[test]
    fn test_types_versions() {
        let m = PackageManifest::from_json(&json!({
            "typesVersions": { ">=4.2": { "*": ["ts4.2/*"] } }
        }))
        .unwrap();
        assert_eq!(m.types_versions[">=4.2"]["*"], vec!["ts4.2/*".to_string()]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(PackageManifest::parse("[]").is_err());
        assert!(PackageManifest::parse("{").is_err());
    }
}
