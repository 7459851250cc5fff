//! Condition negotiation for nested `exports` objects.
//!
//! One priority table is used for every caller:
//!
//! | target            | platform conditions          |
//! |-------------------|------------------------------|
//! | `es20xx`/`esnext` | `browser`                    |
//! | `deno`/`denonext` | `deno`, `worker`, `browser`  |
//! | `node`            | `node`                       |
//!
//! followed by `development` in dev mode, then the extra conditions from the
//! build args in their given order. Only then are the generic names
//! (`module`, `import`, `es2015`, `require`, `default`, `types`, `typings`)
//! scanned in declaration order.

use super::entry::BuildEntry;
use crate::esm::Target;
use crate::npm::ConditionValue;
use indexmap::IndexMap;

/// What kind of file a branch is expected to yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Module,
    CommonJs,
    Types,
}

/// Branches consulted when looking only for declarations.
const TYPES_BRANCHES: &[&str] = &["module", "import", "es2015", "default", "require"];

#[must_use]
pub fn platform_conditions(target: Target) -> &'static [&'static str] {
    match target {
        Target::Node => &["node"],
        Target::Deno | Target::DenoNext => &["deno", "worker", "browser"],
        _ => &["browser"],
    }
}

/// Negotiates condition objects for one build.
#[derive(Debug, Clone)]
pub struct ConditionResolver {
    priority: Vec<String>,
}

fn prefers_dts(current: &str, candidate: &str) -> bool {
    current.is_empty() || (!current.ends_with(".d.mts") && candidate.ends_with(".d.mts"))
}

impl ConditionResolver {
    #[must_use]
    pub fn new(target: Target, dev: bool, extra: &[String]) -> Self {
        let mut priority: Vec<String> = platform_conditions(target)
            .iter()
            .map(|c| (*c).to_string())
            .collect();
        if dev {
            priority.push("development".to_string());
        }
        for name in extra {
            if !priority.contains(name) {
                priority.push(name.clone());
            }
        }
        Self { priority }
    }

    /// Names tried before the generic conditions, highest first.
    #[must_use]
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Resolve `conditions` into an unfinalized entry. Paths are returned as
    /// written in `package.json`. Nothing matching leaves the slots empty.
    #[must_use]
    pub fn resolve(
        &self,
        conditions: &IndexMap<String, ConditionValue>,
        preferred: EntryKind,
    ) -> BuildEntry {
        if preferred == EntryKind::Types {
            return Self::resolve_types(conditions);
        }

        let mut entry = BuildEntry::default();
        let mut found = false;

        for name in &self.priority {
            let Some(value) = conditions.get(name) else {
                continue;
            };
            match value {
                ConditionValue::Path(path) => {
                    let module = preferred == EntryKind::Module || path.ends_with(".mjs");
                    entry.set_main(path, module);
                    found = true;
                }
                ConditionValue::Conditions(nested) => {
                    let nested = self.resolve(nested, preferred);
                    if nested.main().is_empty() {
                        if prefers_dts(&entry.dts, &nested.dts) && !nested.dts.is_empty() {
                            entry.dts = nested.dts;
                        }
                    } else {
                        entry = nested;
                        found = true;
                    }
                }
            }
            if found {
                break;
            }
        }

        for (name, value) in conditions {
            let kind = match name.as_str() {
                "module" | "import" | "es2015" => EntryKind::Module,
                "require" => EntryKind::CommonJs,
                "default" => {
                    let module = preferred == EntryKind::Module
                        || value.as_path().is_some_and(|p| p.ends_with(".mjs"))
                        || conditions.contains_key("require");
                    if module {
                        EntryKind::Module
                    } else {
                        EntryKind::CommonJs
                    }
                }
                "types" | "typings" => {
                    let dts = match value {
                        ConditionValue::Path(path) => path.clone(),
                        ConditionValue::Conditions(nested) => Self::resolve_types(nested).dts,
                    };
                    if !dts.is_empty() && prefers_dts(&entry.dts, &dts) {
                        entry.dts = dts;
                    }
                    continue;
                }
                _ => continue,
            };
            let module = kind == EntryKind::Module;

            // A generic branch fills an empty slot, or upgrades a CommonJS
            // pick to ESM when no explicit condition matched.
            if !entry.main().is_empty() && (entry.is_module() || !module || found) {
                continue;
            }
            match value {
                ConditionValue::Path(path) => entry.set_main(path, module),
                ConditionValue::Conditions(nested) => {
                    let nested = self.resolve(nested, kind);
                    if !nested.main().is_empty() {
                        entry.set_main(nested.main(), nested.is_module());
                    }
                    if !nested.dts.is_empty() {
                        entry.dts = nested.dts;
                    }
                }
            }
        }

        entry
    }

    fn resolve_types(conditions: &IndexMap<String, ConditionValue>) -> BuildEntry {
        let mut entry = BuildEntry::default();
        let Some(value) = TYPES_BRANCHES.iter().find_map(|name| conditions.get(*name)) else {
            return entry;
        };
        match value {
            ConditionValue::Path(path) => entry.dts = path.clone(),
            ConditionValue::Conditions(nested) => entry = Self::resolve_types(nested),
        }
        entry
    }
}
