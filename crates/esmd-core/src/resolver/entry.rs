//! Entry point resolution.
//!
//! Given a package manifest and a subpath, decide which file a build starts
//! from. Resolution runs in this order:
//!
//! 1. explicit `.d.ts` or source-language subpaths are taken as-is
//! 2. `exports`: an exact key first, then single-`*` keys in declaration
//!    order, skipping candidates that do not exist
//! 3. a nested `package.json` in the subpath directory
//! 4. filename conventions (`sub.mjs`, `sub/index.mjs`, ...)
//! 5. declaration siblings, then `typesVersions`
//! 6. `browser` remaps for browser targets
//!
//! A slot that nothing fills stays empty. Callers decide whether that is
//! fatal.

use super::conditions::{ConditionResolver, EntryKind};
use super::files::{clean_rel, PackageFiles};
use super::types_versions::apply_types_versions;
use crate::esm::{strip_module_ext, Target};
use crate::npm::{ConditionValue, PackageManifest};
use serde::Serialize;
use tracing::trace;

/// Subpath extensions that name a source file directly.
const SOURCE_EXTS: &[&str] = &[".json", ".jsx", ".ts", ".tsx", ".mts", ".svelte", ".vue"];

const DTS_EXTS: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

/// Resolved entry files, each `./`-prefixed and relative to the package
/// root, or empty. At most one of `esm` and `cjs` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildEntry {
    pub esm: String,
    pub cjs: String,
    pub dts: String,
}

impl BuildEntry {
    /// The JavaScript entry, whichever format it is.
    #[must_use]
    pub fn main(&self) -> &str {
        if self.esm.is_empty() {
            &self.cjs
        } else {
            &self.esm
        }
    }

    #[must_use]
    pub fn is_module(&self) -> bool {
        !self.esm.is_empty()
    }

    pub fn set_main(&mut self, path: impl Into<String>, module: bool) {
        let path = path.into();
        if module {
            self.esm = path;
            self.cjs.clear();
        } else {
            self.cjs = path;
            self.esm.clear();
        }
    }

    pub fn clear_main(&mut self) {
        self.esm.clear();
        self.cjs.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.esm.is_empty() && self.cjs.is_empty() && self.dts.is_empty()
    }

    #[must_use]
    pub fn is_types_only(&self) -> bool {
        self.main().is_empty() && !self.dts.is_empty()
    }
}

/// `./`-prefixed, cleaned form of a package-relative path.
#[must_use]
pub fn normalize_entry_path(path: &str) -> String {
    format!("./{}", clean_rel(path).unwrap_or_default())
}

fn join(dir: &str, file: &str) -> String {
    normalize_entry_path(&format!("{dir}/{file}"))
}

fn ends_with_any(path: &str, exts: &[&str]) -> bool {
    exts.iter().any(|ext| path.ends_with(ext))
}

/// Resolves entries of one package for one target.
pub struct EntryResolver<'a> {
    manifest: &'a PackageManifest,
    files: &'a dyn PackageFiles,
    target: Target,
    conditions: ConditionResolver,
}

impl<'a> EntryResolver<'a> {
    pub fn new(manifest: &'a PackageManifest, files: &'a dyn PackageFiles, target: Target) -> Self {
        Self {
            manifest,
            files,
            target,
            conditions: ConditionResolver::new(target, false, &[]),
        }
    }

    /// Dev mode and extra conditions, in priority order.
    #[must_use]
    pub fn with_conditions(mut self, dev: bool, extra: &[String]) -> Self {
        self.conditions = ConditionResolver::new(self.target, dev, extra);
        self
    }

    fn exists(&self, path: &str) -> bool {
        self.files.is_file(path)
    }

    fn module_kind(&self, path: &str) -> bool {
        self.manifest.is_module() || path.ends_with(".mjs")
    }

    /// Resolve `sub_path` (empty for the package root).
    #[must_use]
    pub fn resolve(&self, sub_path: &str) -> BuildEntry {
        let sub_path = sub_path.trim_start_matches("./").trim_matches('/');
        let mut entry = if sub_path.is_empty() {
            self.resolve_root()
        } else if ends_with_any(sub_path, DTS_EXTS) {
            return BuildEntry {
                dts: normalize_entry_path(sub_path),
                ..Default::default()
            };
        } else if ends_with_any(sub_path, SOURCE_EXTS) {
            return BuildEntry {
                esm: normalize_entry_path(sub_path),
                ..Default::default()
            };
        } else {
            self.resolve_sub_module(strip_module_ext(sub_path))
        };

        if !entry.dts.is_empty() {
            if let Some(remapped) = apply_types_versions(&self.manifest.types_versions, &entry.dts) {
                trace!(from = %entry.dts, to = %remapped, "typesVersions remap");
                entry.dts = remapped;
            }
        }
        self.finalize(&mut entry);
        if !entry.dts.is_empty() && !self.exists(&entry.dts) {
            entry.dts.clear();
        }

        if self.target.is_browser() {
            self.apply_browser(&mut entry, sub_path.is_empty());
        }
        entry
    }

    fn resolve_root(&self) -> BuildEntry {
        let manifest = self.manifest;
        let mut entry = BuildEntry::default();
        if !manifest.main.is_empty() {
            entry.set_main(&manifest.main, self.module_kind(&manifest.main));
        }
        entry.dts = if manifest.types.is_empty() {
            manifest.typings.clone()
        } else {
            manifest.types.clone()
        };
        if !manifest.module.is_empty() && self.exists(&manifest.module) {
            entry.set_main(&manifest.module, true);
        }

        if let Some(root) = manifest.root_export() {
            let mut exported = self.resolve_export_value(&root);
            self.finalize(&mut exported);
            merge(&mut entry, exported);
        }

        self.finalize(&mut entry);

        if entry.main().is_empty() {
            if self.exists("index.mjs") {
                entry.set_main("./index.mjs", true);
            } else if manifest.is_module() && self.exists("index.js") {
                entry.set_main("./index.js", true);
            }
        }
        if entry.main().is_empty() {
            if self.exists("index.cjs") {
                entry.set_main("./index.cjs", false);
            } else if !manifest.is_module() && self.exists("index.js") {
                entry.set_main("./index.js", false);
            }
        }

        if entry.dts.is_empty() {
            entry.dts = self.probe(&["./index.d.mts", "./index.d.ts"]).unwrap_or_default();
        }
        if entry.dts.is_empty() && !entry.main().is_empty() {
            entry.dts = self.dts_sibling(entry.main()).unwrap_or_default();
        }
        if entry.dts.is_empty() && !entry.main().is_empty() {
            let main = entry.main().to_string();
            let (dir, file) = main.rsplit_once('/').unwrap_or((".", main.as_str()));
            if strip_module_ext(file) == "index" {
                entry.dts = self
                    .probe_owned(&[join(dir, "index.d.mts"), join(dir, "index.d.ts")])
                    .unwrap_or_default();
            }
        }
        entry
    }

    fn resolve_sub_module(&self, sub_module: &str) -> BuildEntry {
        let mut entry = BuildEntry::default();

        if !self.manifest.exports.is_empty() {
            let mut exported = self.resolve_subpath_export(sub_module);
            self.finalize(&mut exported);
            merge(&mut entry, exported);
        }

        if let Some(nested) = self.files.read_manifest(sub_module) {
            if entry.main().is_empty() {
                if !nested.module.is_empty() {
                    entry.set_main(join(sub_module, &nested.module), true);
                } else if !nested.main.is_empty() {
                    entry.set_main(join(sub_module, &nested.main), nested.is_module());
                }
            }
            if entry.dts.is_empty() {
                let types = if nested.types.is_empty() {
                    &nested.typings
                } else {
                    &nested.types
                };
                if !types.is_empty() {
                    entry.dts = join(sub_module, types);
                }
            }
        }

        self.finalize(&mut entry);

        let base = normalize_entry_path(sub_module);
        let is_module = self.manifest.is_module();
        if entry.main().is_empty() {
            let mut esm = vec![format!("{base}.mjs"), format!("{base}/index.mjs")];
            if is_module {
                esm.extend([format!("{base}.js"), format!("{base}/index.js")]);
            }
            if let Some(found) = self.probe_owned(&esm) {
                entry.set_main(found, true);
            }
        }
        if entry.main().is_empty() {
            let mut cjs = vec![format!("{base}.cjs"), format!("{base}/index.cjs")];
            if !is_module {
                cjs.extend([format!("{base}.js"), format!("{base}/index.js")]);
            }
            if let Some(found) = self.probe_owned(&cjs) {
                entry.set_main(found, false);
            }
        }

        if entry.dts.is_empty() && !entry.main().is_empty() {
            entry.dts = self.dts_sibling(entry.main()).unwrap_or_default();
        }
        if entry.dts.is_empty() {
            entry.dts = self
                .probe_owned(&[
                    format!("{base}.d.mts"),
                    format!("{base}.d.ts"),
                    format!("{base}/index.d.mts"),
                    format!("{base}/index.d.ts"),
                ])
                .unwrap_or_default();
        }
        entry
    }

    /// Exact key first; `*` keys only when no exact key exists.
    fn resolve_subpath_export(&self, sub_module: &str) -> BuildEntry {
        let wanted = format!("./{sub_module}");
        let exports = &self.manifest.exports;

        let exact = exports
            .iter()
            .find(|(key, _)| key.as_str() == wanted || strip_module_ext(key) == wanted);
        if let Some((key, value)) = exact {
            trace!(%key, "exports exact match");
            return self.resolve_export_value(value);
        }

        for (key, value) in exports {
            let Some(star) = match_star(key, &wanted) else {
                continue;
            };
            match value {
                ConditionValue::Path(pattern) => {
                    let path = pattern.replace('*', star);
                    if self.exists(&path) {
                        trace!(%key, %path, "exports pattern match");
                        let mut entry = BuildEntry::default();
                        entry.set_main(&path, self.module_kind(&path));
                        return entry;
                    }
                }
                ConditionValue::Conditions(_) => {
                    let mut entry = self.resolve_export_value(&value.replace_star(star));
                    self.finalize(&mut entry);
                    if !entry.is_empty() {
                        trace!(%key, "exports pattern match");
                        return entry;
                    }
                }
            }
        }
        BuildEntry::default()
    }

    fn resolve_export_value(&self, value: &ConditionValue) -> BuildEntry {
        match value {
            ConditionValue::Path(path) => {
                let mut entry = BuildEntry::default();
                entry.set_main(path, self.module_kind(path));
                entry
            }
            ConditionValue::Conditions(conditions) => {
                let preferred = if self.manifest.is_module() {
                    EntryKind::Module
                } else {
                    EntryKind::CommonJs
                };
                self.conditions.resolve(conditions, preferred)
            }
        }
    }

    /// Normalize paths, complete missing extensions, drop JavaScript entries
    /// that do not exist, and reclassify CommonJS entries that are ESM.
    fn finalize(&self, entry: &mut BuildEntry) {
        let main = entry.main().to_string();
        if !main.is_empty() {
            let module = entry.is_module();
            let mut main = normalize_entry_path(&main);
            let preferred = if module { ".mjs" } else { ".cjs" };
            if !main.ends_with(preferred) && !main.ends_with(".js") {
                let candidates = [
                    format!("{main}{preferred}"),
                    format!("{main}.js"),
                    format!("{main}/index{preferred}"),
                    format!("{main}/index.js"),
                ];
                if let Some(found) = self.probe_owned(&candidates) {
                    main = found;
                }
            }

            if !self.exists(&main) {
                entry.clear_main();
            } else if !module && !main.ends_with(".cjs") {
                let module = self.files.sniff_module(&main).unwrap_or(false);
                entry.set_main(main, module);
            } else {
                entry.set_main(main, module);
            }
        }

        if !entry.dts.is_empty() {
            entry.dts = self.finalize_dts(&normalize_entry_path(&entry.dts));
        }
    }

    fn finalize_dts(&self, dts: &str) -> String {
        if ends_with_any(dts, &[".js", ".mjs", ".cjs"]) {
            return self.dts_sibling(dts).unwrap_or_else(|| dts.to_string());
        }
        if dts.ends_with(".d") {
            return self
                .probe_owned(&[format!("{dts}.mts"), format!("{dts}.ts")])
                .unwrap_or_else(|| dts.to_string());
        }
        if ends_with_any(dts, DTS_EXTS) {
            return dts.to_string();
        }
        let candidates: Vec<String> = [
            ".d.mts",
            ".d.ts",
            ".mts",
            ".ts",
            "/index.d.mts",
            "/index.d.ts",
            "/index.mts",
            "/index.ts",
        ]
        .iter()
        .map(|ext| format!("{dts}{ext}"))
        .collect();
        self.probe_owned(&candidates)
            .unwrap_or_else(|| dts.to_string())
    }

    /// `.d.mts` or `.d.ts` next to a JavaScript file.
    fn dts_sibling(&self, js: &str) -> Option<String> {
        let stem = strip_module_ext(js);
        self.probe_owned(&[format!("{stem}.d.mts"), format!("{stem}.d.ts")])
    }

    fn probe(&self, candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find(|c| self.exists(c))
            .map(|c| (*c).to_string())
    }

    fn probe_owned(&self, candidates: &[String]) -> Option<String> {
        candidates.iter().find(|c| self.exists(c)).cloned()
    }

    fn apply_browser(&self, entry: &mut BuildEntry, is_root: bool) {
        let browser = &self.manifest.browser;
        let main = entry.main().to_string();
        let mut remaps: Vec<&str> = Vec::new();
        if !main.is_empty() {
            if let Some((_, to)) = browser
                .iter()
                .find(|(from, _)| normalize_entry_path(from) == main)
            {
                remaps.push(to);
            }
        }
        if is_root {
            if let Some(to) = browser.get(".") {
                remaps.push(to);
            }
        }

        for to in remaps {
            trace!(from = %main, %to, "browser remap");
            if to.is_empty() {
                entry.clear_main();
            } else if self.exists(to) {
                let to = normalize_entry_path(to);
                let module = self.module_kind(&to);
                entry.set_main(to, module);
            }
        }
    }
}

/// `*` substitution for a pattern key, or `None` when `wanted` does not match.
fn match_star<'w>(key: &str, wanted: &'w str) -> Option<&'w str> {
    let (prefix, suffix) = key.split_once('*')?;
    if suffix.contains('*') {
        return None;
    }
    let rest = wanted.strip_prefix(prefix)?;
    // Keys like `./*.js` also match extension-less requests
    let star = rest
        .strip_suffix(suffix)
        .or_else(|| rest.strip_suffix(strip_module_ext(suffix)))?;
    (!star.is_empty()).then_some(star)
}

/// Overlay the non-empty slots of `from` onto `into`.
fn merge(into: &mut BuildEntry, from: BuildEntry) {
    if !from.main().is_empty() {
        into.set_main(from.main(), from.is_module());
    }
    if !from.dts.is_empty() {
        into.dts = from.dts;
    }
}
