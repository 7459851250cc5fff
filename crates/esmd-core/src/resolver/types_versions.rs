//! `typesVersions` remapping of declaration entries.

use super::entry::normalize_entry_path;
use crate::npm::manifest::TypesVersions;
use indexmap::IndexMap;

/// Remap `dts` (`./`-prefixed) through `typesVersions`.
///
/// Range keys are compared as plain strings and tried highest first; the
/// first mapping that matches wins. A mapping matches by exact path, by a
/// `dir/*` prefix, or through a catch-all `*` key. Returns `None` when no
/// mapping applies.
#[must_use]
pub fn apply_types_versions(types_versions: &TypesVersions, dts: &str) -> Option<String> {
    let mut ranges: Vec<&String> = types_versions.keys().collect();
    ranges.sort();
    ranges
        .into_iter()
        .rev()
        .find_map(|range| remap(&types_versions[range], dts))
}

fn remap(mapping: &IndexMap<String, Vec<String>>, dts: &str) -> Option<String> {
    let bare = dts.trim_start_matches("./");

    if let Some(targets) = mapping.get(dts).or_else(|| mapping.get(bare)) {
        return targets.first().map(|t| normalize_entry_path(t));
    }

    let mut suffix = None;
    let mut targets = None;
    for (pattern, candidates) in mapping {
        if !pattern.ends_with("/*") {
            continue;
        }
        let pattern = normalize_entry_path(pattern);
        let prefix = pattern.trim_end_matches('*');
        if let Some(rest) = dts.strip_prefix(prefix) {
            suffix = Some(rest.to_string());
            targets = Some(candidates);
            break;
        }
    }
    let targets = match targets {
        Some(t) => t,
        None => mapping.get("*")?,
    };

    let target = normalize_entry_path(targets.first()?);
    let prefix = target.rsplit_once('*').map_or(target.as_str(), |(p, _)| p);
    Some(match suffix {
        Some(suffix) if !suffix.is_empty() => format!("{prefix}{suffix}"),
        _ => match dts.strip_prefix(prefix) {
            Some(diff) => target.replace('*', diff),
            None => format!("{prefix}{bare}"),
        },
    })
}
