//! Build arguments and their URL-safe token encoding.
//!
//! The token is base64url (no padding) over newline-separated lines. Each
//! line starts with a one-byte tag:
//!
//! | tag | content                      |
//! |-----|------------------------------|
//! | `a` | `from:to,...` aliases        |
//! | `d` | `name@version,...` pins      |
//! | `e` | `name,...` externals         |
//! | `s` | `name,...` kept exports      |
//! | `c` | `name,...` extra conditions  |
//! | `r` | external `require` calls     |
//! | `k` | keep names                   |
//! | `i` | ignore annotations           |
//! | `m` | emit source maps             |
//!
//! Lists are sorted so equal arguments always produce equal tokens.

use crate::error::{Error, Result};
use crate::npm::{package_name_of, split_package_path, validate_package_name};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Per-request build overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArgs {
    /// Import name remaps, e.g. `react -> preact/compat`.
    pub alias: BTreeMap<String, String>,
    /// Pinned dependency versions.
    pub deps: BTreeMap<String, String>,
    /// Specifiers left untouched in the output.
    pub external: BTreeSet<String>,
    /// Exports to keep when tree shaking; empty keeps all.
    pub exports: BTreeSet<String>,
    /// Extra export conditions.
    pub conditions: Vec<String>,
    pub external_require: bool,
    pub keep_names: bool,
    pub ignore_annotations: bool,
    pub sourcemap: bool,
}

impl BuildArgs {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Canonical form for building `pkg_name`.
    ///
    /// Items are trimmed and blank ones dropped, the same way [`decode`]
    /// reads them. Entries that point back at the package itself are
    /// dropped and conditions are sorted and de-duplicated.
    ///
    /// [`decode`]: BuildArgs::decode
    #[must_use]
    pub fn prune(&self, pkg_name: &str) -> Self {
        let trimmed_set = |set: &BTreeSet<String>| -> BTreeSet<String> {
            set.iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let alias = self
            .alias
            .iter()
            .map(|(from, to)| (from.trim(), to.trim()))
            .filter(|(from, to)| {
                !from.is_empty()
                    && !to.is_empty()
                    && *from != pkg_name
                    && package_name_of(to) != pkg_name
                    && from != to
            })
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        let deps = self
            .deps
            .iter()
            .map(|(name, version)| (name.trim(), version.trim()))
            .filter(|(name, version)| !name.is_empty() && !version.is_empty() && *name != pkg_name)
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect();
        let mut external = trimmed_set(&self.external);
        external.remove(pkg_name);
        let conditions = self
            .conditions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            alias,
            deps,
            external,
            exports: trimmed_set(&self.exports),
            conditions,
            ..self.clone()
        }
    }

    /// Encode for `pkg_name`. Returns an empty string when nothing remains.
    ///
    /// Type-declaration builds ignore flags and kept exports.
    #[must_use]
    pub fn encode(&self, pkg_name: &str, is_dts: bool) -> String {
        let args = self.prune(pkg_name);
        let mut lines: Vec<String> = Vec::new();

        if !args.alias.is_empty() {
            let alias: Vec<String> = args
                .alias
                .iter()
                .map(|(from, to)| format!("{from}:{to}"))
                .collect();
            lines.push(format!("a{}", alias.join(",")));
        }
        if !args.deps.is_empty() {
            let deps: Vec<String> = args
                .deps
                .iter()
                .map(|(name, version)| format!("{name}@{version}"))
                .collect();
            lines.push(format!("d{}", deps.join(",")));
        }
        if !args.external.is_empty() {
            lines.push(format!("e{}", join_set(&args.external)));
        }
        if !is_dts && !args.exports.is_empty() {
            lines.push(format!("s{}", join_set(&args.exports)));
        }
        if !args.conditions.is_empty() {
            lines.push(format!("c{}", args.conditions.join(",")));
        }
        if !is_dts {
            for (flag, tag) in [
                (args.external_require, "r"),
                (args.keep_names, "k"),
                (args.ignore_annotations, "i"),
                (args.sourcemap, "m"),
            ] {
                if flag {
                    lines.push(tag.to_string());
                }
            }
        }

        if lines.is_empty() {
            return String::new();
        }
        URL_SAFE_NO_PAD.encode(lines.join("\n"))
    }

    /// `X-<token>` path segment, or `None` when the encoding is empty.
    #[must_use]
    pub fn path_segment(&self, pkg_name: &str, is_dts: bool) -> Option<String> {
        let token = self.encode(pkg_name, is_dts);
        (!token.is_empty()).then(|| format!("X-{token}"))
    }

    /// Decode a token produced by [`BuildArgs::encode`].
    pub fn decode(token: &str) -> Result<Self> {
        let invalid = |why: &str| Error::invalid_spec(format!("invalid build args: {why}"));

        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| invalid("not base64url"))?;
        let text = String::from_utf8(bytes).map_err(|_| invalid("not UTF-8"))?;

        let mut args = Self::default();
        for line in text.split('\n').filter(|l| !l.is_empty()) {
            let Some(tag) = line.chars().next() else {
                continue;
            };
            let body = &line[tag.len_utf8()..];
            let items = || body.split(',').map(str::trim).filter(|s| !s.is_empty());
            match tag {
                'a' => {
                    for item in items() {
                        let (from, to) = item
                            .split_once(':')
                            .filter(|(f, t)| !f.trim().is_empty() && !t.trim().is_empty())
                            .ok_or_else(|| invalid("malformed alias"))?;
                        args.alias
                            .insert(from.trim().to_string(), to.trim().to_string());
                    }
                }
                'd' => {
                    for item in items() {
                        let parts = split_package_path(item);
                        if !validate_package_name(&parts.name) || parts.version.is_empty() {
                            return Err(invalid("malformed dependency pin"));
                        }
                        args.deps.insert(parts.name, parts.version);
                    }
                }
                'e' => args.external.extend(items().map(String::from)),
                's' => args.exports.extend(items().map(String::from)),
                'c' => args.conditions.extend(items().map(String::from)),
                flag if body.is_empty() => match flag {
                    'r' => args.external_require = true,
                    'k' => args.keep_names = true,
                    'i' => args.ignore_annotations = true,
                    'm' => args.sourcemap = true,
                    _ => return Err(invalid("unknown flag")),
                },
                _ => return Err(invalid("unknown field")),
            }
        }
        Ok(args)
    }
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildArgs {
        BuildArgs {
            alias: BTreeMap::from([
                ("react".into(), "preact/compat".into()),
                ("react-dom".into(), "preact/compat".into()),
            ]),
            deps: BTreeMap::from([("preact".into(), "10.19.2".into())]),
            external: BTreeSet::from(["node:fs".into()]),
            exports: BTreeSet::from(["render".into(), "h".into()]),
            conditions: vec!["worker".into(), "react-server".into(), "worker".into()],
            keep_names: true,
            sourcemap: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_decode_equals_prune() {
        let args = sample();
        let token = args.encode("htm", false);
        assert!(!token.is_empty());
        assert!(!token.contains('='));
        assert_eq!(BuildArgs::decode(&token).unwrap(), args.prune("htm"));
    }

    #[test]
    fn test_blank_and_padded_items_round_trip() {
        let args = BuildArgs {
            alias: BTreeMap::from([
                (" react ".into(), " preact/compat".into()),
                ("".into(), "x".into()),
            ]),
            deps: BTreeMap::from([("preact ".into(), " 10.19.2".into())]),
            external: BTreeSet::from(["".into(), " node:fs ".into()]),
            exports: BTreeSet::from([" h ".into(), "  ".into()]),
            conditions: vec![" worker".into(), " ".into()],
            ..Default::default()
        };

        let pruned = args.prune("htm");
        assert_eq!(pruned.alias.get("react").map(String::as_str), Some("preact/compat"));
        assert_eq!(pruned.alias.len(), 1);
        assert_eq!(pruned.deps.get("preact").map(String::as_str), Some("10.19.2"));
        assert_eq!(pruned.external, BTreeSet::from(["node:fs".to_string()]));
        assert_eq!(pruned.exports, BTreeSet::from(["h".to_string()]));
        assert_eq!(pruned.conditions, vec!["worker"]);

        let decoded = BuildArgs::decode(&args.encode("htm", false)).unwrap();
        assert_eq!(decoded, pruned);

        let only_blank = BuildArgs {
            external: BTreeSet::from([String::new()]),
            ..Default::default()
        };
        assert!(only_blank.prune("htm").is_empty());
        assert_eq!(only_blank.encode("htm", false), "");
    }

    #[test]
    fn test_conditions_are_canonical() {
        let pruned = sample().prune("htm");
        assert_eq!(pruned.conditions, vec!["react-server", "worker"]);

        let mut reordered = sample();
        reordered.conditions.reverse();
        assert_eq!(reordered.encode("htm", false), sample().encode("htm", false));
    }

    #[test]
    fn test_self_references_pruned() {
        let mut args = BuildArgs::default();
        args.alias.insert("preact".into(), "react".into());
        args.alias.insert("react".into(), "preact/compat".into());
        args.deps.insert("preact".into(), "10.0.0".into());
        args.external.insert("preact".into());

        let pruned = args.prune("preact");
        assert!(pruned.is_empty());
        assert_eq!(args.encode("preact", false), "");
        assert_eq!(args.path_segment("preact", false), None);
    }

    #[test]
    fn test_dts_ignores_flags_and_exports() {
        let args = BuildArgs {
            keep_names: true,
            exports: BTreeSet::from(["a".into()]),
            ..Default::default()
        };
        assert_eq!(args.encode("pkg", true), "");
        assert!(!args.encode("pkg", false).is_empty());
    }

    #[test]
    fn test_wire_format() {
        let args = BuildArgs {
            deps: BTreeMap::from([("b".into(), "2.0.0".into()), ("a".into(), "1.0.0".into())]),
            external_require: true,
            ..Default::default()
        };
        let token = args.encode("pkg", false);
        let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(token).unwrap()).unwrap();
        assert_eq!(raw, "da@1.0.0,b@2.0.0\nr");

        let segment = args.path_segment("pkg", false).unwrap();
        assert!(segment.starts_with("X-"));
    }

    #[test]
    fn test_decode_scoped_dependency_pin() {
        let token = URL_SAFE_NO_PAD.encode("d@babel/core@7.24.0,react@18.2.0");
        let args = BuildArgs::decode(&token).unwrap();
        assert_eq!(args.deps.get("@babel/core"), Some(&"7.24.0".to_string()));
        assert_eq!(args.deps.get("react"), Some(&"18.2.0".to_string()));
    }

    #[test]
    fn test_decode_empty_token() {
        assert!(BuildArgs::decode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_malformed() {
        for raw in ["x", "zz", "areact", "dreact", "d@@", "kk"] {
            let token = URL_SAFE_NO_PAD.encode(raw);
            let err = BuildArgs::decode(&token).unwrap_err();
            assert!(matches!(err, Error::InvalidSpec(_)), "{raw} should be rejected");
        }
        assert!(matches!(
            BuildArgs::decode("not base64!").unwrap_err(),
            Error::InvalidSpec(_)
        ));
        let not_utf8 = URL_SAFE_NO_PAD.encode([0xff, 0xfe]);
        assert!(BuildArgs::decode(&not_utf8).is_err());
    }
}
