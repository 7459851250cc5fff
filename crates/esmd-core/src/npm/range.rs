//! Version resolution using semver.

use super::name::{is_dist_tag, normalize_version};
use super::registry::Packument;
use crate::error::{Error, Result};
use semver::{Version, VersionReq};

/// Resolve a version constraint against a packument.
///
/// # Rules
/// - Empty, `*`, and `latest` return `dist-tags.latest`
/// - Any other dist-tag present in the packument returns its target
/// - An exact version returns itself if published
/// - A semver range returns the highest satisfying version
/// - Supports OR ranges like `^1.0.0 || ^2.0.0`
pub fn resolve_version(packument: &Packument, range: &str) -> Result<String> {
    let name = packument.name.as_str();
    let range = normalize_version(range);

    if let Some(tagged) = packument.dist_tags.get(&range) {
        return Ok(tagged.clone());
    }
    if is_dist_tag(&range) {
        return Err(Error::not_found(format!("{name}: no dist-tags.{range} found")));
    }

    if packument.versions.contains_key(&range) {
        return Ok(range);
    }

    let mut parsed: Vec<Version> = packument
        .versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .collect();

    // Highest first
    parsed.sort_by(|a, b| b.cmp(a));

    highest_satisfying(&range, &parsed)?
        .map(|v| v.to_string())
        .ok_or_else(|| Error::not_found(format!("No version of {name} satisfies range: {range}")))
}

/// Pick the highest of `versions` (sorted descending) that satisfies `range`.
pub fn highest_satisfying<'a>(range: &str, versions: &'a [Version]) -> Result<Option<&'a Version>> {
    let reqs = parse_or_range(range)?;
    Ok(versions
        .iter()
        .find(|version| reqs.iter().any(|req| req.matches(version))))
}

/// Split an OR range like `"^1.0.0 || ^2.0.0"` into its alternatives.
///
/// Invalid alternatives are skipped; an error is returned only when none parse.
fn parse_or_range(range: &str) -> Result<Vec<VersionReq>> {
    if !range.contains("||") {
        return Ok(vec![parse_range(range)?]);
    }

    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if reqs.is_empty() {
        return Err(Error::invalid_spec(format!(
            "Invalid version range '{range}': no valid alternatives"
        )));
    }
    Ok(reqs)
}

/// Parse a single version range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, *
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
pub fn parse_range(range: &str) -> Result<VersionReq> {
    let range = range.trim();
    let invalid = |e: semver::Error| Error::invalid_spec(format!("Invalid version range '{range}': {e}"));

    // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).map_err(invalid);
    }

    // "1.x" -> ">=1.0.0, <2.0.0"
    if range.contains('x') || range.contains('X') || range == "*" {
        return VersionReq::parse(&convert_x_range(range)).map_err(invalid);
    }

    VersionReq::parse(&convert_space_separated_comparators(range)).map_err(invalid)
}

fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() || end.contains(" - ") {
        return None;
    }
    Some((start.to_string(), end.to_string()))
}

/// npm allows `>= 2.1.2 < 3.0.0` to mean `>=2.1.2 AND <3.0.0`;
/// the semver crate wants `>=2.1.2, <3.0.0`.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            if !result.is_empty() {
                result.push_str(", ");
            }
            result.push_str(&pending_op);
            result.push_str(token);
            pending_op.clear();
        } else {
            // Operator separated from its version by a space
            pending_op.push_str(token);
        }
    }

    if result.is_empty() {
        return range.to_string();
    }
    result.push_str(&pending_op);
    result
}

fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] | [major, "x" | "X" | "*", "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_packument(versions: &[&str], latest: &str) -> Packument {
        let versions_obj: serde_json::Map<String, serde_json::Value> = versions
            .iter()
            .map(|v| ((*v).to_string(), json!({ "name": "test-pkg", "version": v })))
            .collect();

        Packument::from_json(&json!({
            "name": "test-pkg",
            "dist-tags": { "latest": latest, "next": "3.0.0-rc.1" },
            "versions": versions_obj
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_latest() {
        let packument = make_packument(&["1.0.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version(&packument, "").unwrap(), "3.0.0");
        assert_eq!(resolve_version(&packument, "*").unwrap(), "3.0.0");
        assert_eq!(resolve_version(&packument, "latest").unwrap(), "3.0.0");
    }

    #[test]
    fn test_resolve_dist_tag() {
        let packument = make_packument(&["1.0.0", "3.0.0-rc.1"], "1.0.0");
        assert_eq!(resolve_version(&packument, "next").unwrap(), "3.0.0-rc.1");
    }

    #[test]
    fn test_resolve_exact_version() {
        let packument = make_packument(&["1.0.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version(&packument, "2.0.0").unwrap(), "2.0.0");
        assert_eq!(resolve_version(&packument, "=2.0.0").unwrap(), "2.0.0");
        assert_eq!(resolve_version(&packument, "v2.0.0").unwrap(), "2.0.0");
    }

    #[test]
    fn test_resolve_caret_range() {
        let packument = make_packument(&["1.0.0", "1.5.0", "2.0.0", "2.5.0"], "2.5.0");
        assert_eq!(resolve_version(&packument, "^1.0.0").unwrap(), "1.5.0");
    }

    #[test]
    fn test_resolve_tilde_range() {
        let packument = make_packument(&["1.0.0", "1.0.5", "1.1.0", "2.0.0"], "2.0.0");
        assert_eq!(resolve_version(&packument, "~1.0.0").unwrap(), "1.0.5");
    }

    #[test]
    fn test_resolve_major_only() {
        let packument = make_packument(&["1.0.0", "1.5.0", "2.0.0", "2.5.0"], "2.5.0");
        assert_eq!(resolve_version(&packument, "2").unwrap(), "2.5.0");
    }

    #[test]
    fn test_resolve_version_not_found() {
        let packument = make_packument(&["1.0.0", "2.0.0"], "2.0.0");
        let err = resolve_version(&packument, "^3.0.0").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_prerelease_excluded_from_caret() {
        let packument = make_packument(&["1.0.0", "2.0.0-alpha.1", "2.0.0"], "2.0.0");
        assert_eq!(resolve_version(&packument, "^2.0.0").unwrap(), "2.0.0");
    }

    #[test]
    fn test_invalid_range() {
        let packument = make_packument(&["1.0.0"], "1.0.0");
        let err = resolve_version(&packument, "not-a-range!!!").unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }

    #[test]
    fn test_or_range_picks_highest() {
        let packument = make_packument(&["1.5.0", "2.5.0"], "2.5.0");
        assert_eq!(resolve_version(&packument, "^1.0.0 || ^2.0.0").unwrap(), "2.5.0");
        assert_eq!(resolve_version(&packument, "^1.0.0||^3.0.0").unwrap(), "1.5.0");
    }

    #[test]
    fn test_x_and_hyphen_ranges() {
        let packument = make_packument(&["1.0.0", "1.5.0", "2.0.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version(&packument, "1.x").unwrap(), "1.5.0");
        assert_eq!(resolve_version(&packument, "1.0.0 - 2.0.0").unwrap(), "2.0.0");
    }

    #[test]
    fn test_space_separated_comparators() {
        let packument = make_packument(&["2.0.0", "2.1.2", "2.5.0", "3.0.0"], "3.0.0");
        assert_eq!(resolve_version(&packument, ">= 2.1.2 < 3.0.0").unwrap(), "2.5.0");
        assert_eq!(resolve_version(&packument, ">=2.1.2 <3.0.0").unwrap(), "2.5.0");
    }
}
