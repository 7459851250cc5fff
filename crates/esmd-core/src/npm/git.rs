//! GitHub ref resolution via `git ls-remote`.

use super::range::highest_satisfying;
use crate::error::{Error, Result};
use semver::Version;
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, warn};

/// One line of `git ls-remote` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub sha: String,
    /// `HEAD`, `refs/heads/<branch>`, or `refs/tags/<tag>`.
    pub name: String,
}

/// Lists the refs of a GitHub repository (`owner/repo`).
pub trait GitRefLister: Send + Sync {
    fn list_refs(&self, repo: &str) -> Result<Vec<GitRef>>;
}

/// Runs the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitRefLister for GitCli {
    fn list_refs(&self, repo: &str) -> Result<Vec<GitRef>> {
        let url = format!("https://github.com/{repo}");
        debug!(%url, "git ls-remote");
        let output = Command::new("git")
            .args(["ls-remote", &url])
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| Error::upstream(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::upstream(format!(
                "git ls-remote {url} failed: {}",
                stderr.trim()
            )));
        }
        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `<sha>\t<ref>` lines.
#[must_use]
pub fn parse_ls_remote(output: &str) -> Vec<GitRef> {
    output
        .lines()
        .filter_map(|line| {
            let (sha, name) = line.trim().split_once('\t')?;
            Some(GitRef {
                sha: sha.trim().to_string(),
                name: name.trim().to_string(),
            })
        })
        .filter(|r| !r.sha.is_empty() && !r.name.is_empty())
        .collect()
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

/// Resolve a requested GitHub version to an abbreviated commit.
///
/// An empty request resolves to `HEAD`. Otherwise an exact tag or branch
/// wins, then the highest tag satisfying a semver constraint (an optional
/// `semver:` prefix is ignored), then `HEAD`.
pub fn resolve_github_ref(refs: &[GitRef], wanted: &str) -> Result<String> {
    // Annotated tags list the tag object first and the commit as `<tag>^{}`
    let mut by_name: BTreeMap<&str, &str> = BTreeMap::new();
    for r in refs {
        match r.name.strip_suffix("^{}") {
            Some(tag) => {
                by_name.insert(tag, &r.sha);
            }
            None => {
                by_name.entry(&r.name).or_insert(&r.sha);
            }
        }
    }

    let head = || {
        by_name
            .get("HEAD")
            .map(|sha| short_sha(sha))
            .ok_or_else(|| Error::not_found("github: repository has no HEAD"))
    };

    if wanted.is_empty() {
        return head();
    }

    for prefix in ["refs/tags/", "refs/heads/"] {
        if let Some(sha) = by_name.get(format!("{prefix}{wanted}").as_str()) {
            return Ok(short_sha(sha));
        }
    }

    let constraint = wanted.strip_prefix("semver:").unwrap_or(wanted);
    let mut tagged: Vec<(Version, &str)> = by_name
        .iter()
        .filter_map(|(name, sha)| {
            let tag = name.strip_prefix("refs/tags/")?;
            let version = Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()?;
            Some((version, *sha))
        })
        .collect();
    tagged.sort_by(|a, b| b.0.cmp(&a.0));
    let versions: Vec<Version> = tagged.iter().map(|(v, _)| v.clone()).collect();

    if let Ok(Some(best)) = highest_satisfying(constraint, &versions) {
        if let Some((_, sha)) = tagged.iter().find(|(v, _)| v == best) {
            return Ok(short_sha(sha));
        }
    }

    warn!(wanted, "github: no matching tag or branch, using HEAD");
    head()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LS_REMOTE: &str = "\
1111111aaaaaaa\tHEAD
1111111aaaaaaa\trefs/heads/main
2222222bbbbbbb\trefs/heads/next
3333333ccccccc\trefs/tags/v1.0.0
4444444ddddddd\trefs/tags/v1.2.0
5555555eeeeeee\trefs/tags/v1.2.0^{}
6666666fffffff\trefs/tags/2.0.0
";

    #[test]
    fn test_parse_ls_remote() {
        let refs = parse_ls_remote(LS_REMOTE);
        assert_eq!(refs.len(), 7);
        assert_eq!(refs[0].name, "HEAD");
        assert_eq!(refs[0].sha, "1111111aaaaaaa");
        assert!(parse_ls_remote("garbage\n\n").is_empty());
    }

    #[test]
    fn test_empty_resolves_to_head() {
        let refs = parse_ls_remote(LS_REMOTE);
        assert_eq!(resolve_github_ref(&refs, "").unwrap(), "1111111");
    }

    #[test]
    fn test_exact_branch_and_tag() {
        let refs = parse_ls_remote(LS_REMOTE);
        assert_eq!(resolve_github_ref(&refs, "next").unwrap(), "2222222");
        assert_eq!(resolve_github_ref(&refs, "v1.0.0").unwrap(), "3333333");
        // Peeled commit of an annotated tag
        assert_eq!(resolve_github_ref(&refs, "v1.2.0").unwrap(), "5555555");
    }

    #[test]
    fn test_semver_constraint_picks_highest() {
        let refs = parse_ls_remote(LS_REMOTE);
        assert_eq!(resolve_github_ref(&refs, "semver:^1.0.0").unwrap(), "5555555");
        assert_eq!(resolve_github_ref(&refs, "^2").unwrap(), "6666666");
    }

    #[test]
    fn test_unmatched_falls_back_to_head() {
        let refs = parse_ls_remote(LS_REMOTE);
        assert_eq!(resolve_github_ref(&refs, "no-such-branch").unwrap(), "1111111");
        assert!(resolve_github_ref(&[], "").unwrap_err().is_not_found());
    }
}
