use esmd_core::{parse_esm_path, ParsedEsmPath};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport<'a> {
    #[serde(flatten)]
    esm: &'a esmd_core::EsmPath,
    specifier: String,
    exact_version: bool,
    has_target_segment: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    extra_query: &'a str,
}

/// Parse a request path without touching the registry.
pub fn run(path: &str, json: bool) -> Result<()> {
    let parsed = parse_esm_path(path).into_diagnostic()?;
    if json {
        print_json(&parsed)
    } else {
        print_human(&parsed);
        Ok(())
    }
}

fn print_json(parsed: &ParsedEsmPath) -> Result<()> {
    let report = ParseReport {
        esm: &parsed.esm,
        specifier: parsed.esm.specifier(),
        exact_version: parsed.exact_version,
        has_target_segment: parsed.has_target_segment,
        extra_query: &parsed.extra_query,
    };
    let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn print_human(parsed: &ParsedEsmPath) {
    let esm = &parsed.esm;
    let source = if esm.gh {
        "github"
    } else if esm.pr {
        "pkg.pr.new"
    } else {
        "npm"
    };
    println!("package:  {}", esm.pkg_name);
    println!(
        "version:  {}{}",
        if esm.pkg_version.is_empty() { "(none)" } else { esm.pkg_version.as_str() },
        if parsed.exact_version { " (exact)" } else { "" }
    );
    println!("source:   {source}");
    if !esm.sub_path.is_empty() {
        println!("subpath:  {}", esm.sub_path);
    }
    if parsed.has_target_segment {
        println!("artifact: yes");
    }
    if !parsed.extra_query.is_empty() {
        println!("query:    {}", parsed.extra_query);
    }
}
