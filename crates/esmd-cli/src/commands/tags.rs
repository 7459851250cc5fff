use super::resolve::registry_provider;
use esmd_core::Config;
use miette::{IntoDiagnostic, Result};

/// Print the dist-tags of a package.
pub fn run(config: &Config, name: &str, json: bool) -> Result<()> {
    let (_runtime, metadata) = registry_provider(config)?;
    let tags = metadata.dist_tags(name).into_diagnostic()?;

    if json {
        let json = serde_json::to_string_pretty(&tags).into_diagnostic()?;
        println!("{json}");
    } else {
        for (tag, version) in &tags {
            println!("{tag}: {version}");
        }
    }
    Ok(())
}
