use esmd_core::resolver::DirPackageFiles;
use esmd_core::{EntryResolver, PackageManifest, Target};
use miette::{IntoDiagnostic, Result};
use std::path::Path;

/// Resolve the build entry of `subpath` inside the package at `dir`.
pub fn run(
    dir: &Path,
    subpath: &str,
    target: Target,
    dev: bool,
    conditions: &[String],
    json: bool,
) -> Result<()> {
    let manifest = PackageManifest::read(&dir.join("package.json")).into_diagnostic()?;
    let files = DirPackageFiles::new(dir);
    let entry = EntryResolver::new(&manifest, &files, target)
        .with_conditions(dev, conditions)
        .resolve(subpath);

    if entry.is_empty() {
        miette::bail!(
            "no entry found for '{}{}{}'",
            manifest.name,
            if subpath.is_empty() { "" } else { "/" },
            subpath
        );
    }

    if json {
        let json = serde_json::to_string_pretty(&entry).into_diagnostic()?;
        println!("{json}");
    } else {
        for (label, path) in [("esm", &entry.esm), ("cjs", &entry.cjs), ("dts", &entry.dts)] {
            if !path.is_empty() {
                println!("{label}: {path}");
            }
        }
    }
    Ok(())
}
