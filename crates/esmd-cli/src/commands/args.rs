use esmd_core::BuildArgs;
use miette::{IntoDiagnostic, Result};

/// Flags for `esmd args encode`.
#[derive(clap::Args, Debug)]
pub struct EncodeOptions {
    /// Package the args are encoded for; overrides naming it are dropped
    #[arg(long)]
    pkg: String,

    /// Import alias, `from:to` (repeatable)
    #[arg(long, value_name = "FROM:TO")]
    alias: Vec<String>,

    /// Pinned dependency, `name@version` (repeatable)
    #[arg(long = "dep", value_name = "NAME@VERSION")]
    deps: Vec<String>,

    /// Specifier kept external (repeatable)
    #[arg(long)]
    external: Vec<String>,

    /// Export kept when tree shaking (repeatable)
    #[arg(long = "export")]
    exports: Vec<String>,

    /// Extra export condition (repeatable)
    #[arg(long = "condition")]
    conditions: Vec<String>,

    #[arg(long)]
    external_require: bool,

    #[arg(long)]
    keep_names: bool,

    #[arg(long)]
    ignore_annotations: bool,

    #[arg(long)]
    sourcemap: bool,

    /// Encode for a type-declaration build
    #[arg(long)]
    dts: bool,
}

fn split_dep(dep: &str) -> Option<(&str, &str)> {
    // The scope's `@` never separates the version
    let at = dep.get(1..)?.rfind('@')? + 1;
    let (name, version) = (&dep[..at], &dep[at + 1..]);
    (!name.is_empty() && !version.is_empty()).then_some((name, version))
}

impl EncodeOptions {
    fn to_build_args(&self) -> Result<BuildArgs> {
        let mut args = BuildArgs::default();
        for alias in &self.alias {
            let Some((from, to)) = alias.split_once(':') else {
                miette::bail!("invalid alias '{alias}', expected FROM:TO");
            };
            args.alias.insert(from.to_string(), to.to_string());
        }
        for dep in &self.deps {
            let Some((name, version)) = split_dep(dep) else {
                miette::bail!("invalid dependency '{dep}', expected NAME@VERSION");
            };
            args.deps.insert(name.to_string(), version.to_string());
        }
        args.external.extend(self.external.iter().cloned());
        args.exports.extend(self.exports.iter().cloned());
        args.conditions.clone_from(&self.conditions);
        args.external_require = self.external_require;
        args.keep_names = self.keep_names;
        args.ignore_annotations = self.ignore_annotations;
        args.sourcemap = self.sourcemap;
        Ok(args)
    }
}

pub fn encode(options: &EncodeOptions, json: bool) -> Result<()> {
    let args = options.to_build_args()?;
    let token = args.encode(&options.pkg, options.dts);

    if json {
        let segment = args.path_segment(&options.pkg, options.dts);
        println!(
            "{}",
            serde_json::json!({ "token": token, "segment": segment })
        );
    } else if token.is_empty() {
        eprintln!("nothing to encode for {}", options.pkg);
    } else {
        println!("X-{token}");
    }
    Ok(())
}

pub fn decode(token: &str, json: bool) -> Result<()> {
    let token = token.strip_prefix("X-").unwrap_or(token);
    let args = BuildArgs::decode(token).into_diagnostic()?;

    if json {
        let json = serde_json::to_string_pretty(&args).into_diagnostic()?;
        println!("{json}");
        return Ok(());
    }

    for (from, to) in &args.alias {
        println!("alias:     {from} -> {to}");
    }
    for (name, version) in &args.deps {
        println!("dep:       {name}@{version}");
    }
    for name in &args.external {
        println!("external:  {name}");
    }
    for name in &args.exports {
        println!("export:    {name}");
    }
    for name in &args.conditions {
        println!("condition: {name}");
    }
    for (flag, label) in [
        (args.external_require, "external-require"),
        (args.keep_names, "keep-names"),
        (args.ignore_annotations, "ignore-annotations"),
        (args.sourcemap, "sourcemap"),
    ] {
        if flag {
            println!("flag:      {label}");
        }
    }
    Ok(())
}
