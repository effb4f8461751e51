use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cinder_core::{compile_files, Opts};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Compiles Cinder sources to a single C file", long_about = None)]
struct Cli {
    /// Input .cdr files. The first file's directory is searched for modules.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (defaults to the first input with a .c extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Production build: warnings are treated as errors
    #[arg(long)]
    prod: bool,

    /// Emit #line directives so C compiler errors point at Cinder source
    #[arg(short = 'g', long)]
    debug: bool,

    /// Additional module search paths
    #[arg(long, value_name = "PATH")]
    modpath: Vec<PathBuf>,

    /// Output format (only c for now)
    #[arg(long, value_name = "FORMAT", default_value = "c")]
    emit: String,

    /// Compile as a library (no main function required)
    #[arg(long)]
    lib: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    if cli.emit != "c" {
        return Err(anyhow::anyhow!("unsupported emit format: {}", cli.emit));
    }
    let first = cli.inputs[0].clone();

    let mut search_paths = Vec::new();
    match first.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            search_paths.push(parent.to_path_buf());
        }
        _ => search_paths.push(PathBuf::from(".")),
    }
    search_paths.extend(cli.modpath.iter().cloned());

    let opts = Opts {
        prod: cli.prod,
        line_directives: cli.debug,
        mod_search_paths: search_paths,
        require_main: !cli.lib,
    };

    let artifact = compile_files(&cli.inputs, &opts)
        .with_context(|| format!("failed to compile {}", first.display()))?;

    let output = cli
        .output
        .unwrap_or_else(|| first.with_extension("c"));
    write_output(&output, artifact.c_source.as_bytes())?;
    Ok(())
}

fn write_output(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    fn cinder() -> Command {
        Command::cargo_bin("cinder-cli").expect("binary exists")
    }

    #[test]
    fn compiles_to_c() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.cdr");
        fs::write(&input, "fn main() { x := 1 + 2 println('$x') }").expect("write input");
        let output = dir.path().join("out.c");

        cinder()
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .assert()
            .success();

        let c = fs::read_to_string(&output).expect("read output");
        assert!(c.contains("int x = 1 + 2;"));
        assert!(c.contains("int main(int argc, char** argv)"));
    }

    #[test]
    fn output_defaults_next_to_input() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("prog.cdr");
        fs::write(&input, "fn main() { println('hi') }").expect("write input");

        cinder().arg(&input).assert().success();

        assert!(dir.path().join("prog.c").exists(), "default output missing");
    }

    #[test]
    fn reports_unused_variable() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.cdr");
        fs::write(&input, "fn main() { x := 1 }").expect("write input");

        cinder()
            .arg(&input)
            .assert()
            .failure()
            .stderr(predicate::str::contains("declared and not used"));
    }

    #[test]
    fn prod_promotes_deprecation_warnings() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.cdr");
        let src = "fn main() { x := 1 switch x { 1 { println('one') } else { println('o') } } }";
        fs::write(&input, src).expect("write input");
        let output = dir.path().join("out.c");

        cinder()
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .assert()
            .success()
            .stderr(predicate::str::contains("deprecated"));

        cinder()
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--prod")
            .assert()
            .failure()
            .stderr(predicate::str::contains("warning treated as error"));
    }

    #[test]
    fn resolves_modules_beside_the_input() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("main.cdr"),
            "import math\nfn main() { println('${math.add(1, 2)}') }",
        )
        .expect("write main");
        fs::write(
            dir.path().join("math.cdr"),
            "module math\npub fn add(a, b int) int { return a + b }",
        )
        .expect("write math");
        let output = dir.path().join("out.c");

        cinder()
            .arg(dir.path().join("main.cdr"))
            .arg("--output")
            .arg(&output)
            .assert()
            .success();

        let c = fs::read_to_string(&output).expect("read output");
        assert!(c.contains("math__add(1, 2)"));
    }

    #[test]
    fn resolves_modules_from_modpath() {
        let dir = tempdir().expect("tempdir");
        let libs = dir.path().join("libs");
        fs::create_dir_all(&libs).expect("create libs");
        fs::write(
            dir.path().join("main.cdr"),
            "import util\nfn main() { println(util.greeting()) }",
        )
        .expect("write main");
        fs::write(
            libs.join("util.cdr"),
            "module util\npub fn greeting() string { return 'hello' }",
        )
        .expect("write util");
        let output = dir.path().join("out.c");

        cinder()
            .arg(dir.path().join("main.cdr"))
            .arg("--output")
            .arg(&output)
            .arg("--modpath")
            .arg(&libs)
            .assert()
            .success();

        let c = fs::read_to_string(&output).expect("read output");
        assert!(c.contains("util__greeting()"));
    }

    #[test]
    fn reports_import_cycles() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("main.cdr"),
            "import a\nfn main() { println('${a.fa()}') }",
        )
        .expect("write main");
        fs::write(
            dir.path().join("a.cdr"),
            "module a\nimport b\npub fn fa() int { return b.fb() }",
        )
        .expect("write a");
        fs::write(
            dir.path().join("b.cdr"),
            "module b\nimport a\npub fn fb() int { return a.fa() }",
        )
        .expect("write b");

        cinder()
            .arg(dir.path().join("main.cdr"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("import cycle"));
    }

    #[test]
    fn lib_mode_needs_no_main() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("util.cdr");
        fs::write(&input, "module util\npub fn twice(n int) int { return n * 2 }")
            .expect("write input");
        let output = dir.path().join("util.c");

        cinder()
            .arg(&input)
            .assert()
            .failure()
            .stderr(predicate::str::contains("main"));

        cinder()
            .arg(&input)
            .arg("--lib")
            .arg("--output")
            .arg(&output)
            .assert()
            .success();

        let c = fs::read_to_string(&output).expect("read output");
        assert!(c.contains("int util__twice(int n) {"));
    }
}
