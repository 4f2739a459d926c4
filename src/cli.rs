//! Command-line driver.
//!
//! `crosswind <file.cw>` seeds the module pool with the builtin module
//! and the given file, runs the full frontend, and exits non-zero with
//! a located error on failure. Bare-name imports resolve under
//! `--root`, falling back to the library tree bundled into the binary.

use clap::Parser;
use crosswind_front::compile;
use crosswind_front::{BaseTypeKind, Ctx, FileLoader, ModLoader};
use include_dir::{include_dir, Dir};
use serde::Serialize;
use std::path::PathBuf;

use crate::style::Style;

/// Library modules shipped with the compiler (`lib/*.cw`).
static BUNDLED_LIB: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/lib");

#[derive(Parser)]
#[command(name = "crosswind")]
#[command(about = "The crosswind compiler frontend", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source file to compile (must end in .cw)
    pub input: PathBuf,

    /// Library root directory for bare-name imports
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Print a JSON summary of loaded modules and canonical types
    #[arg(long)]
    pub emit_summary: bool,
}

/// Filesystem loader with the bundled library as fallback, so a plain
/// `crosswind main.cw` finds `builtin` without any setup.
struct DriverLoader {
    fs: FileLoader,
    root: String,
}

impl ModLoader for DriverLoader {
    fn canonical_path(&self, importer: Option<&str>, pathname: &str) -> String {
        self.fs.canonical_path(importer, pathname)
    }

    fn read(&self, canonical: &str) -> std::io::Result<String> {
        match self.fs.read(canonical) {
            Ok(source) => Ok(source),
            Err(err) => {
                let rel = canonical
                    .strip_prefix(self.root.as_str())
                    .map(|r| r.trim_start_matches('/'))
                    .unwrap_or(canonical);
                BUNDLED_LIB
                    .get_file(format!("{}.cw", rel))
                    .and_then(|f| f.contents_utf8())
                    .map(|s| s.to_string())
                    .ok_or(err)
            }
        }
    }
}

#[derive(Serialize)]
struct Summary {
    modules: Vec<String>,
    types: Vec<String>,
}

pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> i32 {
    if cli.input.extension().and_then(|e| e.to_str()) != Some("cw") {
        eprintln!(
            "{}: input `{}` does not end in .cw",
            Style::bold_red("error"),
            cli.input.display()
        );
        return 1;
    }
    let seed = {
        let stem = cli.input.with_extension("");
        let text = stem.to_string_lossy().into_owned();
        if text.starts_with('/') || text.starts_with('.') {
            text
        } else {
            format!("./{}", text)
        }
    };
    let loader = DriverLoader {
        fs: FileLoader::new(&cli.root),
        root: cli.root.to_string_lossy().into_owned(),
    };

    let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
    match compile::run(&mut ctx, &loader, &["builtin", seed.as_str()]) {
        Ok(()) => {
            if cli.emit_summary {
                let summary = Summary {
                    modules: ctx.modules.iter().map(|m| m.name.clone()).collect(),
                    types: ctx.corpus.names().map(str::to_string).collect(),
                };
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{}", json),
                    Err(err) => {
                        eprintln!("{}: {}", Style::bold_red("error"), err);
                        return 1;
                    }
                }
            } else {
                eprintln!(
                    "{} {} module(s)",
                    Style::cyan("checked"),
                    ctx.modules.len()
                );
            }
            0
        }
        Err(err) => {
            eprintln!(
                "{}: {}",
                Style::bold_red("error"),
                err.render(&ctx.interner)
            );
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_library_contains_builtin() {
        assert!(BUNDLED_LIB.get_file("builtin.cw").is_some());
    }

    #[test]
    fn compiles_a_file_against_the_bundled_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.cw");
        std::fs::write(
            &main,
            "(module main [
               (import builtin)
               (fun pub twice [(param x uint)] uint [(return (* x 2))])
             ])",
        )
        .unwrap();
        let cli = Cli {
            input: main,
            root: dir.path().to_path_buf(),
            emit_summary: false,
        };
        assert_eq!(run(&cli), 0);
    }

    #[test]
    fn bundled_loop_macros_expand() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.cw");
        std::fs::write(
            &main,
            "(module main [
               (import builtin)
               (fun pub main [] void [
                 (for i 0_uint 5_uint [
                   (stmt (call print_num [i]))
                 ])
                 (stmt (call print_str [builtin::NL]))
                 (return)
               ])
             ])",
        )
        .unwrap();
        let cli = Cli {
            input: main,
            root: dir.path().to_path_buf(),
            emit_summary: false,
        };
        assert_eq!(run(&cli), 0);
    }

    #[test]
    fn missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            input: dir.path().join("nope.cw"),
            root: dir.path().to_path_buf(),
            emit_summary: false,
        };
        assert_eq!(run(&cli), 1);
    }
}
