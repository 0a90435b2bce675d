mod repl;

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use kiln_core::ast::{self, Root};
use kiln_core::lexer::Token;
use kiln_core::{Bytecode, CoreError, Session, SessionConfig, StageObserver, disassemble};

/// Compile kiln statements to stack-machine bytecode.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file to compile; starts the interactive REPL when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "disasm",
        help = "Output format: bytecode, container, disasm, tokens, ast"
    )]
    emit: String,

    #[arg(long, value_name = "N", default_value_t = 256)]
    max_scope_depth: usize,

    /// Do not declare the host builtins (print_i64, pow_i64, ...)
    #[arg(long)]
    no_builtins: bool,

    /// Dump tokens and the analyzed tree of every statement to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_scope_depth: self.max_scope_depth,
            builtins: !self.no_builtins,
            ..SessionConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let mut session = Session::new(cli.session_config())?;

    let Some(path) = cli.input.as_ref() else {
        return repl::run_repl(&mut session, cli.verbose);
    };

    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;

    let mut stages = Stages::new(cli.verbose);
    let code = match session.compile_line_with(&source, &mut stages) {
        Ok(code) => code,
        Err(err) => {
            report(&err, &source);
            anyhow::bail!("could not compile {}", path.display());
        }
    };

    let bytes = match cli.emit.as_str() {
        "bytecode" => code.into_bytes(),
        "container" => code.to_container(),
        "disasm" => format_listing(&code, 0)?.into_bytes(),
        "tokens" => stages.tokens.into_bytes(),
        "ast" => stages.trees.into_bytes(),
        other => return Err(anyhow::anyhow!("unsupported emit format: {other}")),
    };
    let binary = matches!(cli.emit.as_str(), "bytecode" | "container");

    match &cli.output {
        Some(path) => write_output(path, &bytes)?,
        None if binary => println!("{}", hex_dump(&bytes)),
        None => {
            io::stdout()
                .write_all(&bytes)
                .context("failed to write to stdout")?;
        }
    }

    Ok(())
}

/// Print a compile error as a diagnostic pointing into `source`.
pub(crate) fn report(err: &CoreError, source: &str) {
    eprintln!("{}", err.to_diagnostic().render(source));
}

/// Disassembly of `code`, one instruction per line, with offsets shifted by
/// `base` so they line up with the session's whole program.
pub(crate) fn format_listing(code: &Bytecode, base: usize) -> Result<String> {
    let mut out = String::new();
    for instr in disassemble(code.as_bytes())? {
        let shifted = kiln_core::Instruction {
            offset: instr.offset + base,
            ..instr
        };
        let _ = writeln!(out, "{shifted}");
    }
    Ok(out)
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_token(token: &Token) -> String {
    let mut line = format!(
        "{}..{} {}",
        token.span.start,
        token.span.end,
        token.kind.describe()
    );
    if let Some(text) = &token.text {
        let _ = write!(line, " {text:?}");
    }
    line
}

/// Collects per-statement dumps for `--emit tokens|ast` and echoes them to
/// stderr under `--verbose`.
pub(crate) struct Stages {
    verbose: bool,
    tokens: String,
    trees: String,
}

impl Stages {
    pub(crate) fn new(verbose: bool) -> Self {
        Stages {
            verbose,
            tokens: String::new(),
            trees: String::new(),
        }
    }
}

impl StageObserver for Stages {
    fn tokens(&mut self, tokens: &[Token]) {
        let dump: String = tokens
            .iter()
            .map(|token| describe_token(token) + "\n")
            .collect();
        if self.verbose {
            eprint!("[tokens]\n{dump}");
        }
        self.tokens.push_str(&dump);
    }

    fn analyzed(&mut self, root: &Root<'_>) {
        let dump = ast::dump(root);
        if self.verbose {
            eprint!("[ast]\n{dump}");
        }
        self.trees.push_str(&dump);
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
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

    fn kiln() -> Command {
        Command::cargo_bin("kiln").expect("binary exists")
    }

    #[test]
    fn prints_disassembly_by_default() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x: i64 = 5;\ny := x + 1\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("0000  PUSHQW 5"))
            .stdout(predicate::str::contains("0009  STOREQW slot 0"))
            .stdout(predicate::str::contains("ADDQW"))
            .stdout(predicate::str::contains("STOREQW slot 1"));
    }

    #[test]
    fn writes_raw_bytecode() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x: i64 = 5;").expect("write input");
        let output_path = dir.path().join("out/x.bin");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--emit")
            .arg("bytecode")
            .assert()
            .success();

        let bytes = fs::read(&output_path).expect("read output");
        assert_eq!(bytes, vec![0x04, 0, 0, 0, 0, 0, 0, 0, 5, 0x23, 0, 0]);
    }

    #[test]
    fn writes_container_with_header() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "b := true").expect("write input");
        let output_path = dir.path().join("out.kbc");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--emit")
            .arg("container")
            .assert()
            .success();

        let bytes = fs::read(&output_path).expect("read output");
        assert_eq!(&bytes[..4], b"KILN");
        let code = Bytecode::from_container(&bytes).expect("valid container");
        assert_eq!(code.len(), 8);
    }

    #[test]
    fn hex_dumps_binary_formats_to_stdout() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "c := 'a'").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--emit")
            .arg("bytecode")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("01 61 20 00 00"));
    }

    #[test]
    fn reports_redeclaration_with_caret() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x: i64 = 1; x: i64 = 2;\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("error[E0301]: redeclaration of symbol `x`"))
            .stderr(predicate::str::contains("^"));
    }

    #[test]
    fn reports_arity_errors() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "p := pow_i64(2)\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "incorrect number of passed arguments, wanted 2, got 1",
            ));
    }

    #[test]
    fn no_builtins_hides_host_functions() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "print_i64(1)\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--no-builtins")
            .assert()
            .failure()
            .stderr(predicate::str::contains("undefined identifier `print_i64`"));
    }

    #[test]
    fn emits_tokens_and_ast() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x := 1 + 2\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--emit")
            .arg("tokens")
            .assert()
            .success()
            .stdout(predicate::str::contains("0..1 identifier \"x\""))
            .stdout(predicate::str::contains("plus"));

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--emit")
            .arg("ast")
            .assert()
            .success()
            .stdout(predicate::str::contains("Declaration x : i64"))
            .stdout(predicate::str::contains("Binary plus : i64"));
    }

    #[test]
    fn verbose_dumps_stages_to_stderr() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x := 1\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--verbose")
            .assert()
            .success()
            .stderr(predicate::str::contains("[tokens]"))
            .stderr(predicate::str::contains("[ast]"));
    }

    #[test]
    fn rejects_unknown_emit_format() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.kiln");
        fs::write(&input_path, "x := 1\n").expect("write input");

        kiln()
            .arg("--input")
            .arg(&input_path)
            .arg("--emit")
            .arg("wasm")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported emit format: wasm"));
    }

    #[test]
    fn reports_missing_input_file() {
        kiln()
            .arg("--input")
            .arg("does/not/exist.kiln")
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read input file"));
    }

    #[test]
    fn listing_offsets_follow_program_base() {
        let mut session = Session::new(SessionConfig::default()).unwrap();
        let code = session.compile_line("a := 1").unwrap();
        let listing = format_listing(&code, 0x20).unwrap();
        assert_eq!(listing, "0020  PUSHQW 1\n0029  STOREQW slot 0\n");
    }
}
