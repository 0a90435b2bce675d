//! Interactive read-compile-print loop.

use anyhow::Result;
use kiln_core::Session;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::{Stages, format_listing, report};

/// Read statements line by line and print the bytecode each one produces.
///
/// A line that fails to compile is reported and dropped; the session keeps
/// everything declared by earlier lines.
pub fn run_repl(session: &mut Session, verbose: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()
        .map_err(|e| anyhow::anyhow!("failed to initialize line editor: {e}"))?;

    println!("kiln {}", env!("CARGO_PKG_VERSION"));
    println!("Type statements ending in `;` or a newline, or .help for commands.");

    loop {
        match editor.readline("kiln> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);

                if trimmed.starts_with('.') {
                    if run_command(trimmed, session)? == Flow::Exit {
                        break;
                    }
                    continue;
                }

                let base = session.program_len();
                let mut stages = Stages::new(verbose);
                match session.compile_line_with(&line, &mut stages) {
                    Ok(code) => print!("{}", format_listing(&code, base)?),
                    Err(err) => report(&err, &line),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Press Ctrl-D or type .exit to quit");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(anyhow::anyhow!("failed to read input: {err}")),
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

fn run_command(command: &str, session: &mut Session) -> Result<Flow> {
    match command {
        ".help" => {
            println!("REPL Commands:");
            println!("  .help     - Show this help message");
            println!("  .symbols  - List declared symbols and their types");
            println!("  .slots    - List variable slots");
            println!("  .reset    - Forget all declarations");
            println!("  .exit     - Exit the REPL");
        }
        ".symbols" => {
            for symbol in session.symbols() {
                println!("{}: {}", symbol.name, symbol.ty);
            }
        }
        ".slots" => {
            for (name, slot) in session.slots() {
                println!("{slot:>5}  {name}");
            }
        }
        ".reset" => {
            session.reset()?;
            println!("Session cleared");
        }
        ".exit" => return Ok(Flow::Exit),
        _ => {
            println!("Unknown command: {command}");
            println!("Type .help for available commands");
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::SessionConfig;

    #[test]
    fn exit_command_stops_the_loop() {
        let mut session = Session::new(SessionConfig::default()).unwrap();
        assert_eq!(run_command(".exit", &mut session).unwrap(), Flow::Exit);
        assert_eq!(run_command(".help", &mut session).unwrap(), Flow::Continue);
        assert_eq!(run_command(".bogus", &mut session).unwrap(), Flow::Continue);
    }

    #[test]
    fn reset_command_clears_declarations() {
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.compile_line("x := 1").unwrap();
        run_command(".reset", &mut session).unwrap();
        assert!(session.slots().is_empty());
        assert!(session.compile_line("x := 2").is_ok());
    }
}
