// src/build/terminal.rs

//! Interactive terminal frontend

use super::frontend::{ErrorChoice, ErrorRequest, Frontend};
use crate::error::Error;
use crate::phase::Phase;
use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::Command;
use tracing::warn;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Prints banners and asks on stdin what to do after a failure
pub struct TerminalFrontend {
    color: bool,
    /// Read menu answers from here; stdin unless a test swaps it
    input: Box<dyn BufRead>,
    modules: usize,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
            input: Box::new(io::BufReader::new(io::stdin())),
            modules: 0,
        }
    }

    pub fn with_input(mut self, input: Box<dyn BufRead>) -> Self {
        self.input = input;
        self
    }

    fn banner(&self, text: &str) {
        if self.color {
            println!("{BOLD}*** {text} ***{RESET}");
        } else {
            println!("*** {text} ***");
        }
    }

    fn read_answer(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn confirm(&mut self, phase: Phase) -> bool {
        let prompt = format!("Phase {phase} needs confirmation. Type \"yes\" to proceed: ");
        self.read_answer(&prompt).as_deref() == Some("yes")
    }

    fn start_shell(&self, request: &ErrorRequest<'_>) {
        let shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        println!("Exit the shell to continue with the build.");
        let mut command = Command::new(&shell);
        if let Some(dir) = &request.builddir {
            if dir.is_dir() {
                command.current_dir(dir);
            }
        }
        if let Err(e) = command.status() {
            warn!("Failed to start {}: {}", shell, e);
        }
    }
}

impl Default for TerminalFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for TerminalFrontend {
    fn start_build(&mut self, modules: &[&str]) {
        self.modules = modules.len();
    }

    fn end_build(&mut self, failures: &[String]) {
        if failures.is_empty() {
            self.banner(&format!("success [{}/{}]", self.modules, self.modules));
        } else {
            self.banner("the following modules were not built");
            println!("    {}", failures.join(" "));
        }
    }

    fn set_action(&mut self, action: &str, module: &str, progress: (usize, usize)) {
        let (current, total) = progress;
        let text = format!("*** {action} {module} ***");
        let counter = if total > 0 { format!(" [{current}/{total}]") } else { String::new() };
        if self.color {
            println!("{BOLD}{text}{RESET}{counter}");
        } else {
            println!("{text}{counter}");
        }
    }

    fn message(&mut self, msg: &str) {
        println!("I: {msg}");
    }

    fn handle_error(&mut self, request: &ErrorRequest<'_>) -> ErrorChoice {
        self.banner(&format!(
            "Error during phase {} of {}: {}",
            request.phase, request.module, request.error
        ));

        loop {
            println!("  [1] Rerun phase {}", request.phase);
            match request.next_phase {
                Some(next) => println!("  [2] Ignore error and continue to {next}"),
                None => println!("  [2] Ignore error and continue to next module"),
            }
            println!("  [3] Give up on module");
            println!("  [4] Start shell");
            println!("  [5] Reload configuration");
            for (i, option) in request.alternatives.iter().enumerate() {
                println!("  [{}] Go to phase \"{}\"", i + 6, option.phase);
            }

            let Some(answer) = self.read_answer("choice: ") else {
                return ErrorChoice::Fail;
            };
            match answer.as_str() {
                "1" => return ErrorChoice::Run(request.phase),
                "2" => {
                    return match request.next_phase {
                        Some(next) => ErrorChoice::Run(next),
                        None => ErrorChoice::Continue,
                    };
                }
                "3" => return ErrorChoice::Fail,
                "4" => self.start_shell(request),
                "5" => return ErrorChoice::ReloadConfig,
                other => {
                    let picked = other
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(6))
                        .and_then(|i| request.alternatives.get(i).copied());
                    match picked {
                        Some(option) if option.needs_confirmation => {
                            if self.confirm(option.phase) {
                                return ErrorChoice::Run(option.phase);
                            }
                        }
                        Some(option) => return ErrorChoice::Run(option.phase),
                        None => println!("invalid choice"),
                    }
                }
            }
        }
    }

    fn fatal_error(&mut self, module: &str, phase: Phase, error: &Error) {
        self.banner(&format!("Error during phase {phase} of {module}: {error}"));
        println!("Stopping because exit_on_error is set.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::frontend::RecoveryOption;
    use std::io::Cursor;

    fn request(error: &Error) -> ErrorRequest<'_> {
        ErrorRequest {
            module: "glib",
            phase: Phase::Build,
            next_phase: Some(Phase::Install),
            error,
            alternatives: vec![
                RecoveryOption { phase: Phase::ForceCheckout, needs_confirmation: true },
                RecoveryOption { phase: Phase::Configure, needs_confirmation: false },
            ],
            builddir: None,
        }
    }

    fn frontend(input: &str) -> TerminalFrontend {
        TerminalFrontend::new().with_input(Box::new(Cursor::new(input.to_string())))
    }

    #[test]
    fn test_menu_choices() {
        let err = Error::command("make", Some(2));
        assert_eq!(frontend("1\n").handle_error(&request(&err)), ErrorChoice::Run(Phase::Build));
        assert_eq!(frontend("2\n").handle_error(&request(&err)), ErrorChoice::Run(Phase::Install));
        assert_eq!(frontend("3\n").handle_error(&request(&err)), ErrorChoice::Fail);
        assert_eq!(frontend("7\n").handle_error(&request(&err)), ErrorChoice::Run(Phase::Configure));
        assert_eq!(frontend("").handle_error(&request(&err)), ErrorChoice::Fail);
    }

    #[test]
    fn test_confirmation_required() {
        let err = Error::command("make", Some(2));
        assert_eq!(
            frontend("6\nno\n3\n").handle_error(&request(&err)),
            ErrorChoice::Fail
        );
        assert_eq!(
            frontend("6\nyes\n").handle_error(&request(&err)),
            ErrorChoice::Run(Phase::ForceCheckout)
        );
    }

    #[test]
    fn test_invalid_choice_asks_again() {
        let err = Error::command("make", Some(2));
        assert_eq!(frontend("42\nx\n5\n").handle_error(&request(&err)), ErrorChoice::ReloadConfig);
    }
}
