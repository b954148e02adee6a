// src/system/shell.rs

use crate::constants::FALLBACK_SHELL;
use std::env;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShellError {
    #[error("Shell '{0}' could not be parsed.")]
    Parse(String),
    #[error("The configured shell is empty.")]
    Empty,
}

/// The shell every task command is handed to, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    program: String,
    args: Vec<String>,
}

impl Shell {
    /// Resolves the shell to use, in order of preference: the configured value,
    /// `$SHELL`, then the platform fallback.
    ///
    /// A configured value may carry its own arguments (`"bash -o pipefail -c"`). When it
    /// names only a program, the platform's command flag (`-c`, or `/C` for `cmd`) is added.
    pub fn resolve(configured: Option<&str>) -> Result<Self, ShellError> {
        if let Some(line) = configured {
            return Self::parse(line);
        }
        match env::var("SHELL") {
            Ok(from_env) if !from_env.trim().is_empty() => Self::parse(&from_env),
            _ => Ok(Self::platform_default()),
        }
    }

    fn parse(line: &str) -> Result<Self, ShellError> {
        let mut parts = shlex::split(line)
            .ok_or_else(|| ShellError::Parse(line.to_string()))?
            .into_iter();
        let program = parts.next().ok_or(ShellError::Empty)?;
        let mut args: Vec<String> = parts.collect();
        if args.is_empty() {
            args.push(command_flag(&program).to_string());
        }
        Ok(Self { program, args })
    }

    fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            Self {
                program: FALLBACK_SHELL.to_string(),
                args: vec!["-c".to_string()],
            }
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments placed before the command line.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

fn command_flag(program: &str) -> &'static str {
    let name = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program)
        .to_ascii_lowercase();
    if name == "cmd" || name == "cmd.exe" {
        "/C"
    } else {
        "-c"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_program_gets_command_flag() {
        let shell = Shell::resolve(Some("/bin/bash")).unwrap();
        assert_eq!(shell.program(), "/bin/bash");
        assert_eq!(shell.args(), ["-c"]);

        let cmd = Shell::resolve(Some(r"C:\Windows\System32\cmd.exe")).unwrap();
        assert_eq!(cmd.args(), ["/C"]);
    }

    #[test]
    fn test_configured_arguments_are_kept() {
        let shell = Shell::resolve(Some("bash -o pipefail -c")).unwrap();
        assert_eq!(shell.program(), "bash");
        assert_eq!(shell.args(), ["-o", "pipefail", "-c"]);
    }

    #[test]
    fn test_invalid_configured_shell() {
        assert_eq!(Shell::resolve(Some("   ")).unwrap_err(), ShellError::Empty);
        assert!(matches!(
            Shell::resolve(Some("bash \"unterminated")),
            Err(ShellError::Parse(_))
        ));
    }
}
