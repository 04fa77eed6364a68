//! Post-command interpreter (C13).
//!
//! Recognizes a narrow Windows-style shell vocabulary — `cmd.exe /C del
//! <path>` and `cmd.exe /C ren <old> <new>` — after expanding the same
//! `%VAR%` set the location resolver (C5) expands (§4.12). Anything else
//! is counted as a failure without raising; a post-command failure is
//! never fatal to the overall install (§7).

use crate::config::InstallConfig;
use crate::logger::InstallationLogger;
use crate::manifest::PostCommand;
use crate::resolver::LocationResolver;
use std::fs;
use std::path::PathBuf;

/// Outcome of running every post-command in a manifest.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PostCommandOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs every post-command against `config`'s resolved roots, logging a
/// warning for each one that fails or is unrecognized.
pub fn apply_post_commands(commands: &[PostCommand], config: &InstallConfig, logger: &InstallationLogger) -> PostCommandOutcome {
    let resolver = LocationResolver::new(config);
    let mut outcome = PostCommandOutcome::default();

    for command in commands {
        match apply_one(command, &resolver) {
            Ok(()) => outcome.succeeded += 1,
            Err(reason) => {
                logger.warning(format!("post-command failed: {} ({})", command.command, reason));
                outcome.failed += 1;
            }
        }
    }

    outcome
}

fn apply_one(command: &PostCommand, resolver: &LocationResolver) -> Result<(), String> {
    let expanded = resolver.expand_variables(&command.command);
    let expanded = if cfg!(windows) { expanded } else { expanded.replace('\\', "/") };

    let payload = extract_cmd_payload(&expanded).ok_or_else(|| "not a recognized cmd.exe /C command".to_string())?;
    let tokens = tokenize(payload);
    let Some(verb) = tokens.first() else {
        return Err("empty command payload".to_string());
    };

    match verb.to_lowercase().as_str() {
        "del" => {
            let path = tokens.get(1).ok_or("del requires a path")?;
            apply_del(path)
        }
        "ren" => {
            let old = tokens.get(1).ok_or("ren requires a source path")?;
            let new_name = tokens.get(2).ok_or("ren requires a destination name")?;
            apply_ren(old, new_name)
        }
        other => Err(format!("unrecognized command verb '{}'", other)),
    }
}

/// A command is recognized only if it contains `cmd.exe` and a `/C`
/// split; everything after the split is the payload.
fn extract_cmd_payload(command: &str) -> Option<&str> {
    if !command.contains("cmd.exe") {
        return None;
    }
    let idx = command.find("/C")?;
    Some(command[idx + 2..].trim())
}

fn tokenize(payload: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = payload.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut token = String::new();
            for c2 in chars.by_ref() {
                if c2 == '"' {
                    break;
                }
                token.push(c2);
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c2) = chars.peek() {
                if c2.is_whitespace() {
                    break;
                }
                token.push(c2);
                chars.next();
            }
            tokens.push(token);
        }
    }

    tokens
}

/// Deletes a single path; a missing file is a silent success (§4.12).
fn apply_del(path: &str) -> Result<(), String> {
    let path = PathBuf::from(path);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("del {} failed: {}", path.display(), e)),
    }
}

/// Moves `old` to a sibling path using `new_name`'s filename, overwriting
/// any existing destination.
fn apply_ren(old: &str, new_name: &str) -> Result<(), String> {
    let old_path = PathBuf::from(old);
    let file_name = PathBuf::from(new_name)
        .file_name()
        .map(|n| n.to_owned())
        .ok_or_else(|| format!("'{}' has no file name component", new_name))?;
    let new_path = old_path
        .parent()
        .map(|p| p.join(&file_name))
        .unwrap_or_else(|| PathBuf::from(&file_name));

    fs::rename(&old_path, &new_path).map_err(|e| format!("ren {} -> {} failed: {}", old_path.display(), new_path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(s: &str) -> PostCommand {
        PostCommand {
            command: s.to_string(),
            wait: true,
            hidden: true,
        }
    }

    #[test]
    fn test_extract_cmd_payload() {
        assert_eq!(extract_cmd_payload(r#"cmd.exe /C del "a.txt""#), Some(r#"del "a.txt""#));
        assert_eq!(extract_cmd_payload("notepad.exe a.txt"), None);
    }

    #[test]
    fn test_tokenize_quoted_and_bare() {
        let tokens = tokenize(r#"ren "old name.esp" new.esp"#);
        assert_eq!(tokens, vec!["ren", "old name.esp", "new.esp"]);
    }

    #[test]
    fn test_del_existing_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x")?;

        let config = InstallConfig::default();
        let logger = InstallationLogger::new();
        let commands = vec![cmd(&format!("cmd.exe /C del \"{}\"", file.display()))];
        let outcome = apply_post_commands(&commands, &config, &logger);

        assert_eq!(outcome, PostCommandOutcome { succeeded: 1, failed: 0 });
        assert!(!file.exists());
        Ok(())
    }

    #[test]
    fn test_del_missing_file_silently_succeeds() {
        let config = InstallConfig::default();
        let logger = InstallationLogger::new();
        let commands = vec![cmd("cmd.exe /C del \"/no/such/file.txt\"")];
        let outcome = apply_post_commands(&commands, &config, &logger);
        assert_eq!(outcome, PostCommandOutcome { succeeded: 1, failed: 0 });
    }

    #[test]
    fn test_ren_moves_file_to_sibling_name() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let old = dir.path().join("old.esp");
        fs::write(&old, b"data")?;

        let config = InstallConfig::default();
        let logger = InstallationLogger::new();
        let commands = vec![cmd(&format!("cmd.exe /C ren \"{}\" new.esp", old.display()))];
        let outcome = apply_post_commands(&commands, &config, &logger);

        assert_eq!(outcome, PostCommandOutcome { succeeded: 1, failed: 0 });
        assert!(dir.path().join("new.esp").exists());
        Ok(())
    }

    #[test]
    fn test_unrecognized_payload_counts_as_failure() {
        let config = InstallConfig::default();
        let logger = InstallationLogger::new();
        let commands = vec![cmd("cmd.exe /C copy a.txt b.txt")];
        let outcome = apply_post_commands(&commands, &config, &logger);
        assert_eq!(outcome, PostCommandOutcome { succeeded: 0, failed: 1 });
        assert_eq!(logger.warning_count(), 1);
    }

    #[test]
    fn test_non_cmd_exe_command_counts_as_failure() {
        let config = InstallConfig::default();
        let logger = InstallationLogger::new();
        let commands = vec![cmd("rm -rf a.txt")];
        let outcome = apply_post_commands(&commands, &config, &logger);
        assert_eq!(outcome, PostCommandOutcome { succeeded: 0, failed: 1 });
    }
}
