//! Typed subcommand adapters: argument-vector builders and result
//! interpretation layered on top of [`Session::run_command`]/
//! [`Session::get_command_output`]. Flat methods on `Session`, not a
//! separate repository/client object model.

mod status;
mod xmllog;

pub use status::{StatusEntry, StatusKind};
pub use xmllog::LogEntry;

use crate::error::{throw_on_unacceptable_exit, CommandResult, Result};
use crate::session::{InputProviders, Session};

fn append_if(argv: &mut Vec<String>, cond: bool, flag: &str) {
    if cond {
        argv.push(flag.to_string());
    }
}

fn append_pair(argv: &mut Vec<String>, prefix: &str, value: &str) {
    if !value.is_empty() {
        argv.push(prefix.to_string());
        argv.push(value.to_string());
    }
}

/// Formats a timestamp as `yyyy-MM-dd HH:mm:ss`, the format `hg commit -d`
/// and friends expect.
pub fn format_date(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> String {
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}

fn no_providers<'a>() -> InputProviders<'a> {
    InputProviders::default()
}

impl Session {
    /// `hg init <path>`.
    pub fn init(&self, path: &str) -> Result<CommandResult> {
        let argv = vec!["init".to_string(), path.to_string()];
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg clone <source> [dest]`.
    pub fn clone_repo(&self, source: &str, dest: Option<&str>) -> Result<CommandResult> {
        let mut argv = vec!["clone".to_string(), source.to_string()];
        if let Some(dest) = dest {
            argv.push(dest.to_string());
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg add <paths...>`.
    pub fn add(&self, paths: &[String]) -> Result<CommandResult> {
        let mut argv = vec!["add".to_string()];
        argv.extend(paths.iter().cloned());
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg remove [-f] <paths...>`.
    pub fn remove(&self, paths: &[String], force: bool) -> Result<CommandResult> {
        let mut argv = vec!["remove".to_string()];
        append_if(&mut argv, force, "-f");
        argv.extend(paths.iter().cloned());
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg commit -m <message> [-u user] [-d date]`.
    pub fn commit(
        &self,
        message: &str,
        user: Option<&str>,
        date: Option<&str>,
    ) -> Result<CommandResult> {
        let mut argv = vec!["commit".to_string()];
        append_pair(&mut argv, "-m", message);
        if let Some(user) = user {
            append_pair(&mut argv, "-u", user);
        }
        if let Some(date) = date {
            append_pair(&mut argv, "-d", date);
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg status`, parsed into typed entries.
    pub fn status(&self) -> Result<Vec<StatusEntry>> {
        let argv = vec!["status".to_string()];
        let result = self.get_command_output(&argv, &mut no_providers())?;
        let result = throw_on_unacceptable_exit(result, &[0])?;
        Ok(status::parse(&result.stdout))
    }

    /// `hg log --style xml [-l limit]`, parsed into typed entries.
    pub fn log(&self, limit: Option<u32>) -> Result<Vec<LogEntry>> {
        let mut argv = vec!["log".to_string(), "--style".to_string(), "xml".to_string()];
        if let Some(limit) = limit {
            argv.push("-l".to_string());
            argv.push(limit.to_string());
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        let result = throw_on_unacceptable_exit(result, &[0])?;
        xmllog::parse(&result.stdout)
    }

    /// `hg diff <paths...>`.
    pub fn diff(&self, paths: &[String]) -> Result<String> {
        let mut argv = vec!["diff".to_string()];
        argv.extend(paths.iter().cloned());
        let result = self.get_command_output(&argv, &mut no_providers())?;
        let result = throw_on_unacceptable_exit(result, &[0])?;
        Ok(result.stdout)
    }

    /// `hg pull [source]`. Exit code `1` ("nothing to pull"/no-op) is not
    /// treated as a failure.
    pub fn pull(&self, source: Option<&str>) -> Result<CommandResult> {
        let mut argv = vec!["pull".to_string()];
        if let Some(source) = source {
            argv.push(source.to_string());
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0, 1]).map_err(Into::into)
    }

    /// `hg push [dest]`. Exit code `1` ("nothing to push") is not treated as
    /// a failure.
    pub fn push(&self, dest: Option<&str>) -> Result<CommandResult> {
        let mut argv = vec!["push".to_string()];
        if let Some(dest) = dest {
            argv.push(dest.to_string());
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0, 1]).map_err(Into::into)
    }

    /// `hg merge`. Exit code `1` (unresolved conflicts) is not treated as a
    /// failure; the caller is expected to inspect `status()` afterward.
    pub fn merge(&self) -> Result<CommandResult> {
        let argv = vec!["merge".to_string()];
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0, 1]).map_err(Into::into)
    }

    /// `hg update [rev]`.
    pub fn update(&self, rev: Option<&str>) -> Result<CommandResult> {
        let mut argv = vec!["update".to_string()];
        if let Some(rev) = rev {
            argv.push(rev.to_string());
        }
        let result = self.get_command_output(&argv, &mut no_providers())?;
        throw_on_unacceptable_exit(result, &[0]).map_err(Into::into)
    }

    /// `hg root`, trimmed of its trailing newline and cached for the
    /// lifetime of the session.
    pub fn root(&self) -> Result<String> {
        if let Some(root) = self.cached_root() {
            return Ok(root);
        }

        let argv = vec!["root".to_string()];
        let result = self.get_command_output(&argv, &mut no_providers())?;
        let result = throw_on_unacceptable_exit(result, &[0])?;
        let root = result.stdout.trim_end_matches('\n').to_string();
        self.cache_root(root.clone());
        Ok(root)
    }

    /// `hg identify`, trimmed of its trailing newline.
    pub fn identify(&self) -> Result<String> {
        let argv = vec!["identify".to_string()];
        let result = self.get_command_output(&argv, &mut no_providers())?;
        let result = throw_on_unacceptable_exit(result, &[0])?;
        Ok(result.stdout.trim_end_matches('\n').to_string())
    }

    /// Escape hatch for any `hg` subcommand not covered by a typed adapter
    /// above. Still goes through the same `run_command` driver.
    pub fn rawcommand(&self, argv: &[String]) -> Result<CommandResult> {
        self.get_command_output(argv, &mut no_providers())
    }
}
