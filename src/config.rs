use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use ini::{Ini, ParseOption};

use crate::queue::Mta;

/// A parsed `Key = value` configuration file, as used by MailScanner.
///
/// Keys are compared loosely: case is ignored, as are whitespace,
/// underscores and hyphens, so `Quarantine Dir`, `quarantinedir` and
/// `Quarantine_Dir` all name the same setting.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

/// Blank out `include <glob>` directives, which MailScanner configs use to
/// pull in `conf.d` files. None of the settings we need live there, and
/// rust-ini would reject the lines as having no separator. Line numbers are
/// kept so parse errors still point at the right place.
fn strip_include_directives(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let is_include = trimmed
                .get(..7)
                .map(|w| w.eq_ignore_ascii_case("include"))
                .unwrap_or(false)
                && trimmed[7..].starts_with(char::is_whitespace)
                && !trimmed.contains('=');
            if is_include {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a boolean config value. Returns `None` for an empty value.
fn parse_bool(key: &str, value: &str) -> Result<Option<bool>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "yes" | "true" | "on" | "1" => Ok(Some(true)),
        "no" | "false" | "off" | "0" => Ok(Some(false)),
        other => bail!("config value for '{}' is not a boolean: '{}'", key, other),
    }
}

impl ConfigFile {
    /// Read a config file from disk.
    ///
    /// Quote and escape handling are switched off, since values are paths and
    /// the like, which should be taken literally. `include` lines are
    /// skipped, not followed.
    pub fn load<P>(file_path: P) -> Result<ConfigFile>
    where
        P: AsRef<Path>,
    {
        let file_path_ref = file_path.as_ref();
        let opts = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let text = fs::read_to_string(file_path_ref).map_err(|e| {
            anyhow!(
                "Error reading config file {}: {}",
                file_path_ref.display(),
                e
            )
        })?;
        let conf = Ini::load_from_str_opt(&strip_include_directives(&text), opts).map_err(|e| {
            anyhow!(
                "Error reading config file {}: {}",
                file_path_ref.display(),
                e
            )
        })?;

        let section = conf.section(None::<String>).ok_or_else(|| {
            anyhow!(
                "Error reading config file {}: sections seem malformed",
                file_path_ref.display()
            )
        })?;

        let entries = section
            .iter()
            .map(|(k, v)| (normalize_key(k), v.trim().to_string()))
            .collect();

        Ok(ConfigFile {
            path: file_path_ref.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a setting. Missing settings give the empty string. If a key
    /// is repeated, the last occurrence wins.
    pub fn lookup(&self, key: &str) -> String {
        let wanted = normalize_key(key);
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == wanted)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

/// Settings this program needs, read once from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sendmail: PathBuf,
    /// Arguments given with `Sendmail` in the config; they go before ours.
    pub sendmail_args: Vec<String>,
    pub quarantine_dir: PathBuf,
    pub whole_message: bool,
    /// `None` when the config doesn't say; the storage format is then
    /// worked out from what is on disk.
    pub queue_files: Option<bool>,
    pub mta: Mta,
    pub syslog_facility: String,
    pub syslog_socket_type: String,
}

pub const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";

impl Settings {
    pub fn from_config(conf: &ConfigFile) -> Result<Settings> {
        let with_default = |key: &str, default: &str| {
            let value = conf.lookup(key);
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        };

        let mta_name = with_default("MTA", "sendmail");
        let mta = mta_name.parse::<Mta>().map_err(|e| {
            anyhow!("Error in config file {}: {}", conf.path().display(), e)
        })?;

        // a command, e.g. `/usr/sbin/exim -oMr spam-scanned`
        let sendmail_command = with_default("Sendmail", DEFAULT_SENDMAIL);
        let mut sendmail_words = sendmail_command.split_whitespace().map(str::to_string);
        let sendmail = PathBuf::from(sendmail_words.next().unwrap_or_default());
        let sendmail_args = sendmail_words.collect();

        let whole_message_key = "Quarantine Whole Message";
        let queue_files_key = "Quarantine Whole Messages As Queue Files";

        Ok(Settings {
            sendmail,
            sendmail_args,
            quarantine_dir: PathBuf::from(conf.lookup("Quarantine Dir")),
            whole_message: parse_bool(whole_message_key, &conf.lookup(whole_message_key))?
                .unwrap_or(false),
            queue_files: parse_bool(queue_files_key, &conf.lookup(queue_files_key))?,
            mta,
            syslog_facility: with_default("Syslog Facility", "mail"),
            syslog_socket_type: with_default("Syslog Socket Type", "unix"),
        })
    }
}

/// The MTA submission binary must exist, be a regular file and be executable
/// by somebody.
pub fn check_sendmail(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("no sendmail binary configured");
    }
    let meta = std::fs::metadata(path)
        .map_err(|e| anyhow!("sendmail binary {} is not usable: {}", path.display(), e))?;
    if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
        bail!("sendmail binary {} is not executable", path.display());
    }
    Ok(())
}

pub fn check_quarantine_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("no quarantine directory configured");
    }
    if !path.is_dir() {
        bail!("quarantine directory {} does not exist", path.display());
    }
    Ok(())
}

/// Partial quarantine entries (headers only, or just the body) can't be
/// turned back into a message, so releasing needs whole-message storage.
pub fn check_whole_message(settings: &Settings) -> Result<()> {
    if !settings.whole_message {
        bail!("quarantine is not configured to store whole messages; cannot release");
    }
    Ok(())
}
