use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::normalize::StorageFormat;

/// Options given on the command line, parsed once and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub config_file: Option<PathBuf>,
    pub date: Option<String>,
    pub format_override: Option<StorageFormat>,
    pub queue_id: String,
    pub recipients: Vec<String>,
    pub rewrite_message_id: bool,
    pub sender: String,
    pub syslog: bool,
    pub temp_dir: PathBuf,
    pub verbose: bool,
}

/// A `--date` value must be an actual calendar day written as `YYYYMMDD`,
/// since it names a partition directory under the quarantine root.
fn parse_date(s: &str) -> Result<String, String> {
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{}' is not of the form YYYYMMDD", s));
    }
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map(|_| s.to_string())
        .map_err(|e| format!("'{}' is not a valid date: {}", s, e))
}

/// Queue ids are used as a single path component, so anything that could
/// walk out of a partition directory is refused.
fn parse_queue_id(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("queue id must not be empty".to_string());
    }
    if s == "." || s == ".." || s.contains('/') || s.contains('\0') {
        return Err(format!("'{}' is not a valid queue id", s));
    }
    Ok(s.to_string())
}

/// Build a CLI parser for the program.
///
/// `--queue-id` and `--sender` are mandatory. `--recipient` may be given
/// any number of times; if it is never given, the MTA is asked to work out
/// recipients from the message headers itself (`-t`).
///
/// `--usage` and `-u` are accepted as synonyms for `--help`.
pub fn build_cli() -> Command {
    command!()
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .short_alias('u')
                .alias("usage")
                .action(ArgAction::Help)
                .help("Print usage and exit"),
        )
        .arg(
            Arg::new("version")
                .short('V')
                .long("version")
                .action(ArgAction::Version)
                .help("Print version"),
        )
        .arg(
            Arg::new("config_file")
                .short('c')
                .long("config-file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file to read instead of the built-in default"),
        )
        .arg(
            Arg::new("date")
                .long("date")
                .value_name("YYYYMMDD")
                .value_parser(parse_date)
                .help("Only look in the quarantine partition for this day"),
        )
        .arg(
            Arg::new("force_plain")
                .long("force-plain")
                .action(ArgAction::SetTrue)
                .conflicts_with("force_queue")
                .help("Treat the quarantined message as a plain RFC 822 file"),
        )
        .arg(
            Arg::new("force_queue")
                .long("force-queue")
                .action(ArgAction::SetTrue)
                .help("Treat the quarantined message as MTA queue files and convert it"),
        )
        .arg(
            Arg::new("queue_id")
                .long("queue-id")
                .value_name("ID")
                .required(true)
                .value_parser(parse_queue_id)
                .help("Queue id of the quarantined message"),
        )
        .arg(
            Arg::new("recipient")
                .short('r')
                .long("recipient")
                .value_name("ADDRESS")
                .action(ArgAction::Append)
                .help("Deliver to this address instead of the message's own recipients (repeatable)"),
        )
        .arg(
            Arg::new("rewrite_message_id")
                .long("rewrite-message-id")
                .action(ArgAction::SetTrue)
                .help("Replace the Message-ID header with a freshly generated one"),
        )
        .arg(
            Arg::new("sender")
                .short('s')
                .long("sender")
                .value_name("ADDRESS")
                .required(true)
                .help("Envelope sender address"),
        )
        .arg(
            Arg::new("syslog")
                .long("syslog")
                .action(ArgAction::SetTrue)
                .help("Log to syslog instead of stderr"),
        )
        .arg(
            Arg::new("temp_directory")
                .short('t')
                .long("temp-directory")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for the converted copy of a queue-format message"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debugging messages"),
        )
}

fn options_from_matches(matches: &ArgMatches) -> Options {
    let format_override = if matches.get_flag("force_plain") {
        Some(StorageFormat::Plain)
    } else if matches.get_flag("force_queue") {
        Some(StorageFormat::Queue)
    } else {
        None
    };

    let recipients = matches
        .get_many::<String>("recipient")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let temp_dir = matches
        .get_one::<PathBuf>("temp_directory")
        .cloned()
        .unwrap_or_else(std::env::temp_dir);

    // required args are enforced by clap, so these are always present
    let queue_id = matches
        .get_one::<String>("queue_id")
        .cloned()
        .unwrap_or_default();
    let sender = matches
        .get_one::<String>("sender")
        .cloned()
        .unwrap_or_default();

    Options {
        config_file: matches.get_one::<PathBuf>("config_file").cloned(),
        date: matches.get_one::<String>("date").cloned(),
        format_override,
        queue_id,
        recipients,
        rewrite_message_id: matches.get_flag("rewrite_message_id"),
        sender,
        syslog: matches.get_flag("syslog"),
        temp_dir,
        verbose: matches.get_flag("verbose"),
    }
}

/// Parse command-line arguments (including the program name) into `Options`.
///
/// Requests for help or version text come back as a `clap::Error` too; the
/// caller prints it and exits with a failure status either way.
pub fn parse_options<I, T>(args: I) -> Result<Options, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;
    Ok(options_from_matches(&matches))
}
