use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};

pub mod cli;
pub mod config;
pub mod deliver;
pub mod locate;
pub mod logging;
pub mod message_id;
pub mod normalize;
pub mod privilege;
pub mod queue;

pub use cli::{build_cli, parse_options, Options};
pub use config::{ConfigFile, Settings};
pub use locate::{locate, LocateError};
pub use logging::LogDestination;
pub use normalize::{DeliverySource, StorageFormat};
pub use privilege::PrivilegeOption;
pub use queue::Mta;

/// Main context for the program. Represents values injected into main() for easy testing.
///
/// Fields:
///
/// - `args`: command-line arguments
/// - `config_path`: path to the config file used when `--config-file` isn't given
/// - `privilege_check`: whether to refuse to run unless we are root
#[derive(Debug)]
pub struct MainContext {
    pub args: Vec<String>,
    pub config_path: String,
    pub privilege_check: PrivilegeOption,
}

/// Release one quarantined message, as described by `opts`.
///
/// Steps, in order: check privileges, read the config, set up logging,
/// validate addresses, find the message, convert it if it is stored as
/// queue files, and pipe it to the MTA. Any failure stops the run. A
/// temporary file made during conversion is removed before this returns,
/// whether or not the run succeeded.
pub fn run(ctx: &MainContext, opts: &Options) -> Result<()> {
    let config_path = opts
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&ctx.config_path));

    privilege::authorize(ctx.privilege_check)?;

    let conf = ConfigFile::load(&config_path)?;
    let settings = Settings::from_config(&conf)?;

    let dest = if opts.syslog {
        LogDestination::Syslog {
            facility: settings.syslog_facility.clone(),
            socket_type: settings.syslog_socket_type.clone(),
        }
    } else {
        LogDestination::Stderr
    };
    logging::init_logging(&dest, opts.verbose)?;

    log::debug!("Using config file: {:?}", config_path);
    log::debug!("Read settings: {:?}", settings);

    if !deliver::is_plausible_string(&opts.sender) {
        anyhow::bail!(
            "sender address '{}' contains non-ASCII, non-printable or whitespace characters, or is zero-length",
            opts.sender
        );
    }
    let recipients = deliver::validate_recipients(&opts.recipients)?;

    config::check_sendmail(&settings.sendmail)?;
    config::check_quarantine_dir(&settings.quarantine_dir)?;
    config::check_whole_message(&settings)?;

    let queue_id = opts.queue_id.as_str();

    let entry = locate(&settings.quarantine_dir, opts.date.as_deref(), queue_id)?;
    log::debug!("Found {} at {:?}", queue_id, entry);

    let format = normalize::detect_format(opts.format_override, settings.queue_files, &entry);

    // declared first, so dropped last: the temporary file goes before
    // termination signals are let through again
    let _defer = privilege::DeferTermination::new()?;
    let source = normalize::normalize(
        format,
        settings.mta.converter(),
        queue_id,
        &entry,
        &opts.temp_dir,
    )?;

    let mut args = settings.sendmail_args.clone();
    args.extend(deliver::mta_args(&opts.sender, &recipients));
    deliver::deliver(
        &settings.sendmail,
        &args,
        &source,
        opts.rewrite_message_id,
        message_id::generate_message_id,
    )
    .with_context(|| format!("Couldn't deliver {}", queue_id))?;

    log::info!(
        "Released {} from {:?} to {}",
        queue_id,
        entry,
        if recipients.is_empty() {
            "its original recipients".to_string()
        } else {
            recipients.join(", ")
        }
    );

    Ok(())
}

/// Main logic for the program: parse arguments, run, and turn the outcome
/// into an exit status.
///
/// Errors are logged, prefixed with the queue id. If logging couldn't be set
/// up (e.g. we aren't root, or the config file is unreadable), they go to
/// stderr instead.
/// Showing help or version text also counts as failure.
pub fn main(ctx: &MainContext) -> ExitCode {
    let opts = match parse_options(ctx.args.iter()) {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match run(ctx, &opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let msg = format!("{}: {:#}", opts.queue_id, e);
            if log::max_level() == log::LevelFilter::Off {
                eprintln!("Error: {}", msg);
            } else {
                log::error!("{}", msg);
            }
            ExitCode::FAILURE
        }
    }
}
