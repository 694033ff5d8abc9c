//! Logging to stderr (via simplelog) or to the local syslog daemon.

use std::io::Write;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use simplelog::WriteLogger;

pub const SYSLOG_PATH: &str = "/dev/log";

/// Where log messages go. Exactly one destination is used per run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LogDestination {
    Stderr,
    Syslog {
        facility: String,
        socket_type: String,
    },
}

/// Numeric syslog facility code for a facility name (e.g. `mail`, `local3`).
pub fn facility_code(name: &str) -> Result<u8> {
    let code = match name.trim().to_ascii_lowercase().as_str() {
        "kern" => 0,
        "user" => 1,
        "mail" => 2,
        "daemon" => 3,
        "auth" => 4,
        "syslog" => 5,
        "lpr" => 6,
        "news" => 7,
        "uucp" => 8,
        "cron" => 9,
        "authpriv" => 10,
        "ftp" => 11,
        "local0" => 16,
        "local1" => 17,
        "local2" => 18,
        "local3" => 19,
        "local4" => 20,
        "local5" => 21,
        "local6" => 22,
        "local7" => 23,
        other => bail!("unknown syslog facility '{}'", other),
    };
    Ok(code)
}

fn severity(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

enum SyslogSocket {
    Datagram(UnixDatagram),
    Stream(UnixStream),
}

impl SyslogSocket {
    fn connect(socket_type: &str) -> Result<SyslogSocket> {
        match socket_type.trim().to_ascii_lowercase().as_str() {
            "" | "unix" | "native" => {
                let sock = UnixDatagram::unbound()?;
                sock.connect(SYSLOG_PATH)
                    .map_err(|e| anyhow!("Couldn't connect to {}: {}", SYSLOG_PATH, e))?;
                Ok(SyslogSocket::Datagram(sock))
            }
            "stream" => {
                let sock = UnixStream::connect(SYSLOG_PATH)
                    .map_err(|e| anyhow!("Couldn't connect to {}: {}", SYSLOG_PATH, e))?;
                Ok(SyslogSocket::Stream(sock))
            }
            other => bail!("unsupported syslog socket type '{}'", other),
        }
    }

    fn send(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            SyslogSocket::Datagram(sock) => sock.send(line.as_bytes()).map(|_| ()),
            SyslogSocket::Stream(sock) => {
                sock.write_all(line.as_bytes())?;
                sock.write_all(b"\n")
            }
        }
    }
}

/// A `log::Log` that writes BSD-style syslog records to the local socket.
pub struct SyslogLogger {
    socket: Mutex<SyslogSocket>,
    facility: u8,
    ident: String,
    pid: u32,
    level: LevelFilter,
}

/// Format one syslog record: `<PRI>ident[pid]: message`.
pub fn format_syslog_line(facility: u8, level: Level, ident: &str, pid: u32, msg: &str) -> String {
    let pri = u16::from(facility) * 8 + u16::from(severity(level));
    format!("<{}>{}[{}]: {}", pri, ident, pid, msg)
}

impl Log for SyslogLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_syslog_line(
            self.facility,
            record.level(),
            &self.ident,
            self.pid,
            &record.args().to_string(),
        );
        if let Ok(mut socket) = self.socket.lock() {
            // nowhere left to report a failure to log
            let _ = socket.send(&line);
        }
    }

    fn flush(&self) {}
}

/// Set up the global logger.
///
/// If a logger has already been installed (only possible when running more
/// than once in one process, as the tests do), the existing one is kept.
pub fn init_logging(dest: &LogDestination, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    match dest {
        LogDestination::Stderr => {
            let _ = WriteLogger::init(level, simplelog::Config::default(), std::io::stderr());
        }
        LogDestination::Syslog {
            facility,
            socket_type,
        } => {
            let logger = SyslogLogger {
                socket: Mutex::new(SyslogSocket::connect(socket_type)?),
                facility: facility_code(facility)?,
                ident: env!("CARGO_PKG_NAME").to_string(),
                pid: std::process::id(),
                level,
            };
            if log::set_boxed_logger(Box::new(logger)).is_ok() {
                log::set_max_level(level);
            }
        }
    }
    Ok(())
}
