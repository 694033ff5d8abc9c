//! Converting MTA queue files back into a plain RFC 822 message.
//!
//! When the quarantine keeps messages "as queue files", an entry is a
//! directory holding copies of the MTA's own spool files. Each supported MTA
//! has one conversion function; which one is used is decided once, from the
//! configured MTA name.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;

pub mod exim;
pub mod postfix;
pub mod sendmail;

/// Signature shared by every queue-format converter: read the queue files
/// for `queue_id` from `dir` and write the whole message to `out`.
pub type ConvertFn = fn(queue_id: &str, dir: &Path, out: &mut dyn Write) -> Result<()>;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Mta {
    Sendmail,
    Exim,
    Postfix,
}

impl Mta {
    pub fn converter(self) -> ConvertFn {
        match self {
            Mta::Sendmail => sendmail::write_entire_message,
            Mta::Exim => exim::write_entire_message,
            Mta::Postfix => postfix::write_entire_message,
        }
    }
}

impl FromStr for Mta {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sendmail" => Ok(Mta::Sendmail),
            "exim" => Ok(Mta::Exim),
            "postfix" => Ok(Mta::Postfix),
            other => Err(format!("unsupported MTA '{}'", other)),
        }
    }
}

impl fmt::Display for Mta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mta::Sendmail => "sendmail",
            Mta::Exim => "exim",
            Mta::Postfix => "postfix",
        };
        f.write_str(name)
    }
}
