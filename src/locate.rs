//! Finding a quarantined message on disk.
//!
//! The quarantine root holds one directory per day (`YYYYMMDD`). Inside a
//! day's directory, each quarantined message is either a plain file named
//! after its queue id, or a directory named after its queue id holding the
//! message (as a file called `message`, or as MTA queue files) plus
//! metadata we don't look at. Spam is kept one level further down, in a
//! `spam` subdirectory of the day's directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the per-day subdirectory spam is quarantined into.
pub const SPAM_DIR: &str = "spam";

/// Name of the whole-message file inside a directory-form entry.
pub const MESSAGE_FILE: &str = "message";

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no such message '{queue_id}' in quarantine")]
    NotFound { queue_id: String },

    #[error("message '{queue_id}' is ambiguous, found {} matches: {}", .matches.len(), display_paths(.matches))]
    Ambiguous {
        queue_id: String,
        matches: Vec<PathBuf>,
    },

    #[error("error reading quarantine directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, LocateError> {
    let to_err = |source| LocateError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(to_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_err)?;
    paths.sort();
    Ok(paths)
}

/// Collect every entry named `queue_id` directly in `partition`, or directly
/// in its `spam` subdirectory.
fn search_partition(
    partition: &Path,
    queue_id: &str,
    matches: &mut Vec<PathBuf>,
) -> Result<(), LocateError> {
    for path in read_dir_sorted(partition)? {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        if name == SPAM_DIR && path.is_dir() {
            for spam_path in read_dir_sorted(&path)? {
                if spam_path.file_name().and_then(|n| n.to_str()) == Some(queue_id) {
                    matches.push(spam_path);
                }
            }
        } else if name == queue_id {
            matches.push(path);
        }
    }
    Ok(())
}

/// A directory-form entry holding a whole-message file resolves to that
/// file. Anything else (a plain file, or a directory of queue files) is
/// returned as is.
fn resolve_entry(entry: PathBuf) -> PathBuf {
    if entry.is_dir() {
        let message = entry.join(MESSAGE_FILE);
        if message.is_file() {
            return message;
        }
    }
    entry
}

/// Find the quarantine entry for `queue_id` under `root`.
///
/// If `date` is given, only that day's partition is searched; otherwise
/// every subdirectory of `root` is treated as a partition and searched.
///
/// Returns the path to the entry, resolved to its `message` file where there
/// is one. It is an error for there to be no match, or more than one.
pub fn locate(root: &Path, date: Option<&str>, queue_id: &str) -> Result<PathBuf, LocateError> {
    let mut matches = Vec::new();

    match date {
        Some(date) => {
            let partition = root.join(date);
            if partition.is_dir() {
                search_partition(&partition, queue_id, &mut matches)?;
            } else {
                log::debug!("No quarantine partition {:?}", partition);
            }
        }
        None => {
            for partition in read_dir_sorted(root)? {
                if partition.is_dir() {
                    search_partition(&partition, queue_id, &mut matches)?;
                }
            }
        }
    }

    log::debug!("Matches for {}: {:?}", queue_id, matches);

    match matches.len() {
        0 => Err(LocateError::NotFound {
            queue_id: queue_id.to_string(),
        }),
        1 => Ok(resolve_entry(matches.remove(0))),
        _ => Err(LocateError::Ambiguous {
            queue_id: queue_id.to_string(),
            matches,
        }),
    }
}
