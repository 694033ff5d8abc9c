use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tempfile::NamedTempFile;

use crate::queue::ConvertFn;

/// How a quarantined message is stored on disk.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum StorageFormat {
    /// A single, complete RFC 822 message file.
    Plain,
    /// A copy of the MTA's own queue files, which need converting.
    Queue,
}

/// Work out how the entry at `path` is stored.
///
/// A command-line override wins; failing that, the config setting, if
/// there is one; failing that, a plain file is taken to be a plain message
/// and a directory to be queue files.
pub fn detect_format(
    format_override: Option<StorageFormat>,
    queue_files: Option<bool>,
    path: &Path,
) -> StorageFormat {
    match (format_override, queue_files) {
        (Some(format), _) => format,
        (None, Some(true)) => StorageFormat::Queue,
        (None, Some(false)) => StorageFormat::Plain,
        (None, None) if path.is_dir() => StorageFormat::Queue,
        (None, None) => StorageFormat::Plain,
    }
}

/// The file to hand to the MTA.
///
/// A `Converted` source owns a temporary file, which is deleted when the
/// source is dropped.
#[derive(Debug)]
pub enum DeliverySource {
    Original(PathBuf),
    Converted(NamedTempFile),
}

impl DeliverySource {
    pub fn path(&self) -> &Path {
        match self {
            DeliverySource::Original(path) => path,
            DeliverySource::Converted(file) => file.path(),
        }
    }

    /// Open the message for reading. Only regular files will do.
    pub fn open(&self) -> Result<File> {
        let file = File::open(self.path())
            .map_err(|e| anyhow!("Couldn't open message file {:?}: {}", self.path(), e))?;
        let meta = file
            .metadata()
            .map_err(|e| anyhow!("Couldn't stat message file {:?}: {}", self.path(), e))?;
        if !meta.is_file() {
            bail!("message file {:?} is not a regular file", self.path());
        }
        Ok(file)
    }
}

/// Queue files for an entry live in the entry's directory. If we were given
/// a file (e.g. the format was forced), use the directory it's in.
fn queue_dir(path: &Path) -> Result<&Path> {
    if path.is_dir() {
        return Ok(path);
    }
    path.parent()
        .ok_or_else(|| anyhow!("{:?} has no containing directory", path))
}

/// Convert queue files for `queue_id` into a new temporary file in `temp_dir`.
pub fn convert_to_temp(
    convert: ConvertFn,
    queue_id: &str,
    entry: &Path,
    temp_dir: &Path,
) -> Result<NamedTempFile> {
    let dir = queue_dir(entry)?;

    // tempfile creates files with mode 0600
    let temp = tempfile::Builder::new()
        .prefix("quarantine-release.")
        .tempfile_in(temp_dir)
        .map_err(|e| anyhow!("Couldn't create temporary file in {:?}: {}", temp_dir, e))?;

    log::debug!("Converting {} from {:?} into {:?}", queue_id, dir, temp.path());

    {
        let mut writer = BufWriter::new(temp.as_file());
        convert(queue_id, dir, &mut writer)
            .with_context(|| format!("cannot convert queue file {}", queue_id))?;
        writer
            .flush()
            .with_context(|| format!("cannot convert queue file {}", queue_id))?;
    }

    temp.as_file()
        .sync_all()
        .map_err(|e| anyhow!("Couldn't sync temporary file {:?}: {}", temp.path(), e))?;

    Ok(temp)
}

/// Produce something the MTA can read: the located file itself for plain
/// messages, or a converted temporary copy for queue files.
pub fn normalize(
    format: StorageFormat,
    convert: ConvertFn,
    queue_id: &str,
    entry: &Path,
    temp_dir: &Path,
) -> Result<DeliverySource> {
    match format {
        StorageFormat::Plain => {
            let is_file = entry.metadata().map(|m| m.is_file()).unwrap_or(false);
            if !is_file {
                bail!(
                    "message {} at {:?} is not a plain message file and cannot be released as one",
                    queue_id,
                    entry
                );
            }
            log::debug!("{:?} is a plain message", entry);
            Ok(DeliverySource::Original(entry.to_path_buf()))
        }
        StorageFormat::Queue => {
            let temp = convert_to_temp(convert, queue_id, entry, temp_dir)?;
            Ok(DeliverySource::Converted(temp))
        }
    }
}
