//! Exim spool files: `<id>-H` and `<id>-D`.
//!
//! The `-H` file starts with envelope information, ended by a blank line.
//! After that, each header is stored as `NNNc text`, where `NNN` is the
//! length of `text` in bytes (including its trailing newline, and any
//! continuation lines), and `c` is a flag character. A `*` flag marks a
//! header exim has deleted; those are not part of the message.
//!
//! The `-D` file's first line is its own name, the rest is the body.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

const DELETED_FLAG: u8 = b'*';

fn find_header_start(spool: &[u8]) -> Option<usize> {
    spool.windows(2).position(|w| w == b"\n\n").map(|i| i + 2)
}

/// Copy the live headers out of the contents of a `-H` file.
pub fn write_headers<W: Write + ?Sized>(spool: &[u8], out: &mut W) -> Result<()> {
    let mut pos = find_header_start(spool)
        .ok_or_else(|| anyhow!("no end of envelope section in -H file"))?;

    while pos < spool.len() {
        let digits = spool[pos..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 {
            bail!("malformed header record at offset {} in -H file", pos);
        }
        // only ASCII digits, so this can't fail to be UTF-8
        let len: usize = std::str::from_utf8(&spool[pos..pos + digits])?.parse()?;
        pos += digits;

        // flag character, then a single space
        let flag = *spool
            .get(pos)
            .ok_or_else(|| anyhow!("truncated header record in -H file"))?;
        if spool.get(pos + 1) != Some(&b' ') {
            bail!("malformed header record at offset {} in -H file", pos);
        }
        pos += 2;

        let text = pos
            .checked_add(len)
            .and_then(|end| spool.get(pos..end))
            .ok_or_else(|| anyhow!("header record overruns end of -H file"))?;
        if flag != DELETED_FLAG {
            out.write_all(text)?;
        }
        pos += len;
    }
    Ok(())
}

/// Strip the identification line from the contents of a `-D` file.
pub fn body(data: &[u8]) -> &[u8] {
    match data.iter().position(|b| *b == b'\n') {
        Some(i) => &data[i + 1..],
        None => &[],
    }
}

pub fn write_entire_message(queue_id: &str, dir: &Path, out: &mut dyn Write) -> Result<()> {
    let h_path = dir.join(format!("{}-H", queue_id));
    let d_path = dir.join(format!("{}-D", queue_id));

    let spool = fs::read(&h_path).with_context(|| format!("Couldn't read {:?}", h_path))?;
    write_headers(&spool, out).with_context(|| format!("Couldn't parse {:?}", h_path))?;

    out.write_all(b"\n")?;

    let data = fs::read(&d_path).with_context(|| format!("Couldn't read {:?}", d_path))?;
    out.write_all(body(&data))?;
    Ok(())
}
