//! Sendmail queue files: `qf<id>` holds the envelope and headers, `df<id>`
//! holds the body.
//!
//! Header lines in the `qf` file start with `H`, optionally followed by a
//! `?flags?` condition, e.g. `H?P?Return-Path: <a@b>`. Lines starting with
//! whitespace continue the previous line. Everything else is envelope data
//! and is skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

fn strip_condition(line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_prefix(b"?") {
        if let Some(end) = rest.iter().position(|b| *b == b'?') {
            return &rest[end + 1..];
        }
    }
    line
}

/// Copy the headers out of a `qf` file.
pub fn write_headers<R: BufRead, W: Write + ?Sized>(qf: &mut R, out: &mut W) -> Result<()> {
    let mut buffer = Vec::new();
    let mut in_header = false;

    loop {
        buffer.clear();
        let bytes_read = qf
            .read_until(b'\n', &mut buffer)
            .map_err(|e| anyhow!("Error reading qf file: {}", e))?;
        if bytes_read == 0 {
            break;
        }

        match buffer.first() {
            Some(b'H') => {
                in_header = true;
                out.write_all(strip_condition(&buffer[1..]))?;
            }
            Some(b' ') | Some(b'\t') => {
                if in_header {
                    out.write_all(&buffer)?;
                }
            }
            Some(b'.') if buffer.trim_ascii_end() == b"." => break,
            _ => in_header = false,
        }
    }
    Ok(())
}

pub fn write_entire_message(queue_id: &str, dir: &Path, out: &mut dyn Write) -> Result<()> {
    let qf_path = dir.join(format!("qf{}", queue_id));
    let df_path = dir.join(format!("df{}", queue_id));

    let qf = File::open(&qf_path).with_context(|| format!("Couldn't open {:?}", qf_path))?;
    write_headers(&mut BufReader::new(qf), out)?;

    // end of headers
    out.write_all(b"\n")?;

    let mut df = File::open(&df_path).with_context(|| format!("Couldn't open {:?}", df_path))?;
    std::io::copy(&mut df, out).with_context(|| format!("Couldn't copy body from {:?}", df_path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const QF: &str = "V8
T1704067200
K0
N0
P30000
MDeferred
Fbs
$_localhost [127.0.0.1]
Sa@x.com
RPFD:b@y.com
H?P?Return-Path: <a@x.com>
HReceived: from localhost
\tby mail.x.com; Mon, 1 Jan 2024 00:00:00 +0000
H??From: a@x.com
HTo: b@y.com
HSubject: hi
.
";

    #[test]
    fn test_headers_from_qf() {
        let mut out = Vec::new();
        write_headers(&mut Cursor::new(QF), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Return-Path: <a@x.com>
Received: from localhost
\tby mail.x.com; Mon, 1 Jan 2024 00:00:00 +0000
From: a@x.com
To: b@y.com
Subject: hi
"
        );
    }

    #[test]
    fn test_entire_message() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("qfABC123"), QF).unwrap();
        std::fs::write(dir.path().join("dfABC123"), "body line\n").unwrap();

        let mut out = Vec::new();
        write_entire_message("ABC123", dir.path(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Return-Path: <a@x.com>\n"));
        assert!(out.ends_with("Subject: hi\n\nbody line\n"));
    }

    #[test]
    fn test_missing_df_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("qfABC123"), QF).unwrap();

        let mut out = Vec::new();
        assert!(write_entire_message("ABC123", dir.path(), &mut out).is_err());
    }
}
