//! Postfix queue files: a single file named after the queue id, made of
//! records. Each record is a type byte, a length (7 bits per byte, least
//! significant group first, high bit set on all but the last byte), then
//! that many bytes of data.
//!
//! Message content lies between the `M` (start of message) and `X` (start
//! of extracted information) records. Inside it, `N` records are complete
//! lines and `L` records are pieces of a line that continues in the next
//! record.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

const REC_TYPE_MESG: u8 = b'M';
const REC_TYPE_XTRA: u8 = b'X';
const REC_TYPE_END: u8 = b'E';
const REC_TYPE_NORM: u8 = b'N';
const REC_TYPE_CONT: u8 = b'L';

#[derive(Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub rec_type: u8,
    pub data: &'a [u8],
}

/// Read one record starting at `*pos`, advancing `*pos` past it.
/// Returns `None` at end of input.
pub fn next_record<'a>(buf: &'a [u8], pos: &mut usize) -> Result<Option<Record<'a>>> {
    let rec_type = match buf.get(*pos) {
        Some(t) => *t,
        None => return Ok(None),
    };
    *pos += 1;

    let mut len: usize = 0;
    let mut shift = 0;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| anyhow!("truncated record length at offset {}", *pos))?;
        *pos += 1;
        if shift > 28 {
            bail!("record length too large at offset {}", *pos);
        }
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let start = *pos;
    let data = start
        .checked_add(len)
        .and_then(|end| buf.get(start..end))
        .ok_or_else(|| anyhow!("record at offset {} overruns end of file", *pos))?;
    *pos += len;

    Ok(Some(Record { rec_type, data }))
}

/// Write the message content held in a postfix queue file.
pub fn write_content<W: Write + ?Sized>(queue_file: &[u8], out: &mut W) -> Result<()> {
    let mut pos = 0;
    let mut in_message = false;

    while let Some(record) = next_record(queue_file, &mut pos)? {
        if !in_message {
            in_message = record.rec_type == REC_TYPE_MESG;
            continue;
        }
        match record.rec_type {
            REC_TYPE_NORM => {
                out.write_all(record.data)?;
                out.write_all(b"\n")?;
            }
            REC_TYPE_CONT => out.write_all(record.data)?,
            REC_TYPE_XTRA | REC_TYPE_END => return Ok(()),
            // pointer and padding records carry no content
            _ => {}
        }
    }

    if in_message {
        bail!("queue file ends inside message content");
    }
    bail!("queue file has no message content");
}

pub fn write_entire_message(queue_id: &str, dir: &Path, out: &mut dyn Write) -> Result<()> {
    let path = dir.join(queue_id);
    let queue_file = fs::read(&path).with_context(|| format!("Couldn't read {:?}", path))?;
    write_content(&queue_file, out).with_context(|| format!("Couldn't parse {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rec_type: u8, data: &[u8]) -> Vec<u8> {
        let mut rec = vec![rec_type];
        let mut len = data.len();
        loop {
            let mut byte = (len & 0x7f) as u8;
            len >>= 7;
            if len != 0 {
                byte |= 0x80;
            }
            rec.push(byte);
            if len == 0 {
                break;
            }
        }
        rec.extend_from_slice(data);
        rec
    }

    fn queue_file() -> Vec<u8> {
        let long_line = "x".repeat(200);
        [
            record(b'C', b"   123   45  0  1  0"),
            record(b'S', b"a@x.com"),
            record(b'R', b"b@y.com"),
            record(b'M', b""),
            record(b'N', b"From: a@x.com"),
            record(b'N', b"To: b@y.com"),
            record(b'N', b""),
            record(b'L', b"split "),
            record(b'N', b"line"),
            record(b'N', long_line.as_bytes()),
            record(b'X', b""),
            record(b'O', b"b@y.com"),
            record(b'E', b""),
        ]
        .concat()
    }

    #[test]
    fn test_multi_byte_length() {
        let data = vec![b'y'; 300];
        let buf = record(b'N', &data);
        let mut pos = 0;
        let rec = next_record(&buf, &mut pos).unwrap().unwrap();
        assert_eq!(rec.data.len(), 300);
        assert_eq!(pos, buf.len());
        assert_eq!(next_record(&buf, &mut pos).unwrap(), None);
    }

    #[test]
    fn test_huge_length_is_an_error() {
        // 0xffffffff announced, a handful of bytes present
        let buf = [b'N', 0xff, 0xff, 0xff, 0xff, 0x0f, b'x', b'y'];
        let mut pos = 0;
        assert!(next_record(&buf, &mut pos).is_err());

        let buf = [b'N', 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut pos = 0;
        assert!(next_record(&buf, &mut pos).is_err());
    }

    #[test]
    fn test_content() {
        let mut out = Vec::new();
        write_content(&queue_file(), &mut out).unwrap();
        let expected = format!(
            "From: a@x.com\nTo: b@y.com\n\nsplit line\n{}\n",
            "x".repeat(200)
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_truncated_file() {
        let mut buf = queue_file();
        buf.truncate(buf.len() - 20);
        let mut out = Vec::new();
        assert!(write_content(&buf, &mut out).is_err());
    }

    #[test]
    fn test_no_message_records() {
        let buf = record(b'S', b"a@x.com");
        let mut out = Vec::new();
        assert!(write_content(&buf, &mut out).is_err());
    }
}
