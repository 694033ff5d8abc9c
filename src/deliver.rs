use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use lazy_regex::{bytes_regex_captures, regex_is_match};

use crate::normalize::DeliverySource;

/// Check if a string is plausible as an email address, in the very loosest sense.
/// We require only that it (a) not be empty and (b) consist only of "graphical" ASCII characters
/// (basically, all letters and digits and punctuation, but not whitespace or control
/// characters).
pub fn is_plausible_string(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_graphic())
}

/// Normalize and check one recipient override: whitespace is trimmed, ASCII
/// letters are lower-cased (non-ASCII is left alone, so it can't fold into a
/// letter), and it must then look like `local@domain` with a conservative
/// character set on each side.
pub fn validate_recipient(raw: &str) -> Result<String> {
    let addr = raw.trim().to_ascii_lowercase();
    if regex_is_match!(r"^[.+\-_0-9A-Za-z]+@[.\-0-9a-z]+$", &addr) {
        Ok(addr)
    } else {
        bail!("invalid recipient address '{}'", raw)
    }
}

/// Validate every recipient, failing on the first bad one.
pub fn validate_recipients(raw: &[String]) -> Result<Vec<String>> {
    raw.iter().map(|r| validate_recipient(r)).collect()
}

/// Arguments for the sendmail-compatible MTA binary.
///
/// With no recipients, the MTA is told to take them from the message
/// headers (`-t`); otherwise they are listed explicitly.
pub fn mta_args(sender: &str, recipients: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(recipients.len() + 4);
    if recipients.is_empty() {
        args.push("-t".to_string());
    }
    args.push("-i".to_string());
    args.push("-r".to_string());
    args.push(sender.to_string());
    args.extend(recipients.iter().cloned());
    args
}

/// If `line` is a `Message-ID:` header, return it with the value replaced by
/// `new_id`, keeping the header name as written and the line ending.
fn replace_message_id(line: &[u8], new_id: &str) -> Option<Vec<u8>> {
    let (_, name) = bytes_regex_captures!(r"(?i)^(\s*message-id:)", line)?;

    let ending: &[u8] = if line.ends_with(b"\r\n") {
        b"\r\n"
    } else if line.ends_with(b"\n") {
        b"\n"
    } else {
        b""
    };

    let mut replaced = Vec::with_capacity(name.len() + new_id.len() + 3);
    replaced.extend_from_slice(name);
    replaced.push(b' ');
    replaced.extend_from_slice(new_id.as_bytes());
    replaced.extend_from_slice(ending);
    Some(replaced)
}

fn is_message_id_line(line: &[u8]) -> bool {
    bytes_regex_captures!(r"(?i)^(\s*message-id:)", line).is_some()
}

/// Copy a message line by line from `input` to `output`.
///
/// If `rewrite_message_id` is set, the first `Message-ID:` line has its
/// value replaced with one obtained from `new_id`; if that gives nothing,
/// the line is copied unchanged. Later `Message-ID:` lines are always copied
/// unchanged.
///
/// Returns whether a replacement was made.
pub fn copy_message<R, W, F>(
    input: &mut R,
    output: &mut W,
    rewrite_message_id: bool,
    mut new_id: F,
) -> Result<bool>
where
    R: BufRead,
    W: Write,
    F: FnMut() -> Option<String>,
{
    let mut buffer = Vec::new();
    let mut looking = rewrite_message_id;
    let mut rewritten = false;

    loop {
        buffer.clear();
        // read until newline or EOF
        let bytes_read = input
            .read_until(b'\n', &mut buffer)
            .map_err(|e| anyhow!("Error reading message: {}", e))?;

        if bytes_read == 0 {
            break;
        }

        if looking && is_message_id_line(&buffer) {
            looking = false;
            match new_id().and_then(|id| replace_message_id(&buffer, &id)) {
                Some(replaced) => {
                    log::debug!(
                        "Rewrote {:?} as {:?}",
                        String::from_utf8_lossy(&buffer).trim_end(),
                        String::from_utf8_lossy(&replaced).trim_end()
                    );
                    buffer = replaced;
                    rewritten = true;
                }
                None => log::warn!("Couldn't generate a new Message-ID, keeping the old one"),
            }
        }

        output
            .write_all(&buffer)
            .map_err(|e| anyhow!("Error writing to MTA: {}", e))?;
    }

    output
        .flush()
        .map_err(|e| anyhow!("Error flushing output to MTA: {}", e))?;

    Ok(rewritten)
}

/// Hand the message in `source` to the MTA.
///
/// The MTA is run as `sendmail <args>` with the message on its standard
/// input. It is an error for the MTA not to start, or to exit unsuccessfully.
pub fn deliver<F>(
    sendmail: &Path,
    args: &[String],
    source: &DeliverySource,
    rewrite_message_id: bool,
    new_id: F,
) -> Result<()>
where
    F: FnMut() -> Option<String>,
{
    let message = source.open()?;
    let mut input = BufReader::new(message);

    log::debug!("Running {:?} {:?}", sendmail, args);

    let mut child = Command::new(sendmail)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Couldn't run {:?}: {}", sendmail, e))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("Couldn't open pipe to {:?}", sendmail))?;

    // stdin is closed when the writer is dropped, at the end of the closure
    let copied = (|| -> Result<bool> {
        let mut writer = BufWriter::new(stdin);
        copy_message(&mut input, &mut writer, rewrite_message_id, new_id)
    })();

    let status = child
        .wait()
        .map_err(|e| anyhow!("Error waiting for {:?}: {}", sendmail, e))?;

    let rewritten = copied.with_context(|| format!("Couldn't send message to {:?}", sendmail))?;
    if !status.success() {
        bail!("{:?} failed: {}", sendmail, status);
    }
    if rewritten {
        log::debug!("Message-ID was replaced");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn copy(input: &str, rewrite: bool, id: Option<&str>) -> (String, bool) {
        let mut output = Vec::new();
        let rewritten = copy_message(
            &mut Cursor::new(input.as_bytes()),
            &mut output,
            rewrite,
            || id.map(str::to_string),
        )
        .unwrap();
        (String::from_utf8(output).unwrap(), rewritten)
    }

    #[test]
    fn test_recipients_normalized() {
        let raw = vec!["  Bob@Example.COM ".to_string(), "x.y+z_1-2@a-b.org".to_string()];
        assert_eq!(
            validate_recipients(&raw).unwrap(),
            vec!["bob@example.com", "x.y+z_1-2@a-b.org"]
        );
    }

    #[test]
    fn test_bad_recipient_fails_whole_list() {
        for bad in ["", "nobody", "a@", "@b.com", "a b@c.com", "a@b_c.com", "a@b@c", "<a@b.com>"] {
            let raw = vec!["ok@x.org".to_string(), bad.to_string()];
            assert!(validate_recipients(&raw).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_non_ascii_lookalikes_rejected() {
        // KELVIN SIGN lower-cases to 'k' under Unicode rules
        assert!(validate_recipient("\u{212A}@x.com").is_err());
        assert!(validate_recipient("bob@\u{212A}.com").is_err());
        assert_eq!(validate_recipient("K@X.COM").unwrap(), "k@x.com");
    }

    #[test]
    fn test_mta_args() {
        assert_eq!(mta_args("admin@host", &[]), vec!["-t", "-i", "-r", "admin@host"]);
        assert_eq!(
            mta_args("admin@host", &["c@z.com".to_string()]),
            vec!["-i", "-r", "admin@host", "c@z.com"]
        );
    }

    #[test]
    fn test_plain_copy_is_identical() {
        let input = "From: a@x.com\r\nTo: b@y.com\r\n\r\nbody\nno final newline";
        let (output, rewritten) = copy(input, false, Some("<new@h>"));
        assert_eq!(output, input);
        assert!(!rewritten);
    }

    #[test]
    fn test_first_message_id_rewritten_only() {
        let input = "From: a@x.com\nmessage-id:   <old@x.com>  \nTo: b@y.com\n\n> Message-ID: <quoted@x>\nMessage-ID: <second@x>\n";
        let (output, rewritten) = copy(input, true, Some("<new@host.example>"));
        assert!(rewritten);
        assert_eq!(
            output,
            "From: a@x.com\nmessage-id: <new@host.example>\nTo: b@y.com\n\n> Message-ID: <quoted@x>\nMessage-ID: <second@x>\n"
        );
    }

    #[test]
    fn test_crlf_preserved_on_rewrite() {
        let input = "Message-Id: <old@x>\r\nSubject: s\r\n";
        let (output, _) = copy(input, true, Some("<n@h>"));
        assert_eq!(output, "Message-Id: <n@h>\r\nSubject: s\r\n");
    }

    #[test]
    fn test_no_message_id_no_change() {
        let input = "From: a@x.com\nTo: b@y.com\n\nbody\n";
        let (output, rewritten) = copy(input, true, Some("<n@h>"));
        assert_eq!(output, input);
        assert!(!rewritten);
    }

    #[test]
    fn test_failed_generation_keeps_line() {
        let input = "Message-ID: <old@x>\nMessage-ID: <again@x>\n";
        let (output, rewritten) = copy(input, true, None);
        assert_eq!(output, input);
        assert!(!rewritten);
    }

    #[test]
    fn test_sender_plausibility() {
        assert!(is_plausible_string("admin@host"));
        assert!(!is_plausible_string(""));
        assert!(!is_plausible_string("ad min@host"));
    }
}
