use std::ffi::{CStr, CString};

use uuid::Uuid;

/// Ask the resolver for the canonical name of `host`.
fn canonical_name(host: &str) -> Option<String> {
    let c_host = CString::new(host).ok()?;

    // SAFETY: hints is a plain C struct, for which all-zeroes is a valid
    // value; `res` is only read if getaddrinfo succeeded, and is freed
    // exactly once.
    unsafe {
        let mut hints: libc::addrinfo = std::mem::zeroed();
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_flags = libc::AI_CANONNAME;

        let mut res: *mut libc::addrinfo = std::ptr::null_mut();
        let rc = libc::getaddrinfo(c_host.as_ptr(), std::ptr::null(), &hints, &mut res);
        if rc != 0 || res.is_null() {
            return None;
        }

        let canon = (*res).ai_canonname;
        let name = if canon.is_null() {
            None
        } else {
            CStr::from_ptr(canon).to_str().ok().map(str::to_owned)
        };
        libc::freeaddrinfo(res);
        name
    }
}

/// Fully-qualified name of this host. If the configured hostname isn't
/// qualified, try the resolver; if that doesn't help either, settle for the
/// bare hostname.
pub fn local_fqdn() -> Option<String> {
    let host = nix::unistd::gethostname()
        .map_err(|e| log::warn!("Couldn't get hostname: {}", e))
        .ok()?
        .into_string()
        .map_err(|h| log::warn!("Hostname {:?} is not valid UTF-8", h))
        .ok()?;

    if host.is_empty() {
        return None;
    }
    if host.contains('.') {
        return Some(host);
    }
    match canonical_name(&host) {
        Some(canon) if canon.contains('.') => Some(canon),
        _ => {
            log::debug!("Couldn't qualify hostname {}, using it as is", host);
            Some(host)
        }
    }
}

pub fn format_message_id(unique: &Uuid, fqdn: &str) -> String {
    format!("<{}@{}>", unique.simple(), fqdn)
}

/// A fresh globally-unique message id, `<random-uuid@fqdn>`.
///
/// Returns `None` if the host name can't be found.
pub fn generate_message_id() -> Option<String> {
    let fqdn = local_fqdn()?;
    Some(format_message_id(&Uuid::new_v4(), &fqdn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message_id() {
        let unique = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            format_message_id(&unique, "mail.example.org"),
            "<67e5504410b1426f9247bb680e5fe0c8@mail.example.org>"
        );
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = format_message_id(&Uuid::new_v4(), "h");
        let b = format_message_id(&Uuid::new_v4(), "h");
        assert_ne!(a, b);
    }
}
