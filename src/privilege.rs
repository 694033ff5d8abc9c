use anyhow::{anyhow, bail, Result};
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::unistd::Uid;

/// Whether to insist on running as root.
/// In production, we always do; in testing, we might not.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PrivilegeOption {
    SkipRootCheck,
    RequireRoot,
}

/// Fail unless the effective user is root. Reading the quarantine and
/// choosing an arbitrary envelope sender both need it.
pub fn require_root() -> Result<()> {
    let euid = Uid::effective();
    if !euid.is_root() {
        bail!("must be run as root (effective uid is {})", euid);
    }
    Ok(())
}

pub fn authorize(option: PrivilegeOption) -> Result<()> {
    match option {
        PrivilegeOption::RequireRoot => require_root(),
        PrivilegeOption::SkipRootCheck => {
            log::debug!("Not checking for root privileges");
            Ok(())
        }
    }
}

/// Blocks termination signals for as long as it is alive, restoring the
/// previous signal mask when dropped.
///
/// Held while a temporary file exists, so that an interrupt can't kill the
/// process between creating the file and removing it. Signals that arrive
/// meanwhile are delivered once the mask is restored. Child processes start
/// with an empty mask, so the MTA is unaffected.
#[derive(Debug)]
pub struct DeferTermination {
    previous: SigSet,
}

impl DeferTermination {
    pub fn new() -> Result<DeferTermination> {
        let mut set = SigSet::empty();
        for sig in [
            Signal::SIGINT,
            Signal::SIGTERM,
            Signal::SIGHUP,
            Signal::SIGQUIT,
        ] {
            set.add(sig);
        }
        let mut previous = SigSet::empty();
        nix::sys::signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))
            .map_err(|e| anyhow!("Couldn't block signals: {}", e))?;
        Ok(DeferTermination { previous })
    }
}

impl Drop for DeferTermination {
    fn drop(&mut self) {
        if let Err(e) =
            nix::sys::signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None)
        {
            log::warn!("Couldn't restore signal mask: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_root_check() {
        assert!(authorize(PrivilegeOption::SkipRootCheck).is_ok());
    }

    #[test]
    fn test_require_root_matches_euid() {
        assert_eq!(require_root().is_ok(), Uid::effective().is_root());
    }

    #[test]
    fn test_mask_restored_on_drop() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _guard = DeferTermination::new().unwrap();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(Signal::SIGTERM));
        }
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(before.contains(Signal::SIGTERM), after.contains(Signal::SIGTERM));
    }
}
