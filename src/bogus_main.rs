use std::process::ExitCode;

// bogus executable that doesn't insist on being run as root,
// for trying things out against a scratch quarantine and a fake MTA.

use quarantine_release::{MainContext, PrivilegeOption};

fn main() -> ExitCode {
    let cli_args: Vec<String> = std::env::args().collect();
    let config_path = env!("QUARANTINE_RELEASE_CONFIG_PATH");

    let ctx = MainContext {
        args: cli_args,
        config_path: config_path.to_string(),
        privilege_check: PrivilegeOption::SkipRootCheck,
    };

    quarantine_release::main(&ctx)
}
