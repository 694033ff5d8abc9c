use std::env;

fn main() {
    // Check if the config path is set; if not, use MailScanner's usual location
    let config_path = env::var("QUARANTINE_RELEASE_CONFIG_PATH")
        .unwrap_or_else(|_| "/etc/MailScanner/MailScanner.conf".to_string());

    // Tell Cargo to rerun this build script if the environment variable changes
    println!("cargo:rerun-if-env-changed=QUARANTINE_RELEASE_CONFIG_PATH");

    // Pass the value to the Rust code by emitting a cargo instruction
    println!(
        "cargo:rustc-env=QUARANTINE_RELEASE_CONFIG_PATH={}",
        config_path
    );
}
