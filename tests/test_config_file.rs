

use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;



use quarantine_release::{
                ConfigFile,
                Mta,
                Settings,
               };


#[test]
fn test_read_settings_success() {
  let temp_file = NamedTempFile::new().unwrap();
  let file_path = temp_file.path();
  let conts = r#"
# MailScanner-style config
MTA = exim
Sendmail = /usr/sbin/exim -oMr spam-scanned
Quarantine Dir = /var/spool/MailScanner/quarantine
Quarantine Whole Message = yes
Quarantine Whole Messages As Queue Files = no
Syslog Facility = local3
"#;

  // Write some test content to the file
  write(file_path, conts).unwrap();

  let conf = ConfigFile::load(file_path).unwrap();
  let settings = Settings::from_config(&conf).unwrap();
  let expected = Settings {
    sendmail: PathBuf::from("/usr/sbin/exim"),
    sendmail_args: vec!["-oMr".to_string(), "spam-scanned".to_string()],
    quarantine_dir: PathBuf::from("/var/spool/MailScanner/quarantine"),
    whole_message: true,
    queue_files: Some(false),
    mta: Mta::Exim,
    syslog_facility: "local3".to_string(),
    syslog_socket_type: "unix".to_string(),
  };

  assert_eq!(expected, settings, "settings do not match what was written");
}

#[test]
fn test_defaults_for_missing_keys() {
  let temp_file = NamedTempFile::new().unwrap();
  write(temp_file.path(), "Quarantine Dir = /q\n").unwrap();

  let conf = ConfigFile::load(temp_file.path()).unwrap();
  let settings = Settings::from_config(&conf).unwrap();

  assert_eq!(settings.sendmail, PathBuf::from("/usr/sbin/sendmail"));
  assert!(settings.sendmail_args.is_empty());
  assert_eq!(settings.mta, Mta::Sendmail);
  assert_eq!(settings.whole_message, false);
  assert_eq!(settings.queue_files, None);
  assert_eq!(settings.syslog_facility, "mail");
}

#[test]
fn test_lookup_ignores_case_and_spacing() {
  let temp_file = NamedTempFile::new().unwrap();
  write(temp_file.path(), "quarantine_dir = /a\nQUARANTINE DIR = /b\n").unwrap();

  let conf = ConfigFile::load(temp_file.path()).unwrap();

  // last one wins
  assert_eq!(conf.lookup("Quarantine Dir"), "/b");
  assert_eq!(conf.lookup("No Such Key"), "");
}

#[test]
fn test_bad_boolean_is_an_error() {
  let temp_file = NamedTempFile::new().unwrap();
  write(temp_file.path(), "Quarantine Whole Message = sometimes\n").unwrap();

  let conf = ConfigFile::load(temp_file.path()).unwrap();
  let result = Settings::from_config(&conf);

  assert!(result.is_err(), "Expected an error, but got: {:?}", result);
}

#[test]
fn test_unknown_mta_is_an_error() {
  let temp_file = NamedTempFile::new().unwrap();
  write(temp_file.path(), "MTA = qmail\n").unwrap();

  let conf = ConfigFile::load(temp_file.path()).unwrap();
  let result = Settings::from_config(&conf);

  assert!(result.is_err(), "Expected an error, but got: {:?}", result);
}

#[test]
fn test_include_directive_skipped() {
  let temp_file = NamedTempFile::new().unwrap();
  let conts = r#"
Quarantine Dir = /var/spool/MailScanner/quarantine
Sendmail = /usr/sbin/sendmail
include /etc/MailScanner/conf.d/*
"#;
  write(temp_file.path(), conts).unwrap();

  let conf = ConfigFile::load(temp_file.path()).unwrap();
  let settings = Settings::from_config(&conf).unwrap();

  assert_eq!(settings.quarantine_dir, PathBuf::from("/var/spool/MailScanner/quarantine"));
  assert_eq!(settings.sendmail, PathBuf::from("/usr/sbin/sendmail"));
  assert_eq!(conf.lookup("include"), "");
}

#[test]
fn test_read_config_no_such_file() {
  let invalid_path = "non_existent_file.conf";
  let result = ConfigFile::load(invalid_path);

  assert!(result.is_err(), "Expected an error, but got: {:?}", result);
}

#[test]
fn test_read_config_malformed_file() {
  let temp_file = NamedTempFile::new().unwrap();
  let file_path = temp_file.path();
  let conts = r#"
Quarantine Dir /var/spool/MailScanner/quarantine
MTA = sendmail
"#;

  write(file_path, conts).unwrap();

  let result = ConfigFile::load(file_path);

  assert!(result.is_err(), "Expected an error, but got: {:?}", result);
}
