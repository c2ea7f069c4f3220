//! Invalid configuration must abort loading instead of falling back.

use std::time::Duration;

use clap::error::ErrorKind;
use rstest::rstest;

use gantry_config::{Config, ConfigError, LogFormat};

fn load(args: &[&str]) -> Result<Config, ConfigError> {
    let mut argv = vec!["gantry-console"];
    argv.extend_from_slice(args);
    Config::load_from_iter(argv)
}

#[rstest]
#[case(&["--addr", "8080"])]
#[case(&["--exit-policy", "restart"])]
#[case(&["--signals", "interrupt,usr1"])]
#[case(&["--log-format", "xml"])]
#[case(&["--grace-period-ms", "-5"])]
#[case(&["--show-banner", "maybe"])]
fn rejects_invalid_values(#[case] args: &[&str]) {
    let error = load(args).expect_err("loading must fail");
    assert!(
        matches!(error, ConfigError::Arguments(_)),
        "expected an argument error, got {error:?}"
    );
}

#[test]
fn version_flag_surfaces_as_display_request() {
    let error = load(&["--version"]).expect_err("version short-circuits loading");
    match error {
        ConfigError::Arguments(inner) => assert_eq!(inner.kind(), ErrorKind::DisplayVersion),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn explicit_flags_are_applied() {
    let config = load(&[
        "--grace-period-ms",
        "250",
        "--shutdown-timeout-ms",
        "1500",
        "--log-format",
        "compact",
        "--show-banner",
        "false",
        "--show-config",
    ])
    .expect("configuration should load");
    assert_eq!(config.grace_period(), Duration::from_millis(250));
    assert_eq!(config.shutdown_timeout(), Duration::from_millis(1500));
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert!(!config.show_banner());
    assert!(config.show_config());
}
