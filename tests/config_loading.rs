// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use taskexec::config::{
    ConfigFile, EngineSettings, MAX_KILL_TIMEOUT, load_and_validate, load_from_path, parse_duration,
};
use taskexec::matcher::{InMemoryMatcherRegistry, ProblemMatcherRegistry, Severity};

type TestResult = Result<(), Box<dyn Error>>;

fn demo_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/taskexec.toml")
}

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn demo_config_loads_and_validates() -> TestResult {
    let cfg = load_and_validate(demo_config_path())?;

    let settings = cfg.engine.settings()?;
    assert_eq!(settings.shell, "sh");
    assert_eq!(settings.kill_timeout, Duration::from_secs(3));
    assert_eq!(settings.event_capacity, 128);
    assert_eq!(cfg.variables.get("buildDir").map(String::as_str), Some("target"));

    let registry = InMemoryMatcherRegistry::from_config(&cfg.matchers);
    let tsc = registry.get("tsc").ok_or("tsc matcher missing")?;
    assert_eq!(tsc.name.as_deref(), Some("tsc"));
    assert_eq!(tsc.owner, "typescript");
    assert_eq!(tsc.file_prefix.as_deref(), Some("${workspaceFolder}"));
    assert_eq!(tsc.pattern.severity, Some(4));

    let rustc = registry.get("rustc").ok_or("rustc matcher missing")?;
    assert_eq!(rustc.severity, Severity::Warning);
    Ok(())
}

#[test]
fn empty_file_gives_defaults() -> TestResult {
    let file = write_config("")?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.engine.settings()?, EngineSettings::default());
    assert!(cfg.variables.is_empty());
    assert!(cfg.matchers.is_empty());
    Ok(())
}

#[test]
fn default_config_matches_default_settings() -> TestResult {
    let settings = ConfigFile::default().engine.settings()?;

    assert_eq!(settings.kill_timeout, Duration::from_secs(5));
    assert_eq!(settings.event_capacity, 256);
    Ok(())
}

#[test]
fn invalid_kill_timeout_is_rejected() -> TestResult {
    let file = write_config("[engine]\nkill_timeout = \"soon\"\n")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(format!("{err:#}").contains("kill_timeout"));
    Ok(())
}

#[test]
fn zero_kill_timeout_is_rejected() -> TestResult {
    let file = write_config("[engine]\nkill_timeout = \"0s\"\n")?;

    assert!(load_and_validate(file.path()).is_err());
    Ok(())
}

#[test]
fn zero_event_capacity_is_rejected() -> TestResult {
    let file = write_config("[engine]\nevent_capacity = 0\n")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(err.to_string().contains("event_capacity"));
    Ok(())
}

#[test]
fn empty_shell_is_rejected() -> TestResult {
    let file = write_config("[engine]\nshell = \"  \"\n")?;

    assert!(load_and_validate(file.path()).is_err());
    Ok(())
}

#[test]
fn matcher_with_bad_regex_is_rejected() -> TestResult {
    let file = write_config(
        r#"
[matchers.broken]
owner = "x"
pattern = { regexp = "(unclosed" }
"#,
    )?;

    // Parses fine, fails validation.
    assert!(load_from_path(file.path()).is_ok());
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("broken"));
    Ok(())
}

#[test]
fn matcher_group_out_of_range_is_rejected() -> TestResult {
    let file = write_config(
        r#"
[matchers.short]
owner = "x"
pattern = { regexp = '^(\S+): (.*)$', line = 3 }
"#,
    )?;

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("capture group 3"));
    Ok(())
}

#[test]
fn malformed_toml_reports_the_path() -> TestResult {
    let file = write_config("[engine\nshell = 1")?;

    let err = load_from_path(file.path()).unwrap_err();

    assert!(err.to_string().contains("parsing TOML config"));
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_from_path("/definitely/not/here/Taskexec.toml").is_err());
}

#[test]
fn durations_parse_with_units() -> TestResult {
    assert_eq!(parse_duration("250ms")?, Duration::from_millis(250));
    assert_eq!(parse_duration("3s")?, Duration::from_secs(3));
    assert_eq!(parse_duration(" 2m ")?, Duration::from_secs(120));
    assert_eq!(parse_duration("1h")?, Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    Ok(())
}

#[test]
fn oversized_durations_are_errors_not_panics() {
    assert!(parse_duration("5124095576030432h").is_err());
    assert!(parse_duration("307445734561825861m").is_err());
    assert!(parse_duration("99999999999999999999s").is_err());
}

#[test]
fn huge_kill_timeout_is_rejected() -> TestResult {
    let file = write_config("[engine]\nkill_timeout = \"18446744073709551615s\"\n")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(err.to_string().contains("kill_timeout"));
    Ok(())
}

#[test]
fn kill_timeout_of_one_day_is_accepted() -> TestResult {
    let file = write_config("[engine]\nkill_timeout = \"24h\"\n")?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.engine.settings()?.kill_timeout, MAX_KILL_TIMEOUT);
    Ok(())
}
