#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for the `all` orchestrator.
//!
//! These tests drive `engine::run` with the built-in processors over
//! isolated blueprint directories, verifying that:
//! - bootstrap, package managers, processors and cleanup run in order
//! - newly installed package managers are usable by later stages
//! - the first processor failure aborts the run and skips cleanup
//! - profiles and dry-run mode are honoured end to end

mod common;

use std::sync::Arc;

use common::{APT, BREW, Fixture, RecordingExecutor};
use rwr::engine::{self, RunOptions};
use rwr::error::StageError;
use rwr::logging::StageStatus;
use rwr::processors::ProcessorRegistry;

fn options(fixture: &Fixture) -> RunOptions {
    RunOptions {
        run_once_dir: Some(fixture.state_dir()),
        ..RunOptions::default()
    }
}

fn position(calls: &[String], needle: &str) -> usize {
    calls
        .iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("no call containing '{needle}' in {calls:#?}"))
}

fn workstation() -> Fixture {
    Fixture::new()
        .provider(APT)
        .provider(BREW)
        .init(
            "blueprints:\n  format: yaml\npackageManagers:\n  - name: brew\nvariables:\n  greeting: hi\n",
        )
        .write("bootstrap.yaml", "packages:\n  - name: curl\n")
        .write(
            "packages.yaml",
            "packages:\n  - name: python\n  - names: [ripgrep]\n    package_manager: brew\n",
        )
        .write(
            "system/services.yaml",
            "services:\n  - name: docker\n    elevated: true\n",
        )
        .write(
            "scripts.yaml",
            "scripts:\n  - name: greet\n    exec: \"echo {{ UserDefined.greeting }}\"\n",
        )
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[test]
fn full_run_applies_every_stage_in_order() {
    let fixture = workstation();
    let exec = Arc::new(
        RecordingExecutor::default()
            .with_path(&["apt-get"])
            .installing("install-brew", "brew")
            .failing("is-enabled"),
    );
    let (ctx, log) = fixture.context(&exec);

    let report = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap();
    assert!(report.bootstrapped);
    assert_eq!(report.processed.len(), 3);

    let calls = exec.calls();
    let order = [
        "apt-get install -y curl",
        "install-brew",
        "apt-get install -y python3 python3-pip",
        "/usr/bin/brew install ripgrep",
        "sudo systemctl enable docker",
        "echo hi",
        "apt-get autoremove -y",
        "/usr/bin/brew cleanup",
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&calls, n)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "unexpected order: {calls:#?}"
    );
    assert!(fixture.state_dir().join("bootstrap.done").is_file());
    assert!(
        log.stages()
            .iter()
            .all(|(_, status)| *status != StageStatus::Failed)
    );
}

#[test]
fn second_run_skips_bootstrap_and_installed_managers() {
    let fixture = workstation();
    let exec = Arc::new(
        RecordingExecutor::default()
            .with_path(&["apt-get"])
            .installing("install-brew", "brew"),
    );
    let (ctx, _) = fixture.context(&exec);
    let registry = ProcessorRegistry::builtin();
    engine::run(&ctx, &registry, &options(&fixture)).unwrap();

    let exec = Arc::new(RecordingExecutor::default().with_path(&["apt-get", "brew"]));
    let (ctx, _) = fixture.context(&exec);
    let report = engine::run(&ctx, &registry, &options(&fixture)).unwrap();
    assert!(!report.bootstrapped);
    assert!(exec.calls_matching("curl").is_empty());
    assert!(exec.calls_matching("install-brew").is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn failing_script_aborts_with_processor_and_file() {
    let fixture = Fixture::new()
        .provider(APT)
        .write("scripts.yaml", "scripts:\n  - name: broken\n    exec: \"false\"\n");
    let exec = Arc::new(
        RecordingExecutor::default()
            .with_path(&["apt-get"])
            .failing("false"),
    );
    let (ctx, log) = fixture.context(&exec);

    let err = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap_err();
    let stage = err.downcast_ref::<StageError>().unwrap();
    assert_eq!(stage.processor, "scripts");
    assert_eq!(stage.file, fixture.path().join("scripts.yaml"));
    assert!(err.to_string().contains("script 'broken' failed"));
    assert!(exec.calls_matching("autoremove").is_empty());
    assert!(
        log.stages()
            .iter()
            .any(|(_, status)| *status == StageStatus::Failed)
    );
}

#[test]
fn failing_clean_command_only_warns() {
    let fixture = workstation();
    let exec = Arc::new(
        RecordingExecutor::default()
            .with_path(&["apt-get"])
            .installing("install-brew", "brew")
            .failing("autoremove"),
    );
    let (ctx, log) = fixture.context(&exec);

    let report = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap();
    assert!(report.bootstrapped);
    assert_eq!(exec.calls_matching("autoremove").len(), 1);
    assert_eq!(exec.calls_matching("brew cleanup").len(), 1);
    assert!(
        log.at("warn")
            .iter()
            .any(|w| w.starts_with("apt clean failed"))
    );
    assert!(
        log.stages()
            .iter()
            .any(|(name, status)| name == "cleanup" && *status == StageStatus::Skipped)
    );
}

#[test]
fn missing_package_manager_is_a_stage_error() {
    let fixture = Fixture::new()
        .provider(APT)
        .write("packages.yaml", "packages:\n  - name: ripgrep\n    package_manager: brew\n");
    let exec = Arc::new(RecordingExecutor::default().with_path(&["apt-get"]));
    let (ctx, _) = fixture.context(&exec);

    let err = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap_err();
    let stage = err.downcast_ref::<StageError>().unwrap();
    assert_eq!(stage.processor, "packages");
    assert!(format!("{:#}", stage.cause).contains("brew"));
}

#[test]
fn malformed_blueprint_aborts_the_run() {
    let fixture = Fixture::new()
        .provider(APT)
        .write("packages.yaml", "packages: [unterminated\n");
    let exec = Arc::new(RecordingExecutor::default().with_path(&["apt-get"]));
    let (ctx, _) = fixture.context(&exec);

    let err = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap_err();
    assert!(err.downcast_ref::<StageError>().is_some());
}

// ---------------------------------------------------------------------------
// Profiles and dry run
// ---------------------------------------------------------------------------

#[test]
fn profiles_select_items() {
    let fixture = Fixture::new().provider(APT).write(
        "packages.yaml",
        "packages:\n  - name: vim\n  - name: docker\n    profiles: [work]\n  - name: steam\n    profiles: [gaming]\n",
    );
    let exec = Arc::new(RecordingExecutor::default().with_path(&["apt-get"]));
    let (ctx, log) = fixture.context(&exec);
    let opts = RunOptions {
        profiles: vec!["work".to_string(), "travel".to_string()],
        ..options(&fixture)
    };

    let report = engine::run(&ctx, &ProcessorRegistry::builtin(), &opts).unwrap();
    assert_eq!(
        exec.calls_matching("install -y"),
        vec!["sudo /usr/bin/apt-get install -y vim docker"]
    );
    assert_eq!(report.unmatched_profiles, vec!["travel"]);
    assert!(
        log.at("warn")
            .contains(&"profile 'travel' matches no blueprint item".to_string())
    );
}

#[test]
fn dry_run_changes_nothing() {
    // Managers are not installed in a dry run, so nothing may depend on one.
    let fixture = workstation().write("packages.yaml", "packages:\n  - name: python\n");
    let exec = Arc::new(RecordingExecutor::default().with_path(&["apt-get"]));
    let (ctx, log) = fixture.context(&exec);
    let ctx = ctx.with_dry_run(true);

    let report = engine::run(&ctx, &ProcessorRegistry::builtin(), &options(&fixture)).unwrap();
    assert!(report.bootstrapped);
    assert!(exec.calls_matching("install -y").is_empty());
    assert!(exec.calls_matching("install-brew").is_empty());
    assert!(exec.calls_matching("echo").is_empty());
    assert!(!fixture.state_dir().join("bootstrap.done").exists());
    let dry = log.at("dry_run");
    assert!(dry.contains(&"sudo /usr/bin/apt-get install -y curl".to_string()));
    assert!(dry.contains(&"echo hi".to_string()));
}
