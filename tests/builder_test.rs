#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use reportd::builder::command::{CommandBuilder, CommandConfig};
use reportd::builder::{BuildError, BuildJob, ReportBuilder};
use reportd::template;

use common::script_builder;

fn job(format: &str, questionnaire_id: &str) -> BuildJob {
    BuildJob {
        format: format.to_string(),
        template_root: PathBuf::from("template/"),
        template: template::resolve(questionnaire_id),
        output_path: "/tmp/out/".to_string(),
    }
}

#[tokio::test]
async fn html_build_runs_build_variant() {
    let builder = script_builder(r#"echo "$@""#);

    let outcome = builder.build(&job("html", "survey:42")).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(outcome.stdout.trim(), "build template/survey-42 /tmp/out/report/");
}

#[tokio::test]
async fn pdf_build_runs_pdf_variant() {
    let builder = script_builder(r#"echo "$@""#);

    let outcome = builder.build(&job("pdf", "Q: Survey 1")).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(outcome.stdout.trim(), "pdf template/Q-Survey1 /tmp/out/report.pdf");
}

#[tokio::test]
async fn invalid_type_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let builder = script_builder(&format!("touch '{}'", marker.display()));

    for format in ["docx", "", "HTML", "pdf "] {
        let outcome = builder.build(&job(format, "survey:42")).await;
        assert!(!outcome.succeeded());
        assert!(matches!(outcome.error, Some(BuildError::InvalidReportType(_))));
        assert!(outcome.stderr.contains("Invalid Report Type"));
    }

    assert!(!marker.exists(), "builder process was spawned");
}

#[tokio::test]
async fn unsafe_template_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let builder = script_builder(&format!("touch '{}'", marker.display()));

    for id in ["", "../../etc", "q;rm -rf /", "$(id)"] {
        let outcome = builder.build(&job("html", id)).await;
        assert!(
            matches!(outcome.error, Some(BuildError::UnsafeTemplateName(_))),
            "{id:?}: {outcome:?}"
        );
    }

    assert!(!marker.exists(), "builder process was spawned");
}

#[tokio::test]
async fn non_zero_exit_captures_stderr() {
    let builder = script_builder("echo 'half done'; echo 'template missing' >&2; exit 3");

    let outcome = builder.build(&job("html", "survey:42")).await;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.error, Some(BuildError::Exit(Some(3))));
    assert_eq!(outcome.stderr, "template missing\n");
    assert_eq!(outcome.stdout, "half done\n");
}

#[tokio::test]
async fn spawn_failure_is_a_failed_outcome() {
    let builder = CommandBuilder::new(CommandConfig {
        program: "/nonexistent/reportd-builder".to_string(),
        ..CommandConfig::default()
    });

    let outcome = builder.build(&job("pdf", "survey:42")).await;

    assert!(matches!(outcome.error, Some(BuildError::Spawn(_))));
    assert!(outcome.stderr.contains("failed to spawn builder"));
}

#[tokio::test]
async fn slow_build_times_out() {
    let builder = CommandBuilder::new(CommandConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "sleep 5".to_string(), "gitbook".to_string()],
        timeout: Duration::from_millis(200),
        ..CommandConfig::default()
    });

    let started = Instant::now();
    let outcome = builder.build(&job("html", "survey:42")).await;

    assert!(outcome.timed_out(), "{outcome:?}");
    assert!(outcome.stderr.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn runs_in_configured_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(CommandConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "pwd".to_string(), "gitbook".to_string()],
        working_dir: Some(dir.path().to_path_buf()),
        ..CommandConfig::default()
    });

    let outcome = builder.build(&job("html", "survey:42")).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    let reported = PathBuf::from(outcome.stdout.trim()).canonicalize().unwrap();
    assert_eq!(reported, dir.path().canonicalize().unwrap());
}

#[tokio::test]
async fn oversized_output_is_truncated() {
    let builder = CommandBuilder::new(CommandConfig {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "printf 'x%.0s' $(seq 1 200)".to_string(),
            "gitbook".to_string(),
        ],
        max_output_bytes: 50,
        ..CommandConfig::default()
    });

    let outcome = builder.build(&job("html", "survey:42")).await;

    assert!(outcome.succeeded(), "{outcome:?}");
    assert!(outcome.stdout.contains("[truncated: showing 50/200 bytes]"));
}
