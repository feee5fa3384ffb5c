#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]
#![cfg(unix)]

//! End-to-end runs against real subprocess targets
//!
//! Each target is a small `sh` script that reads the request lines from
//! stdin and answers by pattern matching, so no interpreter beyond `sh`
//! is needed.

use std::fs;
use std::time::{Duration, Instant};

use mcp_compliance::channel::ProcessChannel;
use mcp_compliance::config::{ProbeConfig, TargetConfig};
use mcp_compliance::harness::Harness;
use mcp_compliance::probes::{Category, Outcome, Probe, Verdict, find};
use mcp_compliance::report::ComplianceReport;
use tempfile::TempDir;

const RESPONDER: &str = r#"
echo "Starting crypto-trading server..."
echo "loaded 3 exchanges" >&2
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      echo "{\"jsonrpc\": \"2.0\", \"id\": $id, \"result\": {\"protocolVersion\": \"2024-11-05\", \"capabilities\": {}, \"serverInfo\": {\"name\": \"crypto-trading\", \"version\": \"1.0.0\"}}}"
      ;;
    *'"method":"tools/list"'*)
      echo "{\"jsonrpc\": \"2.0\", \"id\": $id, \"result\": {\"tools\": [{\"name\": \"get_price\", \"inputSchema\": {\"type\": \"object\"}}]}}"
      ;;
    *'"method":"notifications/'*)
      ;;
    *'"method":'*)
      echo "{\"jsonrpc\": \"2.0\", \"id\": $id, \"error\": {\"code\": -32601, \"message\": \"Method not found\"}}"
      ;;
  esac
done
"#;

struct Fixture {
    _dir: TempDir,
    target: TargetConfig,
}

fn fixture(script_body: &str) -> Fixture {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let script = dir.path().join("server.sh");
    fs::write(&script, script_body).expect("should write script");

    let target = TargetConfig {
        interpreter: "sh".to_string(),
        script,
        search_path_var: "PYTHONPATH".to_string(),
        working_dir: Some(dir.path().to_path_buf()),
    };
    Fixture { _dir: dir, target }
}

fn probes(names: &[&str]) -> Vec<Probe> {
    names
        .iter()
        .map(|name| find(name).expect("probe exists"))
        .collect()
}

async fn run(target: &TargetConfig, settings: ProbeConfig, names: &[&str]) -> ComplianceReport {
    let channel = ProcessChannel::new(target).expect("channel builds");
    let mut report = ComplianceReport::new("sh server.sh");
    Harness::new(channel, settings)
        .run(&probes(names), &mut report, |_| {})
        .await;
    report
}

fn probe_outcome<'a>(report: &'a ComplianceReport, category: Category, probe: &str) -> &'a Outcome {
    &report
        .category(category)
        .expect("category recorded")
        .probes
        .iter()
        .find(|record| record.probe == probe)
        .expect("probe recorded")
        .outcome
}

#[tokio::test]
async fn responder_passes_handshake_metadata_and_error_codes() {
    let fixture = fixture(RESPONDER);
    let report = run(
        &fixture.target,
        ProbeConfig::default(),
        &["handshake", "server-metadata", "unknown-method", "latency"],
    )
    .await;

    for category in [
        Category::CoreProtocol,
        Category::ServerMetadata,
        Category::ErrorCodes,
        Category::Performance,
    ] {
        assert_eq!(
            report.category_verdict(category),
            Some(Verdict::Pass),
            "{} should pass: {:?}",
            category,
            report.category(category)
        );
    }

    let handshake = probe_outcome(&report, Category::CoreProtocol, "handshake");
    assert_eq!(handshake.diagnostics["server_name"], "crypto-trading");

    // untouched categories are filled in, and do not affect the exit code
    assert_eq!(
        report.category_verdict(Category::Transport),
        Some(Verdict::Partial)
    );
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn multi_step_tool_listing() {
    let fixture = fixture(RESPONDER);
    let report = run(&fixture.target, ProbeConfig::default(), &["tool-schema"]).await;

    let outcome = probe_outcome(&report, Category::ToolSchema, "tool-schema");
    assert_eq!(outcome.verdict, Verdict::Pass, "{}", outcome.detail);
    assert_eq!(outcome.diagnostics["tools"], "get_price");
}

#[tokio::test]
async fn wrong_server_name_fails_metadata() {
    let fixture = fixture(RESPONDER);
    let settings = ProbeConfig {
        expected_server_name: "weather".to_string(),
        ..ProbeConfig::default()
    };
    let report = run(&fixture.target, settings, &["server-metadata"]).await;

    assert_eq!(
        report.category_verdict(Category::ServerMetadata),
        Some(Verdict::Fail)
    );
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn silent_target_is_bounded_by_timeout() {
    let fixture = fixture("exec sleep 30\n");
    let settings = ProbeConfig {
        timeout_secs: 1,
        ..ProbeConfig::default()
    };

    let started = Instant::now();
    let report = run(&fixture.target, settings, &["handshake"]).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let outcome = probe_outcome(&report, Category::CoreProtocol, "handshake");
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert!(outcome.detail.starts_with("timed out"));
}

#[tokio::test]
async fn crashing_target_fails_with_stderr() {
    let fixture = fixture("echo 'ImportError: no module named mcp' >&2\nexit 3\n");
    let report = run(&fixture.target, ProbeConfig::default(), &["handshake"]).await;

    let outcome = probe_outcome(&report, Category::CoreProtocol, "handshake");
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.detail, "no valid JSON-RPC response found");
    assert!(outcome.diagnostics["stderr"].contains("ImportError"));
    assert!(outcome.diagnostics.contains_key("exit_status"));
}

#[tokio::test]
async fn missing_interpreter_is_a_transport_failure() {
    let fixture = fixture(RESPONDER);
    let target = TargetConfig {
        interpreter: "/nonexistent/python".to_string(),
        ..fixture.target.clone()
    };
    let report = run(&target, ProbeConfig::default(), &["handshake", "latency"]).await;

    for (category, probe) in [
        (Category::CoreProtocol, "handshake"),
        (Category::Performance, "latency"),
    ] {
        let outcome = probe_outcome(&report, category, probe);
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.detail.starts_with("transport failure"));
    }
}

#[tokio::test]
async fn repeated_runs_agree() {
    let fixture = fixture(RESPONDER);
    let names = ["handshake", "unknown-method", "missing-method-field"];

    let first = run(&fixture.target, ProbeConfig::default(), &names).await;
    let second = run(&fixture.target, ProbeConfig::default(), &names).await;

    let verdicts = |report: &ComplianceReport| {
        report
            .categories()
            .map(|(category, record)| (category, record.verdict))
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));
}
