use super::*;

fn outcome(verdict: Verdict) -> Outcome {
    Outcome::new(verdict, format!("{} detail", verdict))
}

#[test]
fn category_verdict_folds_probe_verdicts() {
    let mut report = ComplianceReport::new("sh target.sh");

    report.record("unknown-method", Category::ErrorCodes, outcome(Verdict::Pass));
    assert_eq!(
        report.category_verdict(Category::ErrorCodes),
        Some(Verdict::Pass)
    );

    report.record("invalid-params", Category::ErrorCodes, outcome(Verdict::Partial));
    assert_eq!(
        report.category_verdict(Category::ErrorCodes),
        Some(Verdict::Partial)
    );

    report.record("extra", Category::ErrorCodes, outcome(Verdict::Fail));
    report.record("another", Category::ErrorCodes, outcome(Verdict::Pass));
    assert_eq!(
        report.category_verdict(Category::ErrorCodes),
        Some(Verdict::Fail)
    );
    assert_eq!(
        report
            .category(Category::ErrorCodes)
            .expect("recorded")
            .probes
            .len(),
        4
    );
}

#[test]
fn finalize_fills_every_category() {
    let mut report = ComplianceReport::new("sh target.sh");
    report.record("handshake", Category::CoreProtocol, outcome(Verdict::Pass));
    assert!(!report.is_finalized());

    report.finalize();

    assert!(report.is_finalized());
    assert_eq!(report.categories().count(), Category::ALL.len());
    let untested = report.category(Category::Performance).expect("filled in");
    assert_eq!(untested.verdict, Verdict::Partial);
    assert_eq!(untested.note.as_deref(), Some(NEEDS_TESTING));
    assert!(untested.probes.is_empty());
    assert_eq!(
        report.category_verdict(Category::CoreProtocol),
        Some(Verdict::Pass)
    );
}

#[test]
fn finalize_twice_keeps_records() {
    let mut report = ComplianceReport::new("sh target.sh");
    report.record("latency", Category::Performance, outcome(Verdict::Fail));
    report.finalize();
    report.finalize();

    assert_eq!(
        report.category_verdict(Category::Performance),
        Some(Verdict::Fail)
    );
}

#[test]
fn score_counts_only_definitive_categories() {
    let mut report = ComplianceReport::new("sh target.sh");
    report.record("handshake", Category::CoreProtocol, outcome(Verdict::Pass));
    report.record("server-metadata", Category::ServerMetadata, outcome(Verdict::Pass));
    report.record("latency", Category::Performance, outcome(Verdict::Fail));
    report.record("tool-schema", Category::ToolSchema, outcome(Verdict::Partial));
    report.finalize();

    let score = report.score();
    assert_eq!(score, Score { passed: 2, scored: 3 });
    assert_eq!(score.percent(), Some(66));
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn exit_code_ignores_partial_categories() {
    let mut report = ComplianceReport::new("sh target.sh");
    report.record("handshake", Category::CoreProtocol, outcome(Verdict::Pass));
    report.record("tool-schema", Category::ToolSchema, outcome(Verdict::Partial));
    report.finalize();

    assert_eq!(report.exit_code(), 0);
}

#[test]
fn empty_report_has_no_ratio() {
    let mut report = ComplianceReport::new("sh target.sh");
    report.finalize();

    let score = report.score();
    assert_eq!(score.scored, 0);
    assert_eq!(score.ratio(), None);
    assert_eq!(score.percent(), None);
}

#[test]
fn recording_is_deterministic() {
    let build = || {
        let mut report = ComplianceReport::new("sh target.sh");
        report.record("handshake", Category::CoreProtocol, outcome(Verdict::Pass));
        report.record("latency", Category::Performance, outcome(Verdict::Fail));
        report.finalize();
        report
    };
    let first = build();
    let second = build();

    let verdicts = |report: &ComplianceReport| {
        report
            .categories()
            .map(|(category, record)| (category, record.verdict))
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));
    assert_eq!(first.score(), second.score());
}

mod render_tests {
    use super::*;

    fn sample() -> ComplianceReport {
        let mut report = ComplianceReport::new("python3 server.py");
        report.record(
            "handshake",
            Category::CoreProtocol,
            Outcome::pass("initialize ok").with("server_name", "crypto-trading"),
        );
        report.record(
            "unknown-method",
            Category::ErrorCodes,
            Outcome::fail("wrong code").with("error_code", -32600),
        );
        report.finalize();
        report
    }

    #[test]
    fn text_lists_categories_probes_and_score() {
        let text = console::strip_ansi_codes(&render_text(&sample())).into_owned();

        assert!(text.contains("Target: python3 server.py"));
        assert!(text.contains("PASS Core Protocol [core-protocol]"));
        assert!(text.contains("FAIL Error Codes [error-codes]"));
        assert!(text.contains("PARTIAL Performance [performance]"));
        assert!(text.contains(NEEDS_TESTING));
        assert!(text.contains("handshake"));
        assert!(text.contains("server_name: crypto-trading"));
        assert!(text.contains("error_code: -32600"));
        assert!(text.contains("Score: 1/2 categories passed (50%)"));
    }

    #[test]
    fn text_layout_frames_header_and_score() {
        let text = console::strip_ansi_codes(&render_text(&sample())).into_owned();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.first(), Some(&"MCP Compliance Report"));
        assert!(lines[2].starts_with("Run:    "));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "PASS Core Protocol [core-protocol]");
        assert_eq!(lines[lines.len() - 2], "");
        assert_eq!(lines.last(), Some(&"Score: 1/2 categories passed (50%)"));
        assert!(text.ends_with("(50%)\n"));
    }

    #[test]
    fn text_without_scored_categories() {
        let mut report = ComplianceReport::new("python3 server.py");
        report.finalize();

        let text = console::strip_ansi_codes(&render_text(&report)).into_owned();
        assert!(text.contains("no category reached a definitive verdict"));
    }

    #[test]
    fn json_carries_metadata_and_verdicts() {
        let report = sample();
        let json = render_json(&report).expect("report serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        assert_eq!(value["run_id"], report.run_id.to_string());
        assert!(value["started_at"].is_string());
        assert!(value["finished_at"].is_string());
        assert_eq!(value["target"], "python3 server.py");
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["score"]["passed"], 1);
        assert_eq!(value["score"]["scored"], 2);
        assert_eq!(value["score_ratio"], 0.5);

        let core = &value["categories"]["core-protocol"];
        assert_eq!(core["verdict"], "PASS");
        assert_eq!(core["probes"][0]["probe"], "handshake");
        assert_eq!(core["probes"][0]["detail"], "initialize ok");
        assert_eq!(
            core["probes"][0]["diagnostics"]["server_name"],
            "crypto-trading"
        );

        let untested = &value["categories"]["transport"];
        assert_eq!(untested["verdict"], "PARTIAL");
        assert_eq!(untested["note"], NEEDS_TESTING);
    }
}
