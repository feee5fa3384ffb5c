use super::*;
use serde_json::json;

fn response(id: Option<i64>, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.map(RequestId::Number),
        result: Some(result),
        error: None,
    }
}

fn ids(values: &[i64]) -> Vec<RequestId> {
    values.iter().copied().map(RequestId::Number).collect()
}

#[test]
fn pairs_responses_by_id() {
    let expected = ids(&[1, 2]);
    let responses = vec![response(Some(1), json!("a")), response(Some(2), json!("b"))];

    let correlation = correlate(&expected, &responses);
    assert_eq!(correlation.matched_count(), 2);
    assert_eq!(
        correlation.get(&RequestId::Number(2)).and_then(|r| r.result.clone()),
        Some(json!("b"))
    );
    assert!(correlation.missing().is_empty());
    assert!(correlation.anomalies.is_empty());
}

#[test]
fn missing_ids_are_absent() {
    let expected = ids(&[1, 2, 3]);
    let responses = vec![response(Some(2), json!(null))];

    let correlation = correlate(&expected, &responses);
    assert!(correlation.get(&RequestId::Number(1)).is_none());
    assert_eq!(
        correlation.missing(),
        vec![&RequestId::Number(1), &RequestId::Number(3)]
    );
}

#[test]
fn first_duplicate_wins_and_extras_are_flagged() {
    let expected = ids(&[1]);
    let responses = vec![
        response(Some(1), json!("first")),
        response(Some(1), json!("second")),
        response(Some(1), json!("third")),
    ];

    let correlation = correlate(&expected, &responses);
    assert_eq!(
        correlation.get(&RequestId::Number(1)).and_then(|r| r.result.clone()),
        Some(json!("first"))
    );
    let duplicates = correlation
        .anomalies
        .iter()
        .filter(|a| matches!(a, Anomaly::DuplicateResponse { .. }))
        .count();
    assert_eq!(duplicates, 2);
}

#[test]
fn unknown_and_null_ids_are_unsolicited() {
    let expected = ids(&[1]);
    let responses = vec![
        response(None, json!(null)),
        response(Some(99), json!(null)),
        response(Some(1), json!("ok")),
    ];

    let correlation = correlate(&expected, &responses);
    assert_eq!(correlation.matched_count(), 1);
    assert_eq!(correlation.unsolicited.len(), 2);
    assert!(correlation.anomalies.contains(&Anomaly::Unsolicited { id: None }));
    assert!(correlation.anomalies.contains(&Anomaly::Unsolicited {
        id: Some(RequestId::Number(99))
    }));
}

#[test]
fn out_of_order_is_flagged_but_still_matched() {
    let expected = ids(&[1, 2]);
    let responses = vec![response(Some(2), json!("b")), response(Some(1), json!("a"))];

    let correlation = correlate(&expected, &responses);
    assert_eq!(correlation.matched_count(), 2);
    assert_eq!(
        correlation.anomalies,
        vec![Anomaly::OutOfOrder {
            expected: ids(&[1, 2]),
            observed: ids(&[2, 1]),
        }]
    );
}

#[test]
fn string_and_numeric_ids_do_not_collide() {
    let expected = vec![RequestId::Number(1)];
    let mut textual = response(None, json!("text"));
    textual.id = Some(RequestId::from("1"));

    let correlation = correlate(&expected, &[textual]);
    assert_eq!(correlation.matched_count(), 0);
    assert_eq!(correlation.unsolicited.len(), 1);
}

#[test]
fn anomaly_descriptions() {
    assert_eq!(
        Anomaly::DuplicateResponse {
            id: RequestId::Number(4)
        }
        .to_string(),
        "duplicate response for id 4"
    );
    assert_eq!(
        Anomaly::Unsolicited { id: None }.to_string(),
        "unsolicited response with null id"
    );
    assert_eq!(
        Anomaly::OutOfOrder {
            expected: ids(&[1, 2]),
            observed: ids(&[2, 1]),
        }
        .to_string(),
        "responses out of order (sent 1, 2, received 2, 1)"
    );
}
