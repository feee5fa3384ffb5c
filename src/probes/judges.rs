//! Verdict functions for the probe catalogue
//!
//! Every judge is pure: the same plan and observation always give the same
//! outcome.

use serde_json::Value;

use super::{MISSING_METHOD_LABEL, Observation, Outcome, Plan};
use crate::config::ProbeConfig;
use crate::mcp::protocol::methods;
use crate::mcp::{JsonRpcResponse, ResponsePayload, error_codes};

const NO_RESPONSE: &str = "no valid JSON-RPC response found";
const NEEDS_SEQUENCING: &str = "needs multi-step sequencing";

pub fn handshake(_settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    let result = match initialize_result(plan, observation) {
        Ok(result) => result,
        Err(outcome) => return outcome,
    };

    let problems = handshake_problems(result);
    if problems.is_empty() {
        let info = &result["serverInfo"];
        Outcome::pass("initialize result carries protocolVersion, capabilities and serverInfo")
            .with("protocol_version", display_value(&result["protocolVersion"]))
            .with("server_name", display_value(&info["name"]))
            .with("server_version", display_value(&info["version"]))
    } else {
        Outcome::fail(problems.join("; ")).with("response", display_value(result))
    }
}

pub fn server_metadata(settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    let result = match initialize_result(plan, observation) {
        Ok(result) => result,
        Err(outcome) => return outcome,
    };

    let mut problems = Vec::new();
    if is_missing(&result["protocolVersion"]) {
        problems.push("protocolVersion missing".to_string());
    }
    if is_missing(&result["capabilities"]) {
        problems.push("capabilities missing".to_string());
    }

    let name = result["serverInfo"]["name"].as_str();
    match name {
        Some(name) if name == settings.expected_server_name => {}
        Some(name) => problems.push(format!(
            "serverInfo.name is {:?}, expected {:?}",
            name, settings.expected_server_name
        )),
        None => problems.push("serverInfo.name missing".to_string()),
    }
    if is_missing(&result["serverInfo"]["version"]) {
        problems.push("serverInfo.version missing".to_string());
    }

    let outcome = if problems.is_empty() {
        Outcome::pass(format!(
            "server identifies as {}",
            settings.expected_server_name
        ))
    } else {
        Outcome::fail(problems.join("; "))
    };
    outcome
        .with("server_name", name.unwrap_or("<missing>"))
        .with(
            "server_version",
            display_value(&result["serverInfo"]["version"]),
        )
}

pub fn unknown_method(_settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    if observation.timed_out {
        return timed_out(observation);
    }
    let Some(response) = plan
        .expected_ids()
        .next()
        .and_then(|id| observation.correlation.get(id))
    else {
        return Outcome::fail(NO_RESPONSE);
    };

    match response.payload() {
        ResponsePayload::Error(error) if error.code == error_codes::METHOD_NOT_FOUND => {
            Outcome::pass("unknown method rejected with -32601 (method not found)")
                .with("error_code", error.code)
        }
        ResponsePayload::Error(error) => Outcome::fail(format!(
            "unknown method rejected with {} ({}), expected -32601",
            error.code,
            error_codes::describe(error.code)
        ))
        .with("error_code", error.code)
        .with("error_message", &error.message),
        ResponsePayload::Result(_) => Outcome::fail("unknown method returned a result")
            .with("response", response.snippet()),
        ResponsePayload::Malformed => malformed(response),
    }
}

pub fn invalid_params(_settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    if observation.timed_out {
        return timed_out(observation);
    }
    if let Err(outcome) = initialize_result(plan, observation) {
        return precursor_failed(outcome);
    }
    let Some(response) = plan
        .id_for(methods::TOOLS_CALL)
        .and_then(|id| observation.correlation.get(id))
    else {
        return Outcome::fail("no response to tools/call with missing name");
    };

    match response.payload() {
        ResponsePayload::Error(error) if error.code == error_codes::INVALID_PARAMS => {
            Outcome::pass("tools/call without a name rejected with -32602 (invalid params)")
                .with("error_code", error.code)
        }
        ResponsePayload::Error(error) => Outcome::partial(format!(
            "tools/call without a name rejected with {} ({}), expected -32602",
            error.code,
            error_codes::describe(error.code)
        ))
        .with("error_code", error.code)
        .with("error_message", &error.message),
        ResponsePayload::Result(_) => {
            Outcome::fail("tools/call without a name returned a result")
                .with("response", response.snippet())
        }
        ResponsePayload::Malformed => malformed(response),
    }
}

pub fn malformed_payload(
    _settings: &ProbeConfig,
    _plan: &Plan,
    observation: &Observation,
) -> Outcome {
    if let Some(reply) = &observation.http {
        let code = reply.error_code();
        let code_text = code.map_or_else(|| "<none>".to_string(), |code| code.to_string());
        let outcome = if reply.is_client_error() && code == Some(error_codes::PARSE_ERROR) {
            Outcome::pass("transport rejected invalid JSON with a client error and -32700")
        } else if !reply.is_client_error() {
            Outcome::fail(format!(
                "transport answered invalid JSON with status {}, expected 4xx",
                reply.status
            ))
        } else {
            Outcome::fail(format!(
                "transport answered invalid JSON with error code {}, expected -32700",
                code_text
            ))
        };
        return outcome
            .with("http_status", reply.status)
            .with("error_code", code_text);
    }

    if observation.timed_out {
        return timed_out(observation);
    }

    // Parse errors cannot echo an id, so look at everything that came back
    let Some(response) = all_responses(observation).next() else {
        return Outcome::partial("target stayed silent on invalid JSON over stdio");
    };

    match response.payload() {
        ResponsePayload::Error(error) if error.code == error_codes::PARSE_ERROR => {
            Outcome::pass("invalid JSON rejected with -32700 (parse error)")
                .with("error_code", error.code)
        }
        ResponsePayload::Error(error) => Outcome::fail(format!(
            "invalid JSON rejected with {} ({}), expected -32700",
            error.code,
            error_codes::describe(error.code)
        ))
        .with("error_code", error.code),
        ResponsePayload::Result(_) => {
            Outcome::fail("invalid JSON produced a result").with("response", response.snippet())
        }
        ResponsePayload::Malformed => malformed(response),
    }
}

pub fn missing_method_field(
    _settings: &ProbeConfig,
    plan: &Plan,
    observation: &Observation,
) -> Outcome {
    if let Some(reply) = &observation.http {
        let outcome = if reply.is_client_error() {
            Outcome::pass("transport rejected an envelope without a method")
        } else {
            Outcome::fail(format!(
                "transport answered an envelope without a method with status {}, expected 4xx",
                reply.status
            ))
        };
        return outcome.with("http_status", reply.status);
    }

    if observation.timed_out {
        return timed_out(observation);
    }

    let correlated = plan
        .id_for(MISSING_METHOD_LABEL)
        .and_then(|id| observation.correlation.get(id));
    // Servers that cannot trust the envelope may answer with a null id
    let Some(response) = correlated.or_else(|| all_responses(observation).next()) else {
        return Outcome::partial("target stayed silent on an envelope without a method");
    };

    match response.payload() {
        ResponsePayload::Error(error) => {
            let outcome = Outcome::pass(format!(
                "envelope without a method rejected with {} ({})",
                error.code,
                error_codes::describe(error.code)
            ))
            .with("error_code", error.code);
            if error.code == error_codes::INVALID_REQUEST {
                outcome
            } else {
                outcome.with("note", "-32600 (invalid request) is the conventional code")
            }
        }
        ResponsePayload::Result(_) => Outcome::fail("envelope without a method produced a result")
            .with("response", response.snippet()),
        ResponsePayload::Malformed => malformed(response),
    }
}

pub fn tool_schema(_settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    if observation.timed_out {
        return timed_out(observation);
    }
    if let Err(outcome) = initialize_result(plan, observation) {
        return precursor_failed(outcome);
    }
    let Some(response) = plan
        .id_for(methods::TOOLS_LIST)
        .and_then(|id| observation.correlation.get(id))
    else {
        return Outcome::fail("no response to tools/list after initialize");
    };

    let result = match response.payload() {
        ResponsePayload::Result(result) => result,
        ResponsePayload::Error(error) if error.code == error_codes::METHOD_NOT_FOUND => {
            return Outcome::partial("server does not implement tools/list")
                .with("error_code", error.code);
        }
        ResponsePayload::Error(error) => {
            return Outcome::fail(format!(
                "tools/list failed with {}: {}",
                error.code, error.message
            ))
            .with("error_code", error.code);
        }
        ResponsePayload::Malformed => return malformed(response),
    };

    let Some(tools) = result["tools"].as_array() else {
        return Outcome::fail("tools/list result has no tools array")
            .with("response", response.snippet());
    };

    let problems: Vec<String> = tools
        .iter()
        .enumerate()
        .flat_map(|(index, tool)| tool_problems(index, tool))
        .collect();

    if !problems.is_empty() {
        return Outcome::fail(problems.join("; ")).with("tool_count", tools.len());
    }

    let names = itertools::join(tools.iter().filter_map(|tool| tool["name"].as_str()), ", ");
    let detail = if tools.is_empty() {
        "server lists no tools".to_string()
    } else {
        format!("{} tools with object input schemas", tools.len())
    };
    Outcome::pass(detail)
        .with("tool_count", tools.len())
        .with("tools", names)
}

pub fn latency(settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
    let elapsed_ms = observation.elapsed.as_millis();
    if observation.timed_out {
        return timed_out(observation);
    }

    let answered = plan
        .id_for(methods::INITIALIZE)
        .and_then(|id| observation.correlation.get(id))
        .is_some();
    if !answered {
        return Outcome::fail(NO_RESPONSE).with("elapsed_ms", elapsed_ms);
    }

    let threshold = settings.latency_threshold();
    let outcome = if observation.elapsed < threshold {
        Outcome::pass(format!("initialize answered in {} ms", elapsed_ms))
    } else {
        Outcome::fail(format!(
            "initialize took {} ms, threshold is {} ms",
            elapsed_ms,
            threshold.as_millis()
        ))
    };
    outcome
        .with("elapsed_ms", elapsed_ms)
        .with("threshold_ms", threshold.as_millis())
}

/// The `initialize` result, or the failing outcome explaining why there is none
fn initialize_result<'a>(plan: &Plan, observation: &'a Observation) -> Result<&'a Value, Outcome> {
    if observation.timed_out {
        return Err(timed_out(observation));
    }

    let response = plan
        .id_for(methods::INITIALIZE)
        .and_then(|id| observation.correlation.get(id))
        .ok_or_else(|| Outcome::fail(NO_RESPONSE))?;

    match response.payload() {
        ResponsePayload::Result(result) => Ok(result),
        ResponsePayload::Error(error) => Err(Outcome::fail(format!(
            "initialize returned error {}: {}",
            error.code, error.message
        ))
        .with("error_code", error.code)),
        ResponsePayload::Malformed => Err(malformed(response)),
    }
}

fn handshake_problems(result: &Value) -> Vec<String> {
    let mut problems = Vec::new();
    if is_missing(&result["protocolVersion"]) {
        problems.push("protocolVersion missing".to_string());
    }
    if is_missing(&result["capabilities"]) {
        problems.push("capabilities missing".to_string());
    }

    let info = &result["serverInfo"];
    if !info.is_object() {
        problems.push("serverInfo missing or not an object".to_string());
        return problems;
    }
    for field in ["name", "version"] {
        match info[field].as_str() {
            Some(value) if !value.trim().is_empty() => {}
            _ => problems.push(format!("serverInfo.{} missing or empty", field)),
        }
    }
    problems
}

fn tool_problems(index: usize, tool: &Value) -> Vec<String> {
    let label = tool["name"]
        .as_str()
        .filter(|name| !name.is_empty())
        .map_or_else(|| format!("tool #{}", index), |name| format!("tool {:?}", name));

    let mut problems = Vec::new();
    if tool["name"].as_str().is_none_or(str::is_empty) {
        problems.push(format!("{} has no name", label));
    }
    match tool.get("inputSchema") {
        Some(schema) if schema.is_object() => {
            if schema["type"] != "object" {
                problems.push(format!("{} inputSchema type is not \"object\"", label));
            }
        }
        Some(_) => problems.push(format!("{} inputSchema is not an object", label)),
        None => problems.push(format!("{} has no inputSchema", label)),
    }
    problems
}

fn precursor_failed(outcome: Outcome) -> Outcome {
    Outcome::partial(format!(
        "{}: initialize step did not succeed ({})",
        NEEDS_SEQUENCING, outcome.detail
    ))
}

fn timed_out(observation: &Observation) -> Outcome {
    Outcome::fail(format!(
        "timed out after {} ms",
        observation.elapsed.as_millis()
    ))
    .with("elapsed_ms", observation.elapsed.as_millis())
}

fn malformed(response: &JsonRpcResponse) -> Outcome {
    Outcome::fail("response carries neither or both of result and error")
        .with("response", response.snippet())
}

fn all_responses(observation: &Observation) -> impl Iterator<Item = &JsonRpcResponse> {
    observation
        .correlation
        .unsolicited
        .iter()
        .chain(observation.correlation.responses())
}

fn is_missing(value: &Value) -> bool {
    value.is_null()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "<missing>".to_string(),
        other => crate::mcp::protocol::truncate(&other.to_string(), 200),
    }
}
