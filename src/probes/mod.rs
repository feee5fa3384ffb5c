//! Probe Library
//!
//! Each probe is a pure description: a builder that turns settings and
//! fresh request ids into a [`Plan`], and a judge that maps what came back
//! into an [`Outcome`]. Running them is the harness's job.


pub mod judges;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::channel::HttpReply;
use crate::config::ProbeConfig;
use crate::correlate::Correlation;
use crate::mcp::protocol::methods;
use crate::mcp::{JsonRpcRequest, Outgoing, RequestId};

/// Compliance categories, each scored independently
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    CoreProtocol,
    JsonRpcFormat,
    ServerMetadata,
    ToolSchema,
    Transport,
    ErrorCodes,
    Performance,
}

impl Category {
    pub const ALL: [Self; 7] = [
        Self::CoreProtocol,
        Self::JsonRpcFormat,
        Self::ServerMetadata,
        Self::ToolSchema,
        Self::Transport,
        Self::ErrorCodes,
        Self::Performance,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoreProtocol => "core-protocol",
            Self::JsonRpcFormat => "json-rpc-format",
            Self::ServerMetadata => "server-metadata",
            Self::ToolSchema => "tool-schema",
            Self::Transport => "transport",
            Self::ErrorCodes => "error-codes",
            Self::Performance => "performance",
        }
    }

    #[inline]
    pub fn title(self) -> &'static str {
        match self {
            Self::CoreProtocol => "Core Protocol",
            Self::JsonRpcFormat => "JSON-RPC 2.0 Format",
            Self::ServerMetadata => "Server Metadata",
            Self::ToolSchema => "Tool Schema",
            Self::Transport => "Transport",
            Self::ErrorCodes => "Error Codes",
            Self::Performance => "Performance",
        }
    }
}

impl fmt::Display for Category {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state result of a probe or category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    /// Ambiguous, or could not be tested conclusively
    Partial,
}

impl Verdict {
    /// Pass and Fail count towards the score; Partial does not
    #[inline]
    pub fn is_definitive(self) -> bool {
        !matches!(self, Self::Partial)
    }
}

impl fmt::Display for Verdict {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Partial => "PARTIAL",
        })
    }
}

/// A verdict with its explanation and supporting evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub verdict: Verdict,
    pub detail: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<String, String>,
}

impl Outcome {
    #[inline]
    pub fn new(verdict: Verdict, detail: impl Into<String>) -> Self {
        Self {
            verdict,
            detail: detail.into(),
            diagnostics: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn pass(detail: impl Into<String>) -> Self {
        Self::new(Verdict::Pass, detail)
    }

    #[inline]
    pub fn fail(detail: impl Into<String>) -> Self {
        Self::new(Verdict::Fail, detail)
    }

    #[inline]
    pub fn partial(detail: impl Into<String>) -> Self {
        Self::new(Verdict::Partial, detail)
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.diagnostics.insert(key.to_string(), value.to_string());
        self
    }
}

/// Where a probe's payload is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    Stdio,
    /// The HTTP transport wrapper when configured, stdio otherwise
    HttpWrapper,
}

/// Hands out request ids that are unique for the whole run
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: i64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    #[inline]
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next);
        self.next += 1;
        id
    }
}

/// The concrete lines one probe session sends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub payload: Vec<Outgoing>,
    expected: Vec<(RequestId, String)>,
}

impl Plan {
    /// Add a request; its id is expected to be answered
    #[inline]
    #[must_use]
    pub fn request(mut self, request: JsonRpcRequest) -> Self {
        if let Some(id) = &request.id {
            self.expected.push((id.clone(), request.method.clone()));
        }
        self.payload.push(Outgoing::Message(request));
        self
    }

    /// Add a verbatim line, optionally expecting a response under `id`
    #[inline]
    #[must_use]
    pub fn raw(mut self, line: String, label: &str, id: Option<RequestId>) -> Self {
        if let Some(id) = id {
            self.expected.push((id, label.to_string()));
        }
        self.payload.push(Outgoing::Raw(line));
        self
    }

    /// Ids expected to be answered, in send order
    #[inline]
    pub fn expected_ids(&self) -> impl Iterator<Item = &RequestId> {
        self.expected.iter().map(|(id, _)| id)
    }

    /// Id of the first expected request with this method or label
    #[inline]
    pub fn id_for(&self, method: &str) -> Option<&RequestId> {
        self.expected
            .iter()
            .find(|(_, label)| label == method)
            .map(|(id, _)| id)
    }
}

/// Everything a judge may look at
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub correlation: Correlation,
    pub elapsed: Duration,
    pub timed_out: bool,
    /// Reply from the HTTP wrapper, when the probe was delivered there
    pub http: Option<HttpReply>,
    /// Undecodable candidate lines seen on stdout
    pub noise: usize,
}

pub type Builder = fn(&ProbeConfig, &mut IdAllocator) -> crate::Result<Plan>;
pub type Judge = fn(&ProbeConfig, &Plan, &Observation) -> Outcome;

/// One self-contained conformance check
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub name: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub delivery: Delivery,
    build: Builder,
    judge: Judge,
}

impl Probe {
    #[inline]
    pub const fn new(
        name: &'static str,
        category: Category,
        description: &'static str,
        delivery: Delivery,
        build: Builder,
        judge: Judge,
    ) -> Self {
        Self {
            name,
            category,
            description,
            delivery,
            build,
            judge,
        }
    }

    #[inline]
    pub fn build(&self, settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
        (self.build)(settings, ids)
    }

    #[inline]
    pub fn judge(&self, settings: &ProbeConfig, plan: &Plan, observation: &Observation) -> Outcome {
        (self.judge)(settings, plan, observation)
    }
}

/// Method name no server is expected to implement
pub const NONEXISTENT_METHOD: &str = "nonexistent_method";

/// Body that is not JSON at all
pub const MALFORMED_PAYLOAD: &str = "invalid json";

/// The fixed probe catalogue, in execution order
#[inline]
pub fn catalogue() -> Vec<Probe> {
    vec![
        Probe::new(
            "handshake",
            Category::CoreProtocol,
            "initialize returns protocolVersion, capabilities and serverInfo",
            Delivery::Stdio,
            build_handshake,
            judges::handshake,
        ),
        Probe::new(
            "server-metadata",
            Category::ServerMetadata,
            "serverInfo identifies the expected server",
            Delivery::Stdio,
            build_handshake,
            judges::server_metadata,
        ),
        Probe::new(
            "unknown-method",
            Category::ErrorCodes,
            "unknown methods are rejected with -32601",
            Delivery::Stdio,
            build_unknown_method,
            judges::unknown_method,
        ),
        Probe::new(
            "invalid-params",
            Category::ErrorCodes,
            "tools/call without a tool name is rejected with -32602",
            Delivery::Stdio,
            build_invalid_params,
            judges::invalid_params,
        ),
        Probe::new(
            "malformed-payload",
            Category::JsonRpcFormat,
            "non-JSON input is rejected with -32700",
            Delivery::HttpWrapper,
            build_malformed_payload,
            judges::malformed_payload,
        ),
        Probe::new(
            "missing-method-field",
            Category::Transport,
            "an envelope without a method is rejected",
            Delivery::HttpWrapper,
            build_missing_method,
            judges::missing_method_field,
        ),
        Probe::new(
            "tool-schema",
            Category::ToolSchema,
            "tools/list after initialize describes every tool with an object inputSchema",
            Delivery::Stdio,
            build_tool_schema,
            judges::tool_schema,
        ),
        Probe::new(
            "latency",
            Category::Performance,
            "initialize is answered within the latency threshold",
            Delivery::Stdio,
            build_handshake,
            judges::latency,
        ),
    ]
}

/// Look up a probe by name
#[inline]
pub fn find(name: &str) -> Option<Probe> {
    catalogue().into_iter().find(|probe| probe.name == name)
}

fn initialize_request(settings: &ProbeConfig, ids: &mut IdAllocator) -> JsonRpcRequest {
    JsonRpcRequest::initialize(
        ids.next_id(),
        &settings.protocol_version,
        settings.client_info(),
    )
}

fn build_handshake(settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
    Ok(Plan::default().request(initialize_request(settings, ids)))
}

fn build_unknown_method(_settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
    Ok(Plan::default().request(JsonRpcRequest::new(
        NONEXISTENT_METHOD,
        None,
        ids.next_id(),
    )))
}

/// initialize, initialized, then the step under test
fn initialized_session(settings: &ProbeConfig, ids: &mut IdAllocator) -> Plan {
    Plan::default()
        .request(initialize_request(settings, ids))
        .request(JsonRpcRequest::notification(methods::INITIALIZED, None))
}

fn build_invalid_params(settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
    let session = initialized_session(settings, ids);
    let call = JsonRpcRequest::new(
        methods::TOOLS_CALL,
        Some(json!({ "arguments": {} })),
        ids.next_id(),
    );
    Ok(session.request(call))
}

fn build_tool_schema(settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
    let session = initialized_session(settings, ids);
    let list = JsonRpcRequest::new(methods::TOOLS_LIST, Some(json!({})), ids.next_id());
    Ok(session.request(list))
}

fn build_malformed_payload(_settings: &ProbeConfig, _ids: &mut IdAllocator) -> crate::Result<Plan> {
    Ok(Plan::default().raw(MALFORMED_PAYLOAD.to_string(), "malformed", None))
}

/// Label used for the method-less envelope in a [`Plan`]
pub const MISSING_METHOD_LABEL: &str = "missing-method";

fn build_missing_method(_settings: &ProbeConfig, ids: &mut IdAllocator) -> crate::Result<Plan> {
    let id = ids.next_id();
    let envelope = serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "params": {},
        "id": id,
    }))?;
    Ok(Plan::default().raw(envelope, MISSING_METHOD_LABEL, Some(id)))
}
