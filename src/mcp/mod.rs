//! MCP (Model Context Protocol) wire types
//!
//! JSON-RPC 2.0 envelopes and MCP handshake payloads exchanged with the
//! server under test.


pub mod protocol;

pub use protocol::{
    Implementation, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Outgoing, RequestId,
    ResponsePayload, error_codes,
};
