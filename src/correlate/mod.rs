//! Correlator
//!
//! Pairs each expected request id with the first response carrying it and
//! records every anomaly instead of dropping it silently.

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::mcp::{JsonRpcResponse, RequestId};

/// Irregularities noticed while pairing responses with requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Anomaly {
    /// A second (or later) response for an id that was already answered
    DuplicateResponse { id: RequestId },
    /// A response whose id matches no request of this session
    Unsolicited { id: Option<RequestId> },
    /// Responses arrived in a different order than requests were sent
    OutOfOrder {
        expected: Vec<RequestId>,
        observed: Vec<RequestId>,
    },
}

impl fmt::Display for Anomaly {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateResponse { id } => write!(f, "duplicate response for id {}", id),
            Self::Unsolicited { id: Some(id) } => {
                write!(f, "unsolicited response with id {}", id)
            }
            Self::Unsolicited { id: None } => write!(f, "unsolicited response with null id"),
            Self::OutOfOrder { expected, observed } => write!(
                f,
                "responses out of order (sent {}, received {})",
                join_ids(expected),
                join_ids(observed)
            ),
        }
    }
}

fn join_ids(ids: &[RequestId]) -> String {
    itertools::join(ids, ", ")
}

/// Responses paired with the ids they answer
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    /// Expected ids in send order
    order: Vec<RequestId>,
    matched: HashMap<RequestId, JsonRpcResponse>,
    /// Responses not attributed to any request, in stream order
    pub unsolicited: Vec<JsonRpcResponse>,
    pub anomalies: Vec<Anomaly>,
}

impl Correlation {
    /// The response for `id`, if one arrived
    #[inline]
    pub fn get(&self, id: &RequestId) -> Option<&JsonRpcResponse> {
        self.matched.get(id)
    }

    /// Expected ids that received no response
    #[inline]
    pub fn missing(&self) -> Vec<&RequestId> {
        self.order
            .iter()
            .filter(|id| !self.matched.contains_key(*id))
            .collect()
    }

    /// Matched responses in request send order
    #[inline]
    pub fn responses(&self) -> impl Iterator<Item = &JsonRpcResponse> {
        self.order.iter().filter_map(|id| self.matched.get(id))
    }

    #[inline]
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }
}

/// Attribute `responses` (in stream order) to `expected` ids (in send order)
///
/// The first response for an id wins. A response is attributed to at most
/// one request.
#[inline]
pub fn correlate<'a, I>(expected: I, responses: &[JsonRpcResponse]) -> Correlation
where
    I: IntoIterator<Item = &'a RequestId>,
{
    let order: Vec<RequestId> = expected.into_iter().cloned().collect();
    let mut correlation = Correlation {
        order,
        ..Correlation::default()
    };
    let mut arrival = Vec::new();

    for response in responses {
        let Some(id) = response.id.as_ref().filter(|id| correlation.order.contains(*id)) else {
            correlation.anomalies.push(Anomaly::Unsolicited {
                id: response.id.clone(),
            });
            correlation.unsolicited.push(response.clone());
            continue;
        };

        if correlation.matched.contains_key(id) {
            correlation
                .anomalies
                .push(Anomaly::DuplicateResponse { id: id.clone() });
            continue;
        }

        correlation.matched.insert(id.clone(), response.clone());
        arrival.push(id.clone());
    }

    let expected_order: Vec<RequestId> = correlation
        .order
        .iter()
        .filter(|id| correlation.matched.contains_key(*id))
        .cloned()
        .collect();
    if expected_order != arrival {
        correlation.anomalies.push(Anomaly::OutOfOrder {
            expected: expected_order,
            observed: arrival,
        });
    }

    correlation
}
