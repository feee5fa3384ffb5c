//! Sequential probe driver
//!
//! Runs each probe as one full request/response cycle: build the plan,
//! deliver it, extract and correlate what came back, judge, record. The
//! driver owns the id allocator, so ids never repeat within a run, and it
//! turns every failure (transport, request construction, panics) into a
//! recorded outcome instead of aborting.


use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::process::ExitStatus;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelError, HttpWrapper, Target};
use crate::config::ProbeConfig;
use crate::correlate::{Anomaly, correlate};
use crate::extract::extract;
use crate::mcp::protocol::truncate;
use crate::probes::{Delivery, IdAllocator, Observation, Outcome, Plan, Probe, Verdict};
use crate::report::ComplianceReport;

/// Characters of target stderr kept for failing probes
const STDERR_TAIL: usize = 500;

/// Side information from a session that judges do not look at
#[derive(Debug, Default)]
struct Evidence {
    server_messages: usize,
    stderr: String,
    write_error: Option<String>,
    exit_status: Option<ExitStatus>,
}

pub struct Harness<T> {
    target: T,
    http: Option<HttpWrapper>,
    settings: ProbeConfig,
    ids: IdAllocator,
}

impl<T: Target> Harness<T> {
    #[inline]
    pub fn new(target: T, settings: ProbeConfig) -> Self {
        Self {
            target,
            http: None,
            settings,
            ids: IdAllocator::default(),
        }
    }

    /// Route payload-rejection probes through an HTTP transport wrapper
    #[inline]
    #[must_use]
    pub fn with_http(mut self, http: Option<HttpWrapper>) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Run `probes` in order, recording each outcome, then finalize the report
    ///
    /// `progress` is called before each probe starts.
    #[inline]
    pub async fn run<F>(&mut self, probes: &[Probe], report: &mut ComplianceReport, mut progress: F)
    where
        F: FnMut(&Probe) + Send,
    {
        info!(
            "Running {} probes against {}",
            probes.len(),
            self.target.describe()
        );

        for probe in probes {
            progress(probe);
            let outcome = self.run_probe(probe).await;
            report.record(probe.name, probe.category, outcome);
        }

        report.finalize();
    }

    /// Run one probe; never fails, every problem becomes an outcome
    #[inline]
    pub async fn run_probe(&mut self, probe: &Probe) -> Outcome {
        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.execute(probe)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Probe {} panicked: {}", probe.name, message);
                Outcome::partial(format!("probe aborted by an internal fault: {}", message))
            }
        };

        match outcome.verdict {
            Verdict::Pass => info!("{} {}: {}", probe.name, outcome.verdict, outcome.detail),
            Verdict::Fail | Verdict::Partial => {
                warn!("{} {}: {}", probe.name, outcome.verdict, outcome.detail);
            }
        }
        debug!("Probe {} finished in {:?}", probe.name, started.elapsed());
        outcome
    }

    async fn execute(&mut self, probe: &Probe) -> Outcome {
        let plan = match probe.build(&self.settings, &mut self.ids) {
            Ok(plan) => plan,
            Err(e) => {
                return Outcome::partial(format!("could not construct request: {}", e));
            }
        };

        let delivered = match (probe.delivery, &self.http) {
            (Delivery::HttpWrapper, Some(wrapper)) => post(wrapper, &plan).await,
            _ => self.exchange(&plan).await,
        };
        let (observation, evidence) = match delivered {
            Ok(delivered) => delivered,
            Err(e) => {
                return Outcome::fail(format!("transport failure: {}", e))
                    .with("target", self.target.describe());
            }
        };

        let outcome = probe.judge(&self.settings, &plan, &observation);
        annotate(outcome, &plan, &observation, &evidence)
    }

    /// Send the plan over the target's stdio and observe the reply
    async fn exchange(&self, plan: &Plan) -> Result<(Observation, Evidence), ChannelError> {
        let output = self
            .target
            .send_and_collect(&plan.payload, self.settings.timeout())
            .await?;

        let extraction = extract(&output.stdout);
        let correlation = correlate(plan.expected_ids(), &extraction.responses);
        for anomaly in &correlation.anomalies {
            debug!("Correlation anomaly: {}", anomaly);
        }

        let observation = Observation {
            correlation,
            elapsed: output.elapsed,
            timed_out: output.timed_out,
            http: None,
            noise: extraction.noise,
        };
        let evidence = Evidence {
            server_messages: extraction.server_messages.len(),
            stderr: output.stderr_text(),
            write_error: output.write_error,
            exit_status: output.exit_status,
        };
        Ok((observation, evidence))
    }
}

/// POST the first payload line to the HTTP wrapper
async fn post(wrapper: &HttpWrapper, plan: &Plan) -> Result<(Observation, Evidence), ChannelError> {
    let body = match plan.payload.first() {
        Some(line) => line.to_line()?,
        None => String::new(),
    };

    let started = Instant::now();
    let reply = wrapper.post_raw(body).await?;
    let observation = Observation {
        elapsed: started.elapsed(),
        http: Some(reply),
        ..Observation::default()
    };
    Ok((observation, Evidence::default()))
}

/// Attach session diagnostics; stderr and exit status only when the probe did not pass
fn annotate(
    mut outcome: Outcome,
    plan: &Plan,
    observation: &Observation,
    evidence: &Evidence,
) -> Outcome {
    let correlation = &observation.correlation;
    // A plan with no ids expects its replies to carry a null id
    let expects_null_ids = plan.expected_ids().next().is_none();
    let anomalies: Vec<&Anomaly> = correlation
        .anomalies
        .iter()
        .filter(|anomaly| {
            !(expects_null_ids && matches!(anomaly, Anomaly::Unsolicited { id: None }))
        })
        .collect();
    if !anomalies.is_empty() {
        outcome = outcome.with("anomalies", itertools::join(anomalies, "; "));
    }

    let missing = correlation.missing();
    if !missing.is_empty() {
        outcome = outcome.with("missing_ids", itertools::join(missing, ", "));
    }
    if observation.noise > 0 {
        outcome = outcome.with("noise_lines", observation.noise);
    }
    if evidence.server_messages > 0 {
        outcome = outcome.with("server_messages", evidence.server_messages);
    }
    if let Some(write_error) = &evidence.write_error {
        outcome = outcome.with("write_error", write_error);
    }

    if outcome.verdict != Verdict::Pass {
        if let Some(status) = evidence.exit_status {
            outcome = outcome.with("exit_status", status);
        }
        let stderr = evidence.stderr.trim();
        if !stderr.is_empty() {
            outcome = outcome.with("stderr", tail(stderr, STDERR_TAIL));
        }
    }
    outcome
}

/// Last `max_chars` characters of `text`
fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max_chars).collect();
    format!("…{}", kept)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(|| "unknown panic".to_string(), |message| truncate(&message, 200))
}
