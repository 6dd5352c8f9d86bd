//! Intercept event feed: one JSON object per line.
//!
//! ```text
//! {"event":"request","request":{"method":"GET","url":"…","host":"…","headers":{…}}}
//! {"event":"response","request":{…},"response":{"status_code":200,"headers":{…},"content":"<base64>","decode_error":false}}
//! {"event":"response","request":{…},"response":null}
//! ```
//!
//! Lines that are not events (the proxy's own log output) are skipped.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, trace};

use crate::correlator::FlowCorrelator;
use crate::flow::{ObservedResponse, RequestInfo};
use crate::CaptureError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InterceptEvent {
    Request {
        request: RequestInfo,
    },
    Response {
        request: RequestInfo,
        response: Option<ObservedResponse>,
    },
}

impl InterceptEvent {
    /// Parse one feed line. `None` for blank or non-event lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            if !line.is_empty() {
                trace!(line, "skipping non-event line");
            }
            return None;
        }
        match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "malformed intercept event");
                None
            }
        }
    }

    /// Hand the event to the correlator. Returns whether it changed the log.
    pub fn dispatch(self, correlator: &FlowCorrelator) -> bool {
        match self {
            InterceptEvent::Request { request } => correlator.on_request_observed(request),
            InterceptEvent::Response { request, response } => {
                correlator.on_response_observed(&request, response)
            }
        }
    }
}

/// Read events from `reader` until EOF, dispatching each to `correlator`.
/// Returns the number of events dispatched.
pub async fn pump_lines<R>(reader: R, correlator: &FlowCorrelator) -> Result<usize, CaptureError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut dispatched = 0;
    while let Some(line) = lines.next_line().await? {
        if let Some(event) = InterceptEvent::parse_line(&line) {
            event.dispatch(correlator);
            dispatched += 1;
        }
    }
    debug!(dispatched, "intercept feed closed");
    Ok(dispatched)
}
