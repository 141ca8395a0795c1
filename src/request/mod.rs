mod lifecycle;

pub use lifecycle::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::{HttpError, HttpResponse, OsmCanvasError, Result};

/// Readiness of a request, in lifecycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsent => "UNSENT",
            Self::Opened => "OPENED",
            Self::HeadersReceived => "HEADERS_RECEIVED",
            Self::Loading => "LOADING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// How the caller intends to wait for the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `send()` returns a future the caller awaits
    Async,
    /// `send_blocking()` drives the exchange to completion on the calling thread
    Blocking,
}

/// How an exchange ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The server answered; the status may still be an error status
    Completed(HttpResponse),
    /// The request was aborted before it completed
    Aborted,
    /// The transport gave up
    Failed(HttpError),
}

impl Outcome {
    /// Status code of a completed exchange
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Completed(response) => Some(response.status),
            _ => None,
        }
    }

    /// The response of a successful (2xx) exchange, or the transport error describing
    /// why there is none
    pub fn into_response(self) -> Result<HttpResponse> {
        match self {
            Self::Completed(response) if response.is_success() => Ok(response),
            Self::Completed(response) => Err(OsmCanvasError::Transport(HttpError::HttpStatus {
                status: response.status,
            })),
            Self::Aborted => Err(OsmCanvasError::Transport(HttpError::Aborted)),
            Self::Failed(error) => Err(OsmCanvasError::Transport(error)),
        }
    }
}

/// A state-change notification. `outcome` is set only for `ReadyState::Done`.
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    pub state: ReadyState,
    pub outcome: Option<&'a Outcome>,
}

/// Callback invoked on every state change
pub type StateChangeCallback = Box<dyn FnMut(&StateChange<'_>) + Send>;

/// Cloneable handle that aborts a request from outside the task driving it
#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Request cancellation; honoured the next time the exchange is polled
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}
