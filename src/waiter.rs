//! Poll-and-match state-convergence helper.
//!
//! A waiter repeatedly invokes an operation and evaluates its acceptors
//! against each outcome until one matches `success` (return), `failure`
//! (error), or the cumulative wait exceeds `max_wait`.

use std::time::{Duration, Instant};

use crate::client::AwsClient;
use crate::errors::{AwsError, WaiterError};
use crate::operation::OperationDescriptor;
use crate::shape::ShapeValue;

const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// What matching an acceptor means for the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Success,
    Failure,
    Retry,
}

/// How an acceptor inspects an outcome.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Equality against the field at a dotted path.
    Path { path: String, expected: ShapeValue },
    /// Existential match over an array member.
    AnyPath {
        array_path: String,
        element_path: String,
        expected: ShapeValue,
    },
    /// Universal match over an array member.
    AllPath {
        array_path: String,
        element_path: String,
        expected: ShapeValue,
    },
    /// Against the surfaced error's code.
    ErrorCode(String),
    /// Against the surfaced error's HTTP status.
    ErrorStatus(u16),
}

/// An acceptor: a matcher plus the state it selects.
#[derive(Debug, Clone)]
pub struct Acceptor {
    pub state: AcceptorState,
    pub matcher: Matcher,
}

impl Acceptor {
    pub fn new(state: AcceptorState, matcher: Matcher) -> Self {
        Self { state, matcher }
    }

    fn matches(&self, outcome: &Result<Option<ShapeValue>, AwsError>) -> bool {
        match (&self.matcher, outcome) {
            (Matcher::Path { path, expected }, Ok(Some(output))) => {
                output.path(path) == Some(expected)
            }
            (
                Matcher::AnyPath {
                    array_path,
                    element_path,
                    expected,
                },
                Ok(Some(output)),
            ) => elements(output, array_path, element_path)
                .is_some_and(|mut els| els.any(|el| el == Some(expected))),
            (
                Matcher::AllPath {
                    array_path,
                    element_path,
                    expected,
                },
                Ok(Some(output)),
            ) => elements(output, array_path, element_path)
                .is_some_and(|mut els| els.all(|el| el == Some(expected))),
            (Matcher::ErrorCode(code), Err(AwsError::Service(err))) => {
                err.code() == Some(code.as_str())
            }
            (Matcher::ErrorStatus(status), Err(AwsError::Service(err))) => {
                err.status() == *status
            }
            _ => false,
        }
    }
}

/// Resolve the array member and iterate its elements at `element_path`
/// (empty path means the element itself).
fn elements<'a>(
    output: &'a ShapeValue,
    array_path: &str,
    element_path: &'a str,
) -> Option<impl Iterator<Item = Option<&'a ShapeValue>>> {
    let list = output.path(array_path)?.as_list()?;
    Some(list.iter().map(move |el| {
        if element_path.is_empty() {
            Some(el)
        } else {
            el.path(element_path)
        }
    }))
}

/// Polls an operation until its acceptors converge.
#[derive(Debug, Clone)]
pub struct Waiter {
    pub acceptors: Vec<Acceptor>,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_wait: Duration,
}

impl Waiter {
    pub fn new(acceptors: Vec<Acceptor>) -> Self {
        Self {
            acceptors,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Delay before the next poll: `min(max_delay, min_delay * 2^retries)`.
    fn poll_delay(&self, consecutive_retries: u32) -> Duration {
        self.min_delay
            .saturating_mul(2u32.saturating_pow(consecutive_retries))
            .min(self.max_delay)
    }

    /// Poll `op` on `client` until an acceptor converges.
    ///
    /// An unmatched success keeps polling; an unmatched error propagates.
    pub async fn wait(
        &self,
        client: &AwsClient,
        op: &OperationDescriptor,
        input: Option<ShapeValue>,
    ) -> Result<Option<ShapeValue>, WaiterError> {
        let started = Instant::now();
        let mut consecutive_retries: u32 = 0;

        loop {
            let outcome = client.execute(op, input.clone()).await;

            let matched = self
                .acceptors
                .iter()
                .find(|acceptor| acceptor.matches(&outcome));

            match matched.map(|a| a.state) {
                Some(AcceptorState::Success) => {
                    return match outcome {
                        Ok(output) => Ok(output),
                        // An error acceptor can select success; there is no
                        // output to hand back in that case.
                        Err(_) => Ok(None),
                    };
                }
                Some(AcceptorState::Failure) => {
                    return Err(WaiterError::FailureState(format!(
                        "{:?}",
                        matched.map(|a| &a.matcher)
                    )));
                }
                Some(AcceptorState::Retry) => {}
                None => {
                    if let Err(err) = outcome {
                        return Err(WaiterError::Request(Box::new(err)));
                    }
                }
            }

            let delay = self.poll_delay(consecutive_retries);
            if started.elapsed() + delay > self.max_wait {
                return Err(WaiterError::Timeout(self.max_wait));
            }
            tokio::time::sleep(delay).await;
            consecutive_retries += 1;
        }
    }
}
