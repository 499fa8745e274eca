//! Waiter - Poll a remote object until it reaches a target status
//!
//! Remote APIs usually acknowledge a request long before the object is
//! usable. `StateChangeConf` repeatedly calls a refresh function that
//! reports the object and its status string, and resolves once the status
//! is one of the targets.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{Instant, sleep};

use crate::resource::Value;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', \
         timeout: {timeout:?})",
        expected.join(", ")
    )]
    Timeout {
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{}'", expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: usize },

    #[error(transparent)]
    Refresh(E),
}

/// Configuration of a status poll
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    /// Empty target means "wait until the object is gone"
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Wait between refreshes
    pub poll_interval: Duration,
    /// Consecutive not-found results tolerated while waiting for a target
    pub not_found_checks: usize,
    /// Consecutive target observations required
    pub continuous_target_occurence: usize,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            not_found_checks: 20,
            continuous_target_occurence: 1,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurence(mut self, count: usize) -> Self {
        self.continuous_target_occurence = count.max(1);
        self
    }

    /// Poll `refresh` until the reported status is a target.
    ///
    /// `refresh` returns `None` when the object does not exist. Returns the
    /// last refreshed object, or `None` when waiting for deletion succeeded.
    pub async fn wait_for_state<T, E, F, Fut>(
        &self,
        mut refresh: F,
    ) -> Result<Option<T>, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut not_found = 0;
        let mut target_seen = 0;
        let mut last_state = String::new();

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        loop {
            match refresh().await.map_err(WaitError::Refresh)? {
                None => {
                    if self.target.is_empty() {
                        return Ok(None);
                    }
                    not_found += 1;
                    target_seen = 0;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound { checks: not_found });
                    }
                }
                Some((object, status)) => {
                    not_found = 0;
                    debug!("refreshed status: {}", status);
                    if self.target.iter().any(|t| *t == status) {
                        target_seen += 1;
                        if target_seen >= self.continuous_target_occurence {
                            return Ok(Some(object));
                        }
                    } else if self.pending.iter().any(|p| *p == status) {
                        target_seen = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state: status,
                            expected: self.target.clone(),
                        });
                    }
                    last_state = status;
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                warn!("gave up waiting in state '{}'", last_state);
                return Err(WaitError::Timeout {
                    last_state,
                    expected: self.target.clone(),
                    timeout: self.timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Retry `operation` while its error satisfies `retryable`, up to `timeout`.
/// The final error is returned once the timeout has elapsed.
pub async fn retry_when<T, E, F, Fut, P>(
    timeout: Duration,
    mut operation: F,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && Instant::now() + RETRY_INTERVAL <= deadline => {
                debug!("retrying after retryable error");
                sleep(RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Operation timeouts configured through the `_timeouts` attribute
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timeouts {
    pub create: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl Timeouts {
    pub const ATTRIBUTE: &'static str = "_timeouts";

    /// Read timeouts from a resource's attributes. Unset operations fall
    /// back to the resource default; unknown operations and malformed
    /// durations are errors.
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, String> {
        let Some(value) = attributes.get(Self::ATTRIBUTE) else {
            return Ok(Self::default());
        };
        let map = value
            .as_map()
            .ok_or_else(|| "timeouts must be a map of operation to duration".to_string())?;

        let mut timeouts = Self::default();
        for (operation, value) in map {
            let slot = match operation.as_str() {
                "create" => &mut timeouts.create,
                "update" => &mut timeouts.update,
                "delete" => &mut timeouts.delete,
                other => {
                    return Err(format!(
                        "unknown timeout '{}', expected create, update or delete",
                        other
                    ));
                }
            };
            let duration = value
                .as_str()
                .ok_or_else(|| "expected a duration string".to_string())
                .and_then(parse_duration)
                .map_err(|e| format!("timeout '{}': {}", operation, e))?;
            *slot = Some(duration);
        }
        Ok(timeouts)
    }

    pub fn create_or(&self, default: Duration) -> Duration {
        self.create.unwrap_or(default)
    }

    pub fn update_or(&self, default: Duration) -> Duration {
        self.update.unwrap_or(default)
    }

    pub fn delete_or(&self, default: Duration) -> Duration {
        self.delete.unwrap_or(default)
    }
}

/// Parse durations such as `"40m"`, `"1h30m"`, `"90s"`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut number = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}'", input))?;
        number.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("invalid unit '{}' in duration '{}'", c, input)),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration too large '{}'", input))?;
    }
    if !number.is_empty() {
        return Err(format!("missing unit in duration '{}'", input));
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn statuses(
        seq: &'static [Option<&'static str>],
    ) -> impl FnMut() -> std::future::Ready<Result<Option<((), String)>, String>> {
        let calls = AtomicUsize::new(0);
        move || {
            let i = calls.fetch_add(1, Ordering::SeqCst).min(seq.len() - 1);
            std::future::ready(Ok(seq[i].map(|s| ((), s.to_string()))))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_pending_states() {
        let conf = StateChangeConf::new(
            &["creating", "modifying"],
            &["available"],
            Duration::from_secs(600),
        );
        let result = conf
            .wait_for_state(statuses(&[Some("creating"), Some("modifying"), Some("available")]))
            .await;
        assert!(matches!(result, Ok(Some(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_succeeds_when_gone() {
        let conf = StateChangeConf::new(&["deleting"], &[], Duration::from_secs(600));
        let result = conf.wait_for_state(statuses(&[Some("deleting"), None])).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_is_an_error() {
        let conf = StateChangeConf::new(&["creating"], &["available"], Duration::from_secs(600));
        let result = conf.wait_for_state(statuses(&[Some("creating"), Some("failed")])).await;
        match result {
            Err(WaitError::UnexpectedState { state, .. }) => assert_eq!(state, "failed"),
            other => panic!("expected UnexpectedState, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_in_pending_state() {
        let conf = StateChangeConf::new(&["creating"], &["available"], Duration::from_secs(30));
        let result = conf.wait_for_state(statuses(&[Some("creating")])).await;
        match result {
            Err(WaitError::Timeout { last_state, .. }) => assert_eq!(last_state, "creating"),
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_tolerated_a_limited_number_of_times() {
        let conf = StateChangeConf::new(&["creating"], &["available"], Duration::from_secs(600))
            .with_not_found_checks(2);
        let result = conf.wait_for_state(statuses(&[None])).await;
        assert!(matches!(result, Err(WaitError::NotFound { checks: 3 })));

        let conf = StateChangeConf::new(&["creating"], &["available"], Duration::from_secs(600))
            .with_not_found_checks(2);
        let result = conf.wait_for_state(statuses(&[None, None, Some("available")])).await;
        assert!(matches!(result, Ok(Some(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_when_retries_matching_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = retry_when(
            Duration::from_secs(60),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("AccessDeniedFault".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |e| e == "AccessDeniedFault",
        )
        .await;
        assert_eq!(result, Ok(2));

        let result: Result<(), String> = retry_when(
            Duration::from_secs(60),
            || async { Err("InvalidParameterValueException".to_string()) },
            |e| e == "AccessDeniedFault",
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("40m"), Ok(Duration::from_secs(2400)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert!(parse_duration("90").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn timeouts_from_attributes() {
        let mut timeouts = HashMap::new();
        timeouts.insert("create".to_string(), Value::from("1h"));
        let mut attrs = HashMap::new();
        attrs.insert(Timeouts::ATTRIBUTE.to_string(), Value::Map(timeouts));

        let t = Timeouts::from_attributes(&attrs).unwrap();
        assert_eq!(t.create_or(Duration::from_secs(1)), Duration::from_secs(3600));
        assert_eq!(t.delete_or(Duration::from_secs(600)), Duration::from_secs(600));
        assert_eq!(
            Timeouts::from_attributes(&HashMap::new()),
            Ok(Timeouts::default())
        );
    }

    fn timeouts_of(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect();
        HashMap::from([(Timeouts::ATTRIBUTE.to_string(), Value::Map(map))])
    }

    #[test]
    fn malformed_timeouts_are_rejected() {
        let err = Timeouts::from_attributes(&timeouts_of(&[("delete", "bogus")])).unwrap_err();
        assert!(err.starts_with("timeout 'delete'"), "{}", err);

        let err = Timeouts::from_attributes(&timeouts_of(&[("craete", "10m")])).unwrap_err();
        assert!(err.contains("unknown timeout 'craete'"), "{}", err);

        let not_a_map = HashMap::from([(Timeouts::ATTRIBUTE.to_string(), Value::from("10m"))]);
        assert!(Timeouts::from_attributes(&not_a_map).is_err());
    }

    #[test]
    fn oversized_duration_is_an_error() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(err.contains("too large"), "{}", err);
        let attrs = timeouts_of(&[("create", "9999999999999999h")]);
        assert!(Timeouts::from_attributes(&attrs).is_err());
    }
}
