//! Scripted transport for tests
//!
//! Responses are registered against a method and a URL substring. One-shot
//! replies are consumed in registration order; sticky replies answer every
//! matching request once the one-shot replies for it are used up. Every
//! request is recorded for later inspection.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{HttpRequest, HttpResponse, HttpTransport, Method, TransportFailure};
use crate::error::TransportErrorKind;

#[derive(Debug, Clone)]
struct Rule {
    method: Method,
    pattern: String,
    reply: Result<HttpResponse, TransportFailure>,
    delay: Duration,
    sticky: bool,
    used: bool,
}

impl Rule {
    fn matches(&self, request: &HttpRequest) -> bool {
        self.method == request.method && request.url.contains(&self.pattern)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &self,
        method: Method,
        pattern: &str,
        reply: Result<HttpResponse, TransportFailure>,
        delay: Duration,
        sticky: bool,
    ) -> &Self {
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Rule {
                method,
                pattern: pattern.to_string(),
                reply,
                delay,
                sticky,
                used: false,
            });
        self
    }

    /// Answer the next matching request once
    pub fn on(&self, method: Method, pattern: &str, response: HttpResponse) -> &Self {
        self.push(method, pattern, Ok(response), Duration::ZERO, false)
    }

    /// Answer the next matching request once, after `delay`
    pub fn on_delayed(
        &self,
        method: Method,
        pattern: &str,
        delay: Duration,
        response: HttpResponse,
    ) -> &Self {
        self.push(method, pattern, Ok(response), delay, false)
    }

    /// Fail the next matching request once without a response
    pub fn fail(&self, method: Method, pattern: &str, kind: TransportErrorKind) -> &Self {
        let failure = TransportFailure::new(kind, format!("scripted {} failure", kind));
        self.push(method, pattern, Err(failure), Duration::ZERO, false)
    }

    /// Answer every matching request not claimed by a one-shot reply
    pub fn always(&self, method: Method, pattern: &str, response: HttpResponse) -> &Self {
        self.push(method, pattern, Ok(response), Duration::ZERO, true)
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Requests whose method matches and whose URL contains `pattern`
    pub fn requests_to(&self, method: Method, pattern: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.contains(pattern))
            .collect()
    }

    /// One-shot replies that were never consumed
    pub fn pending(&self) -> usize {
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| !r.sticky && !r.used)
            .count()
    }

    fn next_reply(
        &self,
        request: &HttpRequest,
    ) -> Option<(Result<HttpResponse, TransportFailure>, Duration)> {
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(rule) = rules
            .iter_mut()
            .find(|r| !r.sticky && !r.used && r.matches(request))
        {
            rule.used = true;
            return Some((rule.reply.clone(), rule.delay));
        }

        rules
            .iter()
            .find(|r| r.sticky && r.matches(request))
            .map(|r| (r.reply.clone(), r.delay))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let Some((reply, delay)) = self.next_reply(&request) else {
            return Err(TransportFailure::new(
                TransportErrorKind::Other,
                format!(
                    "no scripted response for {} {}",
                    request.method.as_str(),
                    request.url
                ),
            ));
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }
        reply
    }
}
