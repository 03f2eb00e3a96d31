use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;

use crate::{Request, Transport};

#[derive(Debug, Default)]
struct Canned {
    responses: HashMap<Request, Result<Vec<u8>, String>>,
    calls: Vec<Request>,
}

/// In-memory transport with canned responses; records every request.
#[derive(Debug, Default)]
pub struct MockTransport {
    canned: Mutex<Canned>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long (on the tokio clock) before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    fn lock(&self) -> MutexGuard<'_, Canned> {
        self.canned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn respond(&self, request: Request, body: impl Into<Vec<u8>>) {
        self.lock().responses.insert(request, Ok(body.into()));
    }

    pub fn fail(&self, request: Request, message: impl Into<String>) {
        self.lock().responses.insert(request, Err(message.into()));
    }

    /// Number of fetches issued for `request`.
    pub fn calls(&self, request: &Request) -> usize {
        self.lock().calls.iter().filter(|r| *r == request).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Vec<u8>> {
        let answer = {
            let mut canned = self.lock();
            canned.calls.push(request.clone());
            canned.responses.get(request).cloned()
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match answer {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no canned response for {request}")),
        }
    }
}
