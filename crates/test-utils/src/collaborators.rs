use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use gatedag::aggregate::{CompletedResult, Synthesizer};
use gatedag::pipeline::Request;
use gatedag::planner::Planner;
use gatedag::stage::StageFuture;

/// Planner that returns fixed text, or fails.
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    reply: Result<String, String>,
}

impl StaticPlanner {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
        }
    }
}

impl Planner for StaticPlanner {
    fn plan<'a>(&'a self, _request: &'a Request) -> StageFuture<'a, anyhow::Result<String>> {
        let reply = self.reply.clone().map_err(|e| anyhow!("{e}"));
        Box::pin(async move { reply })
    }
}

/// Synthesizer that emits one chunk per result (`"<id>: <output>\n"`) and
/// remembers what it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSynthesizer {
    received: Arc<Mutex<Option<Vec<CompletedResult>>>>,
    fail: bool,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Results from the last call, or `None` if never called.
    pub fn received(&self) -> Option<Vec<CompletedResult>> {
        self.received.lock().unwrap().clone()
    }
}

impl Synthesizer for RecordingSynthesizer {
    fn synthesize<'a>(
        &'a self,
        _request: &'a Request,
        results: &'a [CompletedResult],
        on_chunk: &'a mut (dyn FnMut(String) + Send),
    ) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            *self.received.lock().unwrap() = Some(results.to_vec());
            if self.fail {
                return Err(anyhow!("synthesizer unavailable"));
            }
            for r in results {
                on_chunk(format!("{}: {}\n", r.task, r.output));
            }
            Ok(())
        })
    }
}
