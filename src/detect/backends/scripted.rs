use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::{DetectorBackend, RawDetections};
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Replays a fixed script of per-frame outputs.
///
/// Each `detect` call consumes one scripted entry; once the script is exhausted
/// every frame yields nothing. `fail_on_call` makes the Nth call (1-based) return
/// a backend error instead.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<Vec<RawDetection>>,
    calls: u64,
    fail_on_call: Option<u64>,
}

impl ScriptedBackend {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Vec<RawDetection>>,
    {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
            fail_on_call: None,
        }
    }

    pub fn fail_on_call(mut self, call: u64) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect<'a>(&'a mut self, _frame: &Frame) -> Result<RawDetections<'a>> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(anyhow!("scripted backend failure on call {}", self.calls));
        }
        let next = self.script.pop_front().unwrap_or_default();
        Ok(Box::new(next.into_iter()))
    }
}
