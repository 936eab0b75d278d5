//! Per-run profiling: model call and tool call timings in issuance order.

use std::time::{Duration, Instant};

use pico_core::model::Usage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProfilingEntry {
    LlmCall {
        iteration: u32,
        duration_ms: u64,
        input_tokens: u32,
        output_tokens: u32,
    },
    ToolCall {
        sequence: u32,
        tool_name: String,
        duration_ms: u64,
        success: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingSummary {
    pub total_duration_ms: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub llm_calls: usize,
    pub tool_calls: usize,
    pub timeline: Vec<ProfilingEntry>,
}

/// Append-only profiler for one run.
#[derive(Debug)]
pub struct Profiler {
    started: Instant,
    entries: Vec<ProfilingEntry>,
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    pub fn record_llm_call(&mut self, iteration: u32, elapsed: Duration, usage: Usage) {
        self.entries.push(ProfilingEntry::LlmCall {
            iteration,
            duration_ms: elapsed.as_millis() as u64,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        });
    }

    pub fn record_tool_call(&mut self, sequence: u32, tool_name: &str, elapsed: Duration, success: bool) {
        self.entries.push(ProfilingEntry::ToolCall {
            sequence,
            tool_name: tool_name.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            success,
        });
    }

    pub fn entries(&self) -> &[ProfilingEntry] {
        &self.entries
    }

    pub fn summary(&self) -> ProfilingSummary {
        let mut summary = ProfilingSummary {
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            timeline: self.entries.clone(),
            ..Default::default()
        };
        for entry in &self.entries {
            match entry {
                ProfilingEntry::LlmCall {
                    input_tokens,
                    output_tokens,
                    ..
                } => {
                    summary.llm_calls += 1;
                    summary.total_input_tokens += u64::from(*input_tokens);
                    summary.total_output_tokens += u64::from(*output_tokens);
                }
                ProfilingEntry::ToolCall { .. } => summary.tool_calls += 1,
            }
        }
        summary
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}
