use anyhow::{anyhow, Result};

pub const DEFAULT_PROMPT: &str = "Write a short poem about artificial intelligence.";
pub const DEFAULT_MAX_TOKENS: u32 = 100;
pub const DEFAULT_RUNS: usize = 3;

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub prompt: String,
    pub max_tokens: u32,
    pub runs: usize,
    pub warmup: bool,
}

impl BenchmarkConfig {
    pub fn try_new(
        prompt: impl Into<String>,
        max_tokens: u32,
        runs: usize,
        warmup: bool,
    ) -> Result<Self> {
        if max_tokens == 0 {
            return Err(anyhow!("max_tokens must be greater than zero"));
        }

        Ok(Self {
            prompt: prompt.into(),
            max_tokens,
            runs,
            warmup,
        })
    }

    /// Prompt shortened for the banner, with a trailing ellipsis when cut.
    pub fn prompt_preview(&self, limit: usize) -> String {
        let mut chars = self.prompt.chars();
        let head: String = chars.by_ref().take(limit).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            runs: DEFAULT_RUNS,
            warmup: true,
        }
    }
}
