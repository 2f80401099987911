use std::io::{self, Write};
use std::time::Duration;

const RULE_WIDTH: usize = 50;

#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub prompt: String,
    pub output_tokens: u64,
    pub generation_time: Duration,
    pub tokens_per_second: f64,
}

/// Descriptive statistics over one series of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; only defined for two or more samples.
    pub std_dev: Option<f64>,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = if samples.len() > 1 {
            let variance = samples
                .iter()
                .map(|sample| (sample - mean).powi(2))
                .sum::<f64>()
                / (count - 1.0);
            Some(variance.sqrt())
        } else {
            None
        };

        Some(Self {
            mean,
            min,
            max,
            std_dev,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub runs: usize,
    /// Generation time statistics, in seconds.
    pub generation_time: Stats,
    pub tokens_per_second: Stats,
    pub mean_output_tokens: f64,
}

impl Summary {
    /// Returns `None` when there is nothing to summarize.
    pub fn from_results(results: &[BenchmarkResult]) -> Option<Self> {
        let times: Vec<f64> = results
            .iter()
            .map(|result| result.generation_time.as_secs_f64())
            .collect();
        let tps: Vec<f64> = results
            .iter()
            .map(|result| result.tokens_per_second)
            .collect();
        let tokens: Vec<f64> = results
            .iter()
            .map(|result| result.output_tokens as f64)
            .collect();

        Some(Self {
            runs: results.len(),
            generation_time: Stats::from_samples(&times)?,
            tokens_per_second: Stats::from_samples(&tps)?,
            mean_output_tokens: Stats::from_samples(&tokens)?.mean,
        })
    }
}

pub fn write_summary<W: Write>(out: &mut W, results: &[BenchmarkResult]) -> io::Result<()> {
    let Some(summary) = Summary::from_results(results) else {
        return writeln!(out, "No successful runs to summarize.");
    };

    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "BENCHMARK SUMMARY")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Runs: {}", summary.runs)?;

    writeln!(out)?;
    writeln!(out, "Generation time:")?;
    write_stats(out, &summary.generation_time, "s")?;

    writeln!(out)?;
    writeln!(out, "Tokens per second:")?;
    write_stats(out, &summary.tokens_per_second, " tps")?;

    writeln!(out)?;
    writeln!(
        out,
        "Average output length: ~{:.0} tokens",
        summary.mean_output_tokens
    )?;
    writeln!(out, "{}", rule)?;
    Ok(())
}

fn write_stats<W: Write>(out: &mut W, stats: &Stats, unit: &str) -> io::Result<()> {
    writeln!(out, "   Mean: {:.2}{}", stats.mean, unit)?;
    writeln!(out, "   Min:  {:.2}{}", stats.min, unit)?;
    writeln!(out, "   Max:  {:.2}{}", stats.max, unit)?;
    if let Some(std_dev) = stats.std_dev {
        writeln!(out, "   Std:  {:.2}{}", std_dev, unit)?;
    }
    Ok(())
}

pub fn print_summary(results: &[BenchmarkResult]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_summary(&mut handle, results)?;
    handle.flush()
}
