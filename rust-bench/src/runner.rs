use std::time::Duration;

use tracing::debug;

use crate::config::BenchmarkConfig;
use crate::remote::{RemoteError, RemoteModel};
use crate::report::BenchmarkResult;

/// Rough token count: one token per four characters, never less than one.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64 / 4).max(1)
}

pub fn tokens_per_second(tokens: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        tokens as f64 / secs
    } else {
        0.0
    }
}

/// Runs the optional warmup followed by `config.runs` sequential timed calls.
///
/// Failed runs are reported and skipped. Only an error that makes the remote
/// model unusable altogether aborts the benchmark.
pub async fn run_benchmark<M>(
    model: &M,
    config: &BenchmarkConfig,
) -> Result<Vec<BenchmarkResult>, RemoteError>
where
    M: RemoteModel + ?Sized,
{
    if config.warmup {
        println!("Warmup run...");
        match model.generate(&config.prompt, config.max_tokens).await {
            Ok(generation) => {
                let elapsed_ms = generation.elapsed.as_millis() as u64;
                debug!(elapsed_ms, "warmup finished");
                println!("Warmup complete\n");
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(error = %err, "warmup failed");
                println!("Warmup failed: {}\n", err);
            }
        }
    }

    let mut results = Vec::with_capacity(config.runs);
    for run in 1..=config.runs {
        println!("Run {}/{}...", run, config.runs);

        let generation = match model.generate(&config.prompt, config.max_tokens).await {
            Ok(generation) => generation,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(run, error = %err, "benchmark run failed");
                println!("   Failed: {}\n", err);
                continue;
            }
        };

        let output_tokens = estimate_tokens(&generation.text);
        let tps = tokens_per_second(output_tokens, generation.elapsed);

        println!("   Time: {:.2}s", generation.elapsed.as_secs_f64());
        println!("   Tokens: ~{}", output_tokens);
        println!("   TPS: {:.2} tokens/sec\n", tps);

        results.push(BenchmarkResult {
            prompt: config.prompt.clone(),
            output_tokens,
            generation_time: generation.elapsed,
            tokens_per_second: tps,
        });
    }

    Ok(results)
}
