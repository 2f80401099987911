mod config;
mod remote;
mod report;
mod runner;

pub use config::{BenchmarkConfig, DEFAULT_MAX_TOKENS, DEFAULT_PROMPT, DEFAULT_RUNS};
pub use remote::{
    Generation, ModalClass, ModalModel, RemoteError, RemoteModel, DEFAULT_APP, DEFAULT_CLASS,
    DEFAULT_METHOD,
};
pub use report::{print_summary, write_summary, BenchmarkResult, Stats, Summary};
pub use reqwest::Url;
pub use runner::{estimate_tokens, run_benchmark, tokens_per_second};
