//! Runtime construction from configuration.
//!
//! Embedding applications usually run the server on their own runtime;
//! [`build_runtime`] exists for binaries that want the configured worker
//! count and thread naming without writing the builder dance themselves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use palisade_core::Error;

use crate::config::ServerConfig;

/// Builds a multi-threaded tokio runtime per the configuration: worker
/// thread count (default: one per core) and worker thread names from
/// `worker_name_format`, with `{}` replaced by the worker index.
///
/// # Errors
///
/// Returns [`Error::Io`] when the runtime cannot be created.
pub fn build_runtime(config: &ServerConfig) -> Result<tokio::runtime::Runtime, Error> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if let Some(workers) = config.worker_threads() {
        builder.worker_threads(workers);
    }

    let format = config.worker_name_format().to_string();
    let counter = Arc::new(AtomicUsize::new(0));
    builder.thread_name_fn(move || {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        format.replacen("{}", &index.to_string(), 1)
    });

    builder.build().map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_runtime_with_names() {
        let config = ServerConfig::builder()
            .worker_threads(2)
            .worker_name_format("test-worker-{}")
            .build();

        let runtime = build_runtime(&config).unwrap();
        let name = runtime.block_on(async {
            tokio::task::spawn_blocking(|| {
                std::thread::current().name().map(str::to_string)
            })
            .await
            .unwrap()
        });
        // Blocking threads use the same name source.
        assert!(name.unwrap().starts_with("test-worker-"));
        runtime.shutdown_background();
    }

    #[test]
    fn test_build_runtime_default_workers() {
        let runtime = build_runtime(&ServerConfig::default()).unwrap();
        runtime.shutdown_background();
    }
}
