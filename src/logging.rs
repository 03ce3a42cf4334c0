//! Log setup for programs embedding the allocator.
//!
//! The allocator itself only emits `tracing` events under the `segalloc`
//! target: `debug` for heap growth, `trace` per operation and `warn` when
//! memory runs out.

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `segalloc=debug` in debug builds and `segalloc=info` otherwise. Does
/// nothing if a global subscriber is already set.
pub fn init() {
  use tracing_subscriber::{EnvFilter, fmt};

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    #[cfg(debug_assertions)]
    {
      EnvFilter::new("segalloc=debug")
    }
    #[cfg(not(debug_assertions))]
    {
      EnvFilter::new("segalloc=info")
    }
  });

  fmt().with_env_filter(filter).compact().try_init().ok();
}
