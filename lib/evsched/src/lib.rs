use std::path::Path;
use fnv::{FnvHashMap, FnvHashSet};

pub mod data;
pub mod route;
pub mod schedule;
pub mod heuristic;

pub use schedule::{evaluate, evaluate_many, evaluate_many_with, evaluate_with, ChargePin, Evaluation, Infeasibility, Schedule};
pub use heuristic::{construct_initial_route, ConstructionFailed};

pub type Map<K, V> = FnvHashMap<K, V>;
pub type Set<T> = FnvHashSet<T>;


mod logging_setup {
    use super::*;
    use anyhow::{Context, Result};
    use tracing_subscriber::{EnvFilter, fmt, registry, prelude::*};
    use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
    use std::fs::OpenOptions;

    fn build_and_set_global_subscriber<P>(logfile: Option<P>, is_test : bool) -> Result<Option<WorkerGuard>> where
        P : AsRef<Path>
    {
        let stderr_log = fmt::layer().with_writer(std::io::stderr);
        let env_filter = EnvFilter::from_default_env();
        let r = registry().with(stderr_log).with(env_filter);

        let flush_guard = match logfile {
            Some(p) => {
                let p = p.as_ref();
                let logfile = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
                    .with_context(|| format!("cannot open log file {:?}", p))?;
                let (writer, _guard) = non_blocking::NonBlockingBuilder::default()
                    .lossy(false)
                    .finish(logfile);
                let json = fmt::layer()
                    .json()
                    .with_span_list(true)
                    .with_current_span(false)
                    .with_writer(writer);

                let r = r.with(json);
                if is_test { r.try_init().ok(); }
                else { r.init(); }
                Some(_guard)
            },
            None => {
                if is_test { r.try_init().ok(); }
                else { r.init(); }
                None
            }
        };
        return Ok(flush_guard)
    }

    /// Installs the global subscriber: human-readable events on stderr (filtered by `RUST_LOG`) and, if
    /// `logfile` is given, newline-delimited JSON in that file.  Keep the guard alive until exit.
    pub fn init_logging(logfile: Option<impl AsRef<Path>>) -> Result<Option<WorkerGuard>> {
        return build_and_set_global_subscriber(logfile, false);
    }

    #[allow(dead_code)]
    pub(crate) fn init_test_logging(logfile: Option<impl AsRef<Path>>) -> Option<WorkerGuard> {
        return build_and_set_global_subscriber(logfile, true).ok().flatten();
    }
}
pub use logging_setup::*;
