//! Two user-space hardware event counters read through `perf_event_open`.
//!
//! Open, read, close. No grouping, sampling or multiplexing.

use std::io;
use thiserror::Error;

/// Raw PMU event number of a cache miss, as full-system simulators expose it.
pub const RAW_CACHE_MISSES: u64 = 0x33;
/// Raw PMU event number of a mispredicted branch.
pub const RAW_BRANCH_MISSES: u64 = 0x10;

#[derive(Debug, Error)]
pub enum PerfError {
    #[error("perf_event_open failed for {counter}: {source}")]
    Open {
        counter: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {counter}: {source}")]
    Read {
        counter: &'static str,
        #[source]
        source: io::Error,
    },
}

/// How the two events are named to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerfEventSource {
    /// Generic hardware events, for real cores.
    #[default]
    Hardware,
    /// Raw PMU event numbers, for full-system simulators which do not map the generic ones.
    Raw,
}

impl PerfEventSource {
    /// Raw event numbers for (cache misses, branch misses), `None` for generic events.
    pub fn raw_events(&self) -> Option<(u64, u64)> {
        match self {
            PerfEventSource::Hardware => None,
            PerfEventSource::Raw => Some((RAW_CACHE_MISSES, RAW_BRANCH_MISSES)),
        }
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use super::{PerfError, PerfEventSource};
    use perf_event2::events::{Event, Hardware, Raw};
    use perf_event2::Builder;
    use std::fmt;

    pub struct Counter {
        name: &'static str,
        counter: perf_event2::Counter,
    }

    impl fmt::Debug for Counter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Counter").field("name", &self.name).finish_non_exhaustive()
        }
    }

    impl Counter {
        fn open<E: Event + 'static>(name: &'static str, event: E) -> Result<Counter, PerfError> {
            let open_error = |source| PerfError::Open {
                counter: name,
                source,
            };
            // Calling thread, any cpu, user space only.
            let mut counter = Builder::new(event)
                .exclude_kernel(true)
                .exclude_hv(true)
                .build()
                .map_err(open_error)?;
            counter.enable().map_err(open_error)?;
            Ok(Counter { name, counter })
        }

        pub fn cache_misses(source: PerfEventSource) -> Result<Counter, PerfError> {
            const NAME: &str = "cache misses";
            match source.raw_events() {
                Some((raw, _)) => Self::open(NAME, Raw::new(raw)),
                None => Self::open(NAME, Hardware::CACHE_MISSES),
            }
        }

        pub fn branch_misses(source: PerfEventSource) -> Result<Counter, PerfError> {
            const NAME: &str = "branch misses";
            match source.raw_events() {
                Some((_, raw)) => Self::open(NAME, Raw::new(raw)),
                None => Self::open(NAME, Hardware::BRANCH_MISSES),
            }
        }

        pub fn read(&mut self) -> Result<u64, PerfError> {
            self.counter.read().map_err(|source| PerfError::Read {
                counter: self.name,
                source,
            })
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::{PerfError, PerfEventSource};
    use std::io;

    #[derive(Debug)]
    pub struct Counter;

    impl Counter {
        fn unsupported(name: &'static str) -> Result<Counter, PerfError> {
            Err(PerfError::Open {
                counter: name,
                source: io::Error::from(io::ErrorKind::Unsupported),
            })
        }

        pub fn cache_misses(_source: PerfEventSource) -> Result<Counter, PerfError> {
            Self::unsupported("cache misses")
        }

        pub fn branch_misses(_source: PerfEventSource) -> Result<Counter, PerfError> {
            Self::unsupported("branch misses")
        }

        pub fn read(&mut self) -> Result<u64, PerfError> {
            Ok(0)
        }
    }
}

/// Cache miss and branch mispredict counters of the calling thread.
///
/// Dropping the value closes both descriptors.
#[derive(Debug)]
pub struct PerfCounters {
    cache_misses: sys::Counter,
    branch_misses: sys::Counter,
}

impl PerfCounters {
    pub fn init(source: PerfEventSource) -> Result<Self, PerfError> {
        Ok(PerfCounters {
            cache_misses: sys::Counter::cache_misses(source)?,
            branch_misses: sys::Counter::branch_misses(source)?,
        })
    }

    pub fn read_cache_misses(&mut self) -> Result<u64, PerfError> {
        self.cache_misses.read()
    }

    pub fn read_branch_misses(&mut self) -> Result<u64, PerfError> {
        self.branch_misses.read()
    }

    pub fn close(self) {}
}
