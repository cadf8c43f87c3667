use std::sync::Arc;

use serde_json::{Value, json};
use sysinfo::{Pid, System};

use super::{configure_inner, initialize_inner, sleep_inner, terminate_inner};
use crate::{
    Capabilities, Message, Processor,
    error::BoxError,
    logger::{Logger, null_logger},
    options::{OptionType, Options, OptionsResolver},
};

/// Option: memory ceiling in megabytes, `null` to disable.
pub const MEMORY_LIMIT: &str = "memory_limit";

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Reports how much memory the current process uses.
pub trait MemoryProbe: Send {
    fn used_bytes(&mut self) -> u64;
}

impl<F> MemoryProbe for F
where
    F: FnMut() -> u64 + Send,
{
    fn used_bytes(&mut self) -> u64 {
        self()
    }
}

/// Resident memory of the current process, read through `sysinfo`.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    /// Probe the current process
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn used_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system.refresh_process(pid);
        self.system
            .process(pid)
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

/// Stops consumption once the process memory reaches the `memory_limit` option.
///
/// The wrapped processor always handles the message first; the limit is checked
/// afterwards, whatever the wrapped processor returned.
///
/// ```rust
/// use hopper::{MemoryLimitProcessor, processor_fn};
///
/// let processor = MemoryLimitProcessor::new(processor_fn(|_message| async {
///     Ok::<_, hopper::BoxError>(true)
/// }));
/// ```
pub struct MemoryLimitProcessor<P, M = ProcessMemory> {
    inner: P,
    probe: M,
    logger: Arc<dyn Logger>,
}

impl<P> MemoryLimitProcessor<P> {
    /// Wrap `inner`, probing the memory of the current process
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            probe: ProcessMemory::new(),
            logger: null_logger(),
        }
    }
}

impl<P, M> MemoryLimitProcessor<P, M> {
    /// Measure memory with a different probe (builder pattern)
    pub fn with_probe<N: MemoryProbe>(self, probe: N) -> MemoryLimitProcessor<P, N> {
        MemoryLimitProcessor {
            inner: self.inner,
            probe,
            logger: self.logger,
        }
    }

    /// Set the logger (builder pattern)
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// The wrapped processor
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Unwrap, returning the wrapped processor
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P, M> Processor for MemoryLimitProcessor<P, M>
where
    P: Processor,
    M: MemoryProbe,
{
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        let processed = self.inner.process(message, options).await?;

        if let Some(limit) = options.get_u64(MEMORY_LIMIT) {
            if self.probe.used_bytes() >= limit.saturating_mul(BYTES_PER_MEGABYTE) {
                self.logger.info(
                    "[MemoryLimit] Memory limit has been reached",
                    &[
                        (MEMORY_LIMIT, json!(limit)),
                        ("processor", json!("memory_limit")),
                    ],
                );
                return Ok(false);
            }
        }

        Ok(processed)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities() | Capabilities::CONFIGURE
    }

    fn configure(&self, resolver: &mut OptionsResolver) {
        configure_inner(&self.inner, resolver);
        resolver
            .set_default(MEMORY_LIMIT, Value::Null)
            .set_allowed_types(MEMORY_LIMIT, &[OptionType::Null, OptionType::UnsignedInteger]);
    }

    async fn initialize(&mut self, options: &Options) -> Result<(), BoxError> {
        initialize_inner(&mut self.inner, options).await
    }

    async fn sleep(&mut self, options: &Options) -> Result<bool, BoxError> {
        sleep_inner(&mut self.inner, options).await
    }

    async fn terminate(&mut self, options: &Options) -> Result<(), BoxError> {
        terminate_inner(&mut self.inner, options).await
    }
}
