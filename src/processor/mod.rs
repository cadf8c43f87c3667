//! This module provides the trait implemented by message handlers, and the decorators
//! that wrap a handler with cross-cutting policies.

use std::ops::{BitOr, BitOrAssign};

use crate::{
    Message,
    error::BoxError,
    options::{Options, OptionsResolver},
};

mod closure;
mod instant_retry;
mod max_execution_time;
mod max_messages;
mod memory_limit;

pub use closure::{ClosureProcessor, processor_fn};
pub use instant_retry::{INSTANT_RETRY_ATTEMPTS, INSTANT_RETRY_DELAY, InstantRetryProcessor};
pub use max_execution_time::{MAX_EXECUTION_TIME, MaxExecutionTimeProcessor};
pub use max_messages::{MAX_MESSAGES, MaxMessagesProcessor};
pub use memory_limit::{MEMORY_LIMIT, MemoryLimitProcessor, MemoryProbe, ProcessMemory};

/// The optional lifecycle hooks a processor takes part in.
///
/// The consumer only calls a hook when the matching flag is advertised by
/// [`Processor::capabilities`]; overriding a hook without advertising it has no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// [`Processor::configure`] contributes options before resolution.
    pub const CONFIGURE: Self = Self(1);
    /// [`Processor::initialize`] runs before the first message.
    pub const INITIALIZE: Self = Self(1 << 1);
    /// [`Processor::sleep`] runs after each message (push) or each polling round (pull).
    pub const SLEEP: Self = Self(1 << 2);
    /// [`Processor::terminate`] runs once consumption is over.
    pub const TERMINATE: Self = Self(1 << 3);

    /// Whether every flag of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Both sets of flags
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// A trait for message processors that defines how to handle individual messages.
///
/// Only [`process`](Self::process) is mandatory. The other hooks are opt-in: advertise
/// them through [`capabilities`](Self::capabilities) and override the matching method.
///
/// Returning `Ok(false)` from `process` or `sleep` asks the consumer to stop gracefully
/// once the current message is done. Returning an error is a fault and ends the run
/// with that error.
///
/// # Examples
///
/// ```rust
/// use hopper::{BoxError, Capabilities, Message, Options, OptionsResolver, Processor};
///
/// struct Printer {
///     seen: u64,
/// }
///
/// impl Processor for Printer {
///     async fn process(
///         &mut self,
///         message: &Message,
///         _options: &Options,
///     ) -> Result<bool, BoxError> {
///         self.seen += 1;
///         println!("processing {}", message.body_lossy());
///         Ok(true)
///     }
///
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::CONFIGURE | Capabilities::TERMINATE
///     }
///
///     fn configure(&self, resolver: &mut OptionsResolver) {
///         resolver.set_default("verbose", false);
///     }
///
///     async fn terminate(&mut self, _options: &Options) -> Result<(), BoxError> {
///         println!("processed {} messages", self.seen);
///         Ok(())
///     }
/// }
/// ```
pub trait Processor: Send {
    /// Handle one message; `Ok(false)` requests that consumption stop.
    fn process(
        &mut self,
        message: &Message,
        options: &Options,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// The optional hooks this processor (and anything it wraps) takes part in.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Declare the options this processor recognizes. Called before every run.
    fn configure(&self, _resolver: &mut OptionsResolver) {}

    /// Called once per run, after option resolution and before the first message.
    fn initialize(
        &mut self,
        _options: &Options,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }

    /// Throttling hook; `Ok(false)` requests that consumption stop.
    fn sleep(&mut self, _options: &Options) -> impl Future<Output = Result<bool, BoxError>> + Send {
        async { Ok(true) }
    }

    /// Called once per run after the consumption loop exits.
    fn terminate(
        &mut self,
        _options: &Options,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }
}

// Decorators forward hooks through these so an inner processor is only called for the
// hooks it advertises.

pub(crate) fn configure_inner<P: Processor>(inner: &P, resolver: &mut OptionsResolver) {
    if inner.capabilities().contains(Capabilities::CONFIGURE) {
        inner.configure(resolver);
    }
}

pub(crate) async fn initialize_inner<P: Processor>(
    inner: &mut P,
    options: &Options,
) -> Result<(), BoxError> {
    if inner.capabilities().contains(Capabilities::INITIALIZE) {
        inner.initialize(options).await?;
    }
    Ok(())
}

pub(crate) async fn sleep_inner<P: Processor>(
    inner: &mut P,
    options: &Options,
) -> Result<bool, BoxError> {
    if inner.capabilities().contains(Capabilities::SLEEP) {
        return inner.sleep(options).await;
    }
    Ok(true)
}

pub(crate) async fn terminate_inner<P: Processor>(
    inner: &mut P,
    options: &Options,
) -> Result<(), BoxError> {
    if inner.capabilities().contains(Capabilities::TERMINATE) {
        inner.terminate(options).await?;
    }
    Ok(())
}
