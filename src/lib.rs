//! # Hopper
//!
//! A queue consumer for Rust that pulls messages from any queue-like source and runs them
//! through a chain of composable processors, managing the processor lifecycle along the way.
//!
//! ## Features
//!
//! - **Generic Design**: Works with any queue system by implementing the [`MessageProvider`] trait
//! - **Two Delivery Modes**: Push (blocking subscription) or pull (non-blocking fetch with polling)
//! - **Lifecycle Hooks**: Processors opt into `configure`, `initialize`, `sleep` and `terminate`
//! - **Composable Policies**: Decorators such as [`MemoryLimitProcessor`] and [`MaxMessagesProcessor`] wrap any processor
//! - **Validated Options**: Every run resolves its options against a declared schema
//! - **Graceful Shutdown**: Processors stop a run by returning `false`, callers by cancelling a token
//! - **Structured Logging**: Pluggable [`Logger`], with a [`TracingLogger`] bridge to `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use hopper::{
//!     BoxError, Consumer, InMemoryProvider, MaxMessagesProcessor, MemoryLimitProcessor, Message,
//!     Options, Overrides, Processor,
//! };
//!
//! // 1. Implement Processor for your business logic
//! struct Printer;
//!
//! impl Processor for Printer {
//!     async fn process(
//!         &mut self,
//!         message: &Message,
//!         _options: &Options,
//!     ) -> Result<bool, BoxError> {
//!         println!("Processing: {}", message.body_lossy());
//!         Ok(true)
//!     }
//! }
//!
//! # async fn example() -> Result<(), hopper::ConsumerError> {
//! // 2. Pick a provider; implement MessageProvider for real queue systems
//! let provider = InMemoryProvider::new("orders");
//! provider.publish(Message::new("hello"));
//!
//! // 3. Wrap the processor with the policies you need
//! let processor = MemoryLimitProcessor::new(MaxMessagesProcessor::new(Printer));
//!
//! // 4. Consume until a policy asks to stop
//! let mut consumer = Consumer::new(provider, processor);
//! consumer
//!     .consume(
//!         Overrides::new()
//!             .with("method", "get")
//!             .with("max_messages", 1)
//!             .with("memory_limit", 512),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`MessageProvider`]**: Defines how messages are received from your queue system
//! - **[`Processor`]**: Defines how individual messages are handled, plus optional hooks
//! - **[`Consumer`]**: Resolves options and drives the processor from the provider
//!
//! ### How a run works
//!
//! 1. The built-in options (`poll_interval`, `queue`, `method`) are declared, then every
//!    processor in the chain declares its own
//! 2. The caller's [`Overrides`] are resolved into an immutable [`Options`] value
//! 3. `initialize` runs
//! 4. Messages are delivered by subscription (`method = consume`) or polling (`method = get`)
//! 5. The run stops when `process` or `sleep` returns `false`, a fault occurs, or the
//!    shutdown token is cancelled
//! 6. `terminate` runs
//!
//! ## Examples
//!
//! See the `demos/` directory for a complete worker wired to `tracing-subscriber`.

mod consumer;
mod error;
mod logger;
mod message;
mod message_provider;
mod options;
mod processor;

pub use consumer::Consumer;
pub use error::{BoxError, ConfigError, ConsumerError, Stage};
pub use logger::{LogContext, Logger, NullLogger, TracingLogger, null_logger};
pub use message::Message;
pub use message_provider::{InMemoryProvider, MessageHandler, MessageProvider};
pub use options::{
    ConsumeMethod, DEFAULT_POLL_INTERVAL_MICROS, METHOD, OptionType, Options, OptionsResolver,
    Overrides, POLL_INTERVAL, QUEUE,
};
pub use processor::{
    Capabilities, ClosureProcessor, INSTANT_RETRY_ATTEMPTS, INSTANT_RETRY_DELAY,
    InstantRetryProcessor, MAX_EXECUTION_TIME, MAX_MESSAGES, MEMORY_LIMIT,
    MaxExecutionTimeProcessor, MaxMessagesProcessor, MemoryLimitProcessor, MemoryProbe,
    ProcessMemory, Processor, processor_fn,
};
