use std::sync::Arc;

use serde_json::{Value, json};

use super::{configure_inner, initialize_inner, sleep_inner, terminate_inner};
use crate::{
    Capabilities, Message, Processor,
    error::BoxError,
    logger::{Logger, null_logger},
    options::{OptionType, Options, OptionsResolver},
};

/// Option: number of messages after which a run stops, `null` for no limit.
pub const MAX_MESSAGES: &str = "max_messages";

/// Stops consumption after `max_messages` messages have been processed in a run.
pub struct MaxMessagesProcessor<P> {
    inner: P,
    processed: u64,
    logger: Arc<dyn Logger>,
}

impl<P> MaxMessagesProcessor<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            processed: 0,
            logger: null_logger(),
        }
    }

    /// Set the logger (builder pattern)
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Messages processed since the run started.
    pub fn processed(&self) -> u64 {
        self.processed
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

impl<P: Processor> Processor for MaxMessagesProcessor<P> {
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        let processed = self.inner.process(message, options).await?;
        self.processed += 1;

        if let Some(max) = options.get_u64(MAX_MESSAGES) {
            if self.processed >= max {
                self.logger.info(
                    "[MaxMessages] Max messages have been reached",
                    &[
                        (MAX_MESSAGES, json!(max)),
                        ("processor", json!("max_messages")),
                    ],
                );
                return Ok(false);
            }
        }

        Ok(processed)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities() | Capabilities::CONFIGURE | Capabilities::INITIALIZE
    }

    fn configure(&self, resolver: &mut OptionsResolver) {
        configure_inner(&self.inner, resolver);
        resolver
            .set_default(MAX_MESSAGES, Value::Null)
            .set_allowed_types(MAX_MESSAGES, &[OptionType::Null, OptionType::UnsignedInteger]);
    }

    async fn initialize(&mut self, options: &Options) -> Result<(), BoxError> {
        self.processed = 0;
        initialize_inner(&mut self.inner, options).await
    }

    async fn sleep(&mut self, options: &Options) -> Result<bool, BoxError> {
        sleep_inner(&mut self.inner, options).await
    }

    async fn terminate(&mut self, options: &Options) -> Result<(), BoxError> {
        terminate_inner(&mut self.inner, options).await
    }
}
