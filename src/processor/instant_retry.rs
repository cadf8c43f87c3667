use std::{sync::Arc, time::Duration};

use serde_json::json;

use super::{configure_inner, initialize_inner, sleep_inner, terminate_inner};
use crate::{
    Capabilities, Message, Processor,
    error::BoxError,
    logger::{Logger, null_logger},
    options::{OptionType, Options, OptionsResolver},
};

/// Option: total number of attempts per message.
pub const INSTANT_RETRY_ATTEMPTS: &str = "instant_retry_attempts";
/// Option: pause between two attempts, in microseconds.
pub const INSTANT_RETRY_DELAY: &str = "instant_retry_delay";

const DEFAULT_ATTEMPTS: u64 = 3;
const DEFAULT_DELAY_MICROS: u64 = 2_000_000;

/// Retries a message in place when the wrapped processor fails.
///
/// Only faults are retried; a stop request is returned as is. When every attempt fails
/// the last error propagates.
pub struct InstantRetryProcessor<P> {
    inner: P,
    logger: Arc<dyn Logger>,
}

impl<P> InstantRetryProcessor<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            logger: null_logger(),
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

impl<P: Processor> Processor for InstantRetryProcessor<P> {
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        let attempts = options
            .get_u64(INSTANT_RETRY_ATTEMPTS)
            .unwrap_or(DEFAULT_ATTEMPTS)
            .max(1);
        let delay_us = options
            .get_u64(INSTANT_RETRY_DELAY)
            .unwrap_or(DEFAULT_DELAY_MICROS);

        let mut attempt = 1;
        loop {
            match self.inner.process(message, options).await {
                Ok(processed) => return Ok(processed),
                Err(error) if attempt < attempts => {
                    self.logger.warn(
                        "[InstantRetry] An error occurred, retrying message",
                        &[
                            ("error", json!(error.to_string())),
                            ("attempt", json!(attempt)),
                            ("delay_us", json!(delay_us)),
                            ("processor", json!("instant_retry")),
                        ],
                    );
                    tokio::time::sleep(Duration::from_micros(delay_us)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities() | Capabilities::CONFIGURE
    }

    fn configure(&self, resolver: &mut OptionsResolver) {
        configure_inner(&self.inner, resolver);
        resolver
            .set_default(INSTANT_RETRY_ATTEMPTS, DEFAULT_ATTEMPTS)
            .set_default(INSTANT_RETRY_DELAY, DEFAULT_DELAY_MICROS)
            .set_allowed_types(INSTANT_RETRY_ATTEMPTS, &[OptionType::UnsignedInteger])
            .set_allowed_types(INSTANT_RETRY_DELAY, &[OptionType::UnsignedInteger]);
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
