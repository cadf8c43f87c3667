use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use tokio::time::Instant;

use super::{configure_inner, initialize_inner, sleep_inner, terminate_inner};
use crate::{
    Capabilities, Message, Processor,
    error::BoxError,
    logger::{Logger, null_logger},
    options::{OptionType, Options, OptionsResolver},
};

/// Option: how long a run may last, in seconds, `null` for no limit.
pub const MAX_EXECUTION_TIME: &str = "max_execution_time";

/// Stops consumption once a run has lasted `max_execution_time` seconds.
///
/// The clock starts in `initialize`. The limit is checked after every message and on
/// every `sleep`, so an idle consumer in pull mode also stops on time.
pub struct MaxExecutionTimeProcessor<P> {
    inner: P,
    started_at: Option<Instant>,
    logger: Arc<dyn Logger>,
}

impl<P> MaxExecutionTimeProcessor<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            started_at: None,
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

    fn time_exceeded(&mut self, options: &Options) -> bool {
        let Some(max) = options.get_u64(MAX_EXECUTION_TIME) else {
            return false;
        };
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        if started_at.elapsed() < Duration::from_secs(max) {
            return false;
        }

        self.logger.info(
            "[MaxExecutionTime] Max execution time has been reached",
            &[
                (MAX_EXECUTION_TIME, json!(max)),
                ("processor", json!("max_execution_time")),
            ],
        );
        true
    }
}

impl<P: Processor> Processor for MaxExecutionTimeProcessor<P> {
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        let processed = self.inner.process(message, options).await?;

        if self.time_exceeded(options) {
            return Ok(false);
        }

        Ok(processed)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
            | Capabilities::CONFIGURE
            | Capabilities::INITIALIZE
            | Capabilities::SLEEP
    }

    fn configure(&self, resolver: &mut OptionsResolver) {
        configure_inner(&self.inner, resolver);
        resolver
            .set_default(MAX_EXECUTION_TIME, Value::Null)
            .set_allowed_types(
                MAX_EXECUTION_TIME,
                &[OptionType::Null, OptionType::UnsignedInteger],
            );
    }

    async fn initialize(&mut self, options: &Options) -> Result<(), BoxError> {
        self.started_at = Some(Instant::now());
        initialize_inner(&mut self.inner, options).await
    }

    async fn sleep(&mut self, options: &Options) -> Result<bool, BoxError> {
        if self.time_exceeded(options) {
            return Ok(false);
        }
        sleep_inner(&mut self.inner, options).await
    }

    async fn terminate(&mut self, options: &Options) -> Result<(), BoxError> {
        terminate_inner(&mut self.inner, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logger::testing::RecordingLogger, options::Overrides, processor::testing::Scripted,
    };

    fn options_for<P: Processor>(processor: &P, overrides: Overrides) -> Options {
        let mut resolver = OptionsResolver::new();
        processor.configure(&mut resolver);
        resolver.resolve(&overrides).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_the_deadline() {
        let logger = Arc::new(RecordingLogger::default());
        let mut processor =
            MaxExecutionTimeProcessor::new(Scripted::always_true()).with_logger(logger.clone());
        let options = options_for(&processor, Overrides::new().with(MAX_EXECUTION_TIME, 10));
        let message = Message::new("x");

        processor.initialize(&options).await.unwrap();
        assert!(processor.process(&message, &options).await.unwrap());
        assert!(processor.sleep(&options).await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(!processor.process(&message, &options).await.unwrap());
        assert!(!processor.sleep(&options).await.unwrap());
        assert_eq!(logger.records().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_forwards_to_inner_before_the_deadline() {
        let mut processor = MaxExecutionTimeProcessor::new(
            Scripted::always_true().with_capabilities(Capabilities::SLEEP),
        );
        let options = options_for(&processor, Overrides::new().with(MAX_EXECUTION_TIME, 5));

        processor.initialize(&options).await.unwrap();
        assert!(processor.sleep(&options).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!processor.sleep(&options).await.unwrap());

        assert_eq!(processor.inner().count("sleep"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_limit_by_default() {
        let mut processor = MaxExecutionTimeProcessor::new(Scripted::always_true());
        let options = options_for(&processor, Overrides::new());

        processor.initialize(&options).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;

        assert!(processor.process(&Message::new("x"), &options).await.unwrap());
        assert!(processor.sleep(&options).await.unwrap());
    }
}
