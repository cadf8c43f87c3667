//! This module contains the consumer that drives a processor from a message provider.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    Capabilities, Message, MessageHandler, MessageProvider, Processor,
    error::{ConfigError, ConsumerError, Stage},
    logger::{Logger, null_logger},
    options::{
        ConsumeMethod, DEFAULT_POLL_INTERVAL_MICROS, METHOD, OptionType, Options,
        OptionsResolver, Overrides, POLL_INTERVAL, QUEUE,
    },
};

/// Pulls messages from a [`MessageProvider`] and runs them through a [`Processor`].
///
/// Each call to [`consume`](Self::consume) is one run: options are resolved, the
/// processor's lifecycle hooks are invoked, and messages are processed until the
/// processor asks to stop or the shutdown token is cancelled.
///
/// # Type Parameters
///
/// * `M` - The message provider type that implements [`MessageProvider`]
/// * `P` - The root processor type that implements [`Processor`]
///
/// # Examples
///
/// ```rust
/// use hopper::{
///     Consumer, InMemoryProvider, MaxMessagesProcessor, Message, Overrides, processor_fn,
/// };
///
/// # async fn example() -> Result<(), hopper::ConsumerError> {
/// let provider = InMemoryProvider::new("orders");
/// provider.publish(Message::new("first"));
/// provider.publish(Message::new("second"));
///
/// let processor = MaxMessagesProcessor::new(processor_fn(|message| async move {
///     println!("{}", message.body_lossy());
///     Ok::<_, hopper::BoxError>(true)
/// }));
///
/// let mut consumer = Consumer::new(provider, processor);
/// consumer
///     .consume(Overrides::new().with("max_messages", 2))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Consumer<M, P> {
    message_provider: M,
    processor: P,
    options_resolver: OptionsResolver,
    logger: Arc<dyn Logger>,
    shutdown: CancellationToken,
}

impl<M, P> Consumer<M, P> {
    /// Create a new consumer with a no-op logger and a fresh shutdown token
    pub fn new(message_provider: M, processor: P) -> Self {
        Self {
            message_provider,
            processor,
            options_resolver: OptionsResolver::new(),
            logger: null_logger(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the logger (builder pattern)
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the base options resolver (builder pattern)
    ///
    /// Options declared here are recognized by every run, next to the built-in ones.
    pub fn with_options_resolver(mut self, options_resolver: OptionsResolver) -> Self {
        self.options_resolver = options_resolver;
        self
    }

    /// Set the shutdown token (builder pattern)
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// A handle that stops the current run, and any later one, when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The provider messages are read from
    pub fn message_provider(&self) -> &M {
        &self.message_provider
    }

    /// Replace the provider; takes effect on the next run
    pub fn set_message_provider(&mut self, message_provider: M) -> &mut Self {
        self.message_provider = message_provider;
        self
    }

    /// The root processor
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Mutable access to the root processor between runs
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Replace the root processor; takes effect on the next run
    pub fn set_processor(&mut self, processor: P) -> &mut Self {
        self.processor = processor;
        self
    }

    /// The base resolver, without the built-in or processor options
    pub fn options_resolver(&self) -> &OptionsResolver {
        &self.options_resolver
    }

    /// Replace the base resolver
    pub fn set_options_resolver(&mut self, options_resolver: OptionsResolver) -> &mut Self {
        self.options_resolver = options_resolver;
        self
    }

    /// Consume the consumer, returning its provider and processor
    pub fn into_parts(self) -> (M, P) {
        (self.message_provider, self.processor)
    }
}

impl<M, P> Consumer<M, P>
where
    M: MessageProvider + Sync,
    P: Processor,
{
    /// Consume the queue until the processor asks to stop.
    ///
    /// Fails before touching any message when `overrides` cannot be resolved, and
    /// without processing anything when `initialize` fails. Otherwise `terminate` runs
    /// once the loop is over, even when the loop ended with a fault; that fault is then
    /// returned.
    #[tracing::instrument(skip_all, fields(queue = self.message_provider.queue_name()))]
    pub async fn consume(&mut self, overrides: Overrides) -> Result<(), ConsumerError> {
        self.logger.debug(
            "Start consuming queue.",
            &[("queue", json!(self.message_provider.queue_name()))],
        );

        let options = self.resolve_options(&overrides)?;

        if self.capable(Capabilities::INITIALIZE) {
            self.processor
                .initialize(&options)
                .await
                .map_err(|e| ConsumerError::processor(Stage::Initialize, e))?;
        }

        let run = self.shutdown.child_token();
        let outcome = match options.method() {
            ConsumeMethod::Consume => self.run_push(&options, run).await,
            ConsumeMethod::Get => self.run_pull(&options, run).await,
        };

        let terminated = if self.capable(Capabilities::TERMINATE) {
            self.processor
                .terminate(&options)
                .await
                .map_err(|e| ConsumerError::processor(Stage::Terminate, e))
        } else {
            Ok(())
        };

        self.logger.debug(
            "Stop consuming queue.",
            &[("queue", json!(options.queue()))],
        );

        match (outcome, terminated) {
            (Err(fault), Err(terminate_fault)) => {
                self.logger.warn(
                    "Terminate failed after consumption error.",
                    &[("error", json!(terminate_fault.to_string()))],
                );
                Err(fault)
            }
            (outcome, terminated) => outcome.and(terminated),
        }
    }

    /// Build the schema for this run (base resolver, built-ins, processor options) and
    /// resolve `overrides` against it.
    fn resolve_options(&self, overrides: &Overrides) -> Result<Options, ConfigError> {
        let mut resolver = self.options_resolver.clone();
        resolver
            .set_default(POLL_INTERVAL, DEFAULT_POLL_INTERVAL_MICROS)
            .set_default(QUEUE, self.message_provider.queue_name())
            .set_default(METHOD, ConsumeMethod::Consume)
            .set_allowed_types(POLL_INTERVAL, &[OptionType::UnsignedInteger])
            .set_allowed_types(QUEUE, &[OptionType::String])
            .set_allowed_values(METHOD, [ConsumeMethod::Consume, ConsumeMethod::Get]);

        if self.capable(Capabilities::CONFIGURE) {
            self.processor.configure(&mut resolver);
        }

        resolver.resolve(overrides)
    }

    fn capable(&self, capability: Capabilities) -> bool {
        self.processor.capabilities().contains(capability)
    }

    /// Push mode: subscribe through the provider until the handler cancels `run`.
    async fn run_push(
        &mut self,
        options: &Options,
        run: CancellationToken,
    ) -> Result<(), ConsumerError> {
        let consumer_tag = Uuid::new_v4().to_string();
        tracing::debug!(consumer_tag = %consumer_tag, "subscribing");

        let mut handler = PushHandler {
            processor: &mut self.processor,
            options,
            run: run.clone(),
            fault: None,
        };

        let subscribed = self
            .message_provider
            .consume(&consumer_tag, &mut handler, run)
            .await;

        if let Some(fault) = handler.fault {
            return Err(fault);
        }
        subscribed.map_err(|e| ConsumerError::Provider(e.into()))
    }

    /// Pull mode: drain the queue, sleep, pause, repeat.
    async fn run_pull(
        &mut self,
        options: &Options,
        run: CancellationToken,
    ) -> Result<(), ConsumerError> {
        loop {
            loop {
                if run.is_cancelled() {
                    return Ok(());
                }

                let Some(message) = self
                    .message_provider
                    .get()
                    .await
                    .map_err(|e| ConsumerError::Provider(e.into()))?
                else {
                    break;
                };

                let keep_going = self
                    .processor
                    .process(&message, options)
                    .await
                    .map_err(|e| ConsumerError::processor(Stage::Process, e))?;

                if !keep_going {
                    return Ok(());
                }
            }

            if self.capable(Capabilities::SLEEP) {
                let keep_going = self
                    .processor
                    .sleep(options)
                    .await
                    .map_err(|e| ConsumerError::processor(Stage::Sleep, e))?;

                if !keep_going {
                    return Ok(());
                }
            }

            tokio::select! {
                _ = run.cancelled() => return Ok(()),
                _ = tokio::time::sleep(options.poll_interval()) => {}
            }
        }
    }
}

/// The per-message callback handed to the provider in push mode.
///
/// A stop request or a fault cancels the run token, which ends the subscription; the
/// fault is kept so the consumer can return it.
struct PushHandler<'a, P> {
    processor: &'a mut P,
    options: &'a Options,
    run: CancellationToken,
    fault: Option<ConsumerError>,
}

impl<P: Processor> PushHandler<'_, P> {
    async fn step(&mut self, message: &Message) -> Result<bool, ConsumerError> {
        let keep_going = self
            .processor
            .process(message, self.options)
            .await
            .map_err(|e| ConsumerError::processor(Stage::Process, e))?;

        if !keep_going {
            return Ok(false);
        }

        if self.processor.capabilities().contains(Capabilities::SLEEP) {
            return self
                .processor
                .sleep(self.options)
                .await
                .map_err(|e| ConsumerError::processor(Stage::Sleep, e));
        }

        Ok(true)
    }
}

impl<P: Processor> MessageHandler for PushHandler<'_, P> {
    async fn handle(&mut self, message: Message) {
        // A provider may still hand over a message it had in flight when the run ended.
        if self.run.is_cancelled() {
            return;
        }

        match self.step(&message).await {
            Ok(true) => {}
            Ok(false) => self.run.cancel(),
            Err(fault) => {
                self.fault = Some(fault);
                self.run.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;

    use super::*;
    use crate::{
        InMemoryProvider, logger::testing::RecordingLogger, processor::testing::Scripted,
    };

    fn provider_with(count: usize) -> InMemoryProvider {
        let provider = InMemoryProvider::new("orders");
        for i in 0..count {
            provider.publish(Message::new(format!("message-{i}")));
        }
        provider
    }

    fn all_hooks() -> Capabilities {
        Capabilities::CONFIGURE
            | Capabilities::INITIALIZE
            | Capabilities::SLEEP
            | Capabilities::TERMINATE
    }

    #[test]
    fn queue_defaults_to_provider_name_and_is_overridable() {
        let consumer = Consumer::new(provider_with(0), Scripted::always_true());

        let defaults = consumer.resolve_options(&Overrides::new()).unwrap();
        assert_eq!(defaults.queue(), "orders");
        assert_eq!(defaults.method(), ConsumeMethod::Consume);
        assert_eq!(defaults.poll_interval(), Duration::from_millis(50));

        let overridden = consumer
            .resolve_options(&Overrides::new().with(QUEUE, "invoices"))
            .unwrap();
        assert_eq!(overridden.queue(), "invoices");
    }

    #[test]
    fn configurable_processor_contributes_defaults() {
        let consumer = Consumer::new(
            provider_with(0),
            Scripted::always_true().with_capabilities(Capabilities::CONFIGURE),
        );

        let options = consumer.resolve_options(&Overrides::new()).unwrap();

        assert_eq!(options.get("scripted"), Some(&Value::Bool(true)));
    }

    #[test]
    fn base_resolver_options_are_recognized() {
        let mut base = OptionsResolver::new();
        base.set_default("tenant", "acme");
        let consumer =
            Consumer::new(provider_with(0), Scripted::always_true()).with_options_resolver(base);

        let options = consumer
            .resolve_options(&Overrides::new().with("tenant", "globex"))
            .unwrap();

        assert_eq!(options.get_str("tenant"), Some("globex"));
        assert!(consumer.options_resolver().is_defined("tenant"));
        assert!(!consumer.options_resolver().is_defined(QUEUE));
    }

    #[tokio::test]
    async fn configuration_error_touches_nothing() {
        let mut consumer = Consumer::new(
            provider_with(1),
            Scripted::always_true().with_capabilities(all_hooks()),
        );

        let err = consumer
            .consume(Overrides::new().with(METHOD, "stream"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConsumerError::Config(ConfigError::InvalidValue { .. })));
        assert!(consumer.processor().calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pull_mode_stops_on_first_false() {
        let mut consumer = Consumer::new(
            provider_with(6),
            Scripted::with_results([Ok(true), Ok(true), Ok(true), Ok(false)])
                .with_capabilities(Capabilities::TERMINATE),
        );

        consumer
            .consume(Overrides::new().with(METHOD, "get"))
            .await
            .unwrap();

        assert_eq!(
            consumer.processor().calls,
            vec!["process", "process", "process", "process", "terminate"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pull_mode_stop_skips_sleep_for_the_round() {
        let mut consumer = Consumer::new(
            provider_with(3),
            Scripted::with_results([Ok(true), Ok(false)]).with_capabilities(all_hooks()),
        );

        consumer
            .consume(Overrides::new().with(METHOD, "get"))
            .await
            .unwrap();

        assert_eq!(
            consumer.processor().calls,
            vec!["initialize", "process", "process", "terminate"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pull_mode_shutdown_ends_idle_polling() {
        let mut consumer = Consumer::new(
            provider_with(2),
            Scripted::always_true().with_capabilities(Capabilities::TERMINATE),
        );
        let shutdown = consumer.shutdown_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.cancel();
        });

        consumer
            .consume(Overrides::new().with(METHOD, "get"))
            .await
            .unwrap();

        assert_eq!(consumer.processor().count("process"), 2);
        assert_eq!(consumer.processor().count("terminate"), 1);
    }

    #[tokio::test]
    async fn push_mode_stops_on_false_and_leaves_the_rest_queued() {
        let mut consumer = Consumer::new(
            provider_with(5),
            Scripted::with_results([Ok(true), Ok(false)]).with_capabilities(all_hooks()),
        );

        consumer.consume(Overrides::new()).await.unwrap();

        assert_eq!(
            consumer.processor().calls,
            vec!["initialize", "process", "sleep", "process", "terminate"]
        );
        let remaining = consumer.message_provider().get().await.unwrap();
        assert_eq!(remaining, Some(Message::new("message-2")));
    }

    #[tokio::test]
    async fn push_mode_fault_propagates_after_terminate() {
        let mut consumer = Consumer::new(
            provider_with(3),
            Scripted::with_results([Ok(true), Err("poison message")])
                .with_capabilities(Capabilities::TERMINATE),
        );

        let err = consumer.consume(Overrides::new()).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Process));
        assert_eq!(
            err.to_string(),
            "processor failed during process: poison message"
        );
        assert_eq!(
            consumer.processor().calls,
            vec!["process", "process", "terminate"]
        );
    }

    #[tokio::test]
    async fn start_event_names_the_queue() {
        let logger = Arc::new(RecordingLogger::default());
        let mut consumer = Consumer::new(provider_with(1), Scripted::with_results([Ok(false)]))
            .with_logger(logger.clone());

        consumer.consume(Overrides::new()).await.unwrap();

        let records = logger.records();
        assert_eq!(records[0].level, tracing::Level::DEBUG);
        assert_eq!(records[0].message, "Start consuming queue.");
        assert_eq!(records[0].context, json!({"queue": "orders"}));
    }
}
