use std::{sync::Arc, time::Duration};

use anyhow::Context;
use hopper::{
    BoxError, Consumer, InMemoryProvider, InstantRetryProcessor, MaxExecutionTimeProcessor,
    MaxMessagesProcessor, MemoryLimitProcessor, Message, Options, Overrides, Processor,
    TracingLogger,
};
use tracing_subscriber::EnvFilter;

pub struct OrderProcessor;

impl Processor for OrderProcessor {
    async fn process(&mut self, message: &Message, options: &Options) -> Result<bool, BoxError> {
        let body = message.body_lossy();
        if body.is_empty() {
            return Err("empty order".into());
        }

        println!("Processing order {:?} from {}", body, options.queue());
        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(true)
    }
}

fn env_u64(key: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value.parse().with_context(|| format!("{key} is not a number"))?)),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .init();

    let queue = std::env::var("HOPPER_QUEUE").unwrap_or_else(|_| "orders".to_string());
    let method = std::env::var("HOPPER_METHOD").unwrap_or_else(|_| "consume".to_string());
    let seed = env_u64("HOPPER_SEED_MESSAGES")?.unwrap_or(10);

    let provider = InMemoryProvider::new(queue);
    for i in 0..seed {
        provider.publish(Message::new(format!("order-{i}")).with_property("seq", i.to_string()));
    }

    // keeps the queue busy until the consumer stops
    let publisher = provider.publisher();
    tokio::spawn(async move {
        let mut i = seed;
        while publisher.send(Message::new(format!("order-{i}"))).is_ok() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            i += 1;
        }
    });

    let logger = Arc::new(TracingLogger);
    let processor = InstantRetryProcessor::new(OrderProcessor).with_logger(logger.clone());
    let processor = MaxMessagesProcessor::new(processor).with_logger(logger.clone());
    let processor = MaxExecutionTimeProcessor::new(processor).with_logger(logger.clone());
    let processor = MemoryLimitProcessor::new(processor).with_logger(logger.clone());

    let mut consumer = Consumer::new(provider, processor).with_logger(logger);

    tracing::info!("initialized in-memory worker");

    let shutdown = consumer.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, stopping");
            shutdown.cancel();
        }
    });

    let mut overrides = Overrides::new()
        .with("method", method)
        .with("instant_retry_delay", 250_000);
    for (option, key) in [
        ("memory_limit", "HOPPER_MEMORY_LIMIT"),
        ("max_messages", "HOPPER_MAX_MESSAGES"),
        ("max_execution_time", "HOPPER_MAX_EXECUTION_TIME"),
    ] {
        if let Some(value) = env_u64(key)? {
            overrides.insert(option, value);
        }
    }

    consumer.consume(overrides).await?;

    println!("done");

    Ok(())
}
