//! This module provides the traits a queue transport implements to feed the consumer.

use std::convert::Infallible;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{Message, error::BoxError};

/// Callback invoked by a provider for every message of a push subscription.
///
/// The consumer supplies the handler; providers only need to await it.
pub trait MessageHandler: Send {
    fn handle(&mut self, message: Message) -> impl Future<Output = ()> + Send;
}

/// A trait for message sources the consumer can read from.
///
/// Implement this trait to integrate your queue system (AMQP, SQS, Redis, etc.).
/// Two delivery styles are supported and the consumer picks one per run through the
/// `method` option: a push subscription ([`consume`](Self::consume)) and a
/// non-blocking single fetch ([`get`](Self::get)).
///
/// # Examples
///
/// ```rust
/// use std::convert::Infallible;
///
/// use hopper::{Message, MessageHandler, MessageProvider};
/// use tokio_util::sync::CancellationToken;
///
/// struct Fixed(Vec<Message>);
///
/// impl MessageProvider for Fixed {
///     type Error = Infallible;
///
///     fn queue_name(&self) -> &str {
///         "fixed"
///     }
///
///     async fn consume<H: MessageHandler>(
///         &self,
///         _consumer_tag: &str,
///         handler: &mut H,
///         shutdown: CancellationToken,
///     ) -> Result<(), Self::Error> {
///         for message in &self.0 {
///             if shutdown.is_cancelled() {
///                 break;
///             }
///             handler.handle(message.clone()).await;
///         }
///         Ok(())
///     }
///
///     async fn get(&self) -> Result<Option<Message>, Self::Error> {
///         Ok(None)
///     }
/// }
/// ```
pub trait MessageProvider {
    /// The error that can be returned by the provider
    type Error: Into<BoxError> + std::fmt::Debug + Send + Sync + 'static;

    /// Identifier of the queue this provider reads from
    fn queue_name(&self) -> &str;

    /// Subscribe to the queue and hand every delivered message to `handler`.
    ///
    /// This call blocks (asynchronously) for as long as the subscription lives. It must
    /// return once `shutdown` is cancelled, without delivering any further message, and
    /// must wait for `handler` to complete before delivering the next message.
    fn consume<H>(
        &self,
        consumer_tag: &str,
        handler: &mut H,
        shutdown: CancellationToken,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send
    where
        H: MessageHandler;

    /// Fetch the next available message without waiting, `None` when the queue is empty.
    fn get(&self) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send;
}

/// A provider backed by an in-process unbounded channel.
///
/// Messages published before or during a run are delivered in order. A push subscription
/// waits for new messages until its shutdown token is cancelled.
pub struct InMemoryProvider {
    queue_name: String,
    sender: mpsc::UnboundedSender<Message>,
    receiver: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl InMemoryProvider {
    /// Create an empty queue named `queue_name`
    pub fn new(queue_name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            queue_name: queue_name.into(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Enqueue a message.
    pub fn publish(&self, message: Message) {
        // The provider owns the receiving half, so the channel cannot be closed here.
        let _ = self.sender.send(message);
    }

    /// A handle that publishes onto this provider from elsewhere (another task, a test).
    pub fn publisher(&self) -> mpsc::UnboundedSender<Message> {
        self.sender.clone()
    }
}

impl MessageProvider for InMemoryProvider {
    type Error = Infallible;

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn consume<H>(
        &self,
        consumer_tag: &str,
        handler: &mut H,
        shutdown: CancellationToken,
    ) -> Result<(), Self::Error>
    where
        H: MessageHandler,
    {
        let mut receiver = self.receiver.lock().await;
        tracing::debug!(queue = %self.queue_name, consumer_tag, "subscription started");

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                message = receiver.recv() => message,
            };

            let Some(message) = message else {
                break;
            };

            handler.handle(message).await;
            if shutdown.is_cancelled() {
                break;
            }
        }

        tracing::debug!(queue = %self.queue_name, consumer_tag, "subscription ended");
        Ok(())
    }

    async fn get(&self) -> Result<Option<Message>, Self::Error> {
        Ok(self.receiver.lock().await.try_recv().ok())
    }
}
