use crate::{Message, Options, Processor, error::BoxError};

/// A processor built from an async closure; see [`processor_fn`].
pub struct ClosureProcessor<F> {
    f: F,
}

/// Wrap an async closure as a [`Processor`] without lifecycle hooks.
///
/// The closure receives an owned copy of each message.
///
/// ```rust
/// use hopper::processor_fn;
///
/// let processor = processor_fn(|message| async move {
///     println!("got {} bytes", message.body.len());
///     Ok::<_, hopper::BoxError>(true)
/// });
/// ```
pub fn processor_fn<F, Fut>(f: F) -> ClosureProcessor<F>
where
    F: FnMut(Message) -> Fut + Send,
    Fut: Future<Output = Result<bool, BoxError>> + Send,
{
    ClosureProcessor { f }
}

impl<F, Fut> Processor for ClosureProcessor<F>
where
    F: FnMut(Message) -> Fut + Send,
    Fut: Future<Output = Result<bool, BoxError>> + Send,
{
    fn process(
        &mut self,
        message: &Message,
        _options: &Options,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send {
        (self.f)(message.clone())
    }
}
