//! The unit of work flowing through the processors.

use std::collections::BTreeMap;

/// A message delivered by a [`MessageProvider`](crate::MessageProvider).
///
/// The body is opaque to the consumer; properties carry whatever metadata the provider
/// attaches (delivery tag, correlation id, headers...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Raw message body
    pub body: Vec<u8>,
    /// Provider-defined metadata
    pub properties: BTreeMap<String, String>,
    /// Provider-assigned identifier, if any
    pub id: Option<String>,
}

impl Message {
    /// Create a new message with the given body
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Set the message id (builder pattern)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a property (builder pattern)
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The value of a property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The body as UTF-8, with invalid sequences replaced.
    pub fn body_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_id_and_properties() {
        let message = Message::new("hello")
            .with_id("42")
            .with_property("delivery_tag", "7");

        assert_eq!(message.body, b"hello");
        assert_eq!(message.id.as_deref(), Some("42"));
        assert_eq!(message.property("delivery_tag"), Some("7"));
        assert_eq!(message.property("missing"), None);
        assert_eq!(message.body_lossy(), "hello");
    }
}
