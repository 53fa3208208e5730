//! A piece of streamed text carried by an entry.

/// An entry (or plain string) holding a piece of streamed text.
///
/// `with_content` rebuilds the same variant around different text, which is
/// how aggregators carry a split remainder forward without knowing the family.
pub trait Chunk: Clone + Send + Sync {
    fn content(&self) -> &str;

    fn with_content(&self, content: String) -> Self;

    /// Length in characters, not bytes.
    fn char_len(&self) -> usize {
        self.content().chars().count()
    }
}

impl Chunk for String {
    fn content(&self) -> &str {
        self
    }

    fn with_content(&self, content: String) -> Self {
        content
    }
}
