//! Shattering — splitting an oversized unit into ordered pieces.

use crate::chunk::Chunk;

pub trait ShatterPolicy: Send + Sync {
    /// Split `unit` into ordered pieces. Empty input yields no pieces.
    fn shatter(&self, unit: &str) -> Vec<String>;
}

/// Splits on paragraph breaks, falling back to a hard character cap when a
/// paragraph is longer than `max_chars`.
#[derive(Clone, Copy, Debug)]
pub struct ParagraphShatter {
    max_chars: usize,
}

impl ParagraphShatter {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

impl ShatterPolicy for ParagraphShatter {
    fn shatter(&self, unit: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut rest = unit;

        while !rest.is_empty() {
            if rest.chars().count() <= self.max_chars {
                pieces.push(rest.to_string());
                break;
            }

            // A break may start right at the cap, so look two characters past it.
            let cut = byte_index_of_char(rest, self.max_chars);
            let lookahead = byte_index_of_char(rest, self.max_chars + 2);
            let boundary = rest[..lookahead]
                .match_indices("\n\n")
                .map(|(at, _)| at)
                .filter(|&at| at > 0 && at <= cut)
                .last();
            let (piece, remaining) = match boundary {
                // Drop the break itself; the piece boundary stands in for it.
                Some(at) => (&rest[..at], &rest[at + 2..]),
                None => (&rest[..cut], &rest[cut..]),
            };
            pieces.push(piece.to_string());
            rest = remaining;
        }

        pieces
    }
}

/// Shatter a chunk entry, rebuilding each piece as the same variant.
pub fn shatter_chunk<C: Chunk>(policy: &dyn ShatterPolicy, chunk: &C) -> Vec<C> {
    policy
        .shatter(chunk.content())
        .into_iter()
        .map(|piece| chunk.with_content(piece))
        .collect()
}

/// Byte offset of the `n`th character, or the string length if shorter.
pub(crate) fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
