//! Recursive character text splitter.
//!
//! Splits text into chunks of at most `chunk_size` characters, carrying up
//! to `chunk_overlap` characters of trailing context into the next chunk.
//!
//! # Algorithm
//!
//! 1. Pick the first separator (`\n\n`, `\n`, ` `, then the empty string)
//!    that occurs in the text.
//! 2. Split on it. Pieces shorter than `chunk_size` are buffered; longer
//!    pieces are split again with the remaining separators.
//! 3. Buffered pieces are merged greedily up to `chunk_size`. When a chunk
//!    is emitted, pieces are dropped from the front of the buffer until at
//!    most `chunk_overlap` characters remain; those start the next chunk.
//!
//! Lengths are counted in `char`s so multi-byte text never splits inside a
//! code point.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use tracing::warn;

use super::{DocumentChunk, SourceDocument};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split each document, keeping its source and page on every chunk.
    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(move |(index, text)| DocumentChunk {
                        id: chunk_id(&doc.source, doc.page, index, &text),
                        text,
                        source: doc.source.clone(),
                        page: doc.page,
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&'static str] = &[];

        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                remaining = &[];
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut buffered: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                buffered.push(piece);
                continue;
            }

            if !buffered.is_empty() {
                chunks.extend(self.merge_pieces(&buffered, separator));
                buffered.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !buffered.is_empty() {
            chunks.extend(self.merge_pieces(&buffered, separator));
        }

        chunks
    }

    fn merge_pieces(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { separator_len };

            if total + len + joined(&window) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !window.is_empty() {
                    if let Some(chunk) = join_trimmed(&window, separator) {
                        chunks.push(chunk);
                    }

                    while total > self.chunk_overlap
                        || (total > 0 && total + len + joined(&window) > self.chunk_size)
                    {
                        let Some(first) = window.pop_front() else {
                            break;
                        };
                        let dropped = char_len(first) + if window.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(dropped);
                    }
                }
            }

            total += len + joined(&window);
            window.push_back(piece);
        }

        if let Some(chunk) = join_trimmed(&window, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 150)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_trimmed(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Deterministic chunk id from its origin and content.
fn chunk_id(source: &str, page: Option<u32>, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}
