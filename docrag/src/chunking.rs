//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedWindowChunker`]: fixed character windows advancing by `chunk_size - chunk_overlap`
//! - [`ParagraphChunker`]: packs paragraph and heading blocks greedily, hard-slicing
//!   blocks that are too large on their own
//!
//! All sizes are measured in characters, never bytes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Separator placed between packed blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Selects which [`Chunker`] splits page text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkMode {
    /// Overlapping fixed-size character windows.
    #[default]
    FixedWindow,
    /// Blank-line and heading delimited blocks, greedily packed.
    ParagraphAware,
}

impl FromStr for ChunkMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed-window" | "fixed" => Ok(Self::FixedWindow),
            "paragraph-aware" | "paragraph" => Ok(Self::ParagraphAware),
            other => Err(RagError::InvalidConfig(format!("unknown chunk mode '{other}'"))),
        }
    }
}

/// A strategy for splitting text into segments.
pub trait Chunker: Send + Sync {
    /// Split text into ordered, non-empty segments.
    ///
    /// Returns an empty `Vec` if the text is empty or whitespace only.
    fn chunk(&self, text: &str) -> Vec<String>;
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfig("chunk size must be greater than zero".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk overlap ({chunk_overlap}) must be less than chunk size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// The scan position advances by `chunk_size - chunk_overlap`. Scanning stops
/// with the first window that reaches the end of the text, so no trailing
/// window is fully contained in its predecessor.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::FixedWindowChunker;
///
/// let chunker = FixedWindowChunker::new(1200, 150)?;
/// let segments = chunker.chunk(&page_text);
/// ```
#[derive(Debug, Clone)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedWindowChunker {
    /// Create a new `FixedWindowChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Splits text on paragraph and heading boundaries.
///
/// Blocks are separated by blank lines, and a line starting with `#` always
/// opens a new block. Blocks are packed into a running buffer joined by a blank
/// line until the next block would push it past `chunk_size`. A block longer
/// than `chunk_size` is flushed on its own as consecutive `chunk_size` slices
/// with no overlap. Overlap is never applied across emitted segments.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::ParagraphChunker;
///
/// let chunker = ParagraphChunker::new(6000, 0)?;
/// let segments = chunker.chunk(&article);
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    chunk_size: usize,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    ///
    /// `chunk_overlap` is validated for consistency with the fixed-window policy
    /// but otherwise unused.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size })
    }
}

/// Break text into trimmed, non-empty blocks at blank lines and before heading lines.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        let block = current.join("\n");
        let block = block.trim();
        if !block.is_empty() {
            blocks.push(block.to_string());
        }
        current.clear();
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current);
        } else if line.trim_start().starts_with('#') {
            flush(&mut current);
            current.push(line);
        } else {
            current.push(line);
        }
    }
    flush(&mut current);

    blocks
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buf = String::new();
        let mut buf_len = 0;

        for block in split_blocks(text) {
            let block_len = block.chars().count();

            if block_len > self.chunk_size {
                if !buf.is_empty() {
                    chunks.push(std::mem::take(&mut buf));
                    buf_len = 0;
                }
                let chars: Vec<char> = block.chars().collect();
                chunks.extend(chars.chunks(self.chunk_size).map(|piece| piece.iter().collect()));
                continue;
            }

            if buf.is_empty() {
                buf = block;
                buf_len = block_len;
            } else if buf_len + BLOCK_SEPARATOR.len() + block_len > self.chunk_size {
                chunks.push(std::mem::replace(&mut buf, block));
                buf_len = block_len;
            } else {
                buf.push_str(BLOCK_SEPARATOR);
                buf.push_str(&block);
                buf_len += BLOCK_SEPARATOR.len() + block_len;
            }
        }

        if !buf.is_empty() {
            chunks.push(buf);
        }

        chunks
    }
}

/// Construct the [`Chunker`] for `mode`.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfig`] for unusable size parameters.
pub fn chunker_for(
    mode: ChunkMode,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Box<dyn Chunker>> {
    let chunker: Box<dyn Chunker> = match mode {
        ChunkMode::FixedWindow => Box::new(FixedWindowChunker::new(chunk_size, chunk_overlap)?),
        ChunkMode::ParagraphAware => Box::new(ParagraphChunker::new(chunk_size, chunk_overlap)?),
    };
    Ok(chunker)
}

/// Split `text` into segments of at most `max_size` characters using `mode`.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfig`] before doing any work if
/// `max_size == 0` or `overlap >= max_size`.
pub fn chunk_text(
    text: &str,
    max_size: usize,
    overlap: usize,
    mode: ChunkMode,
) -> Result<Vec<String>> {
    Ok(chunker_for(mode, max_size, overlap)?.chunk(text))
}
