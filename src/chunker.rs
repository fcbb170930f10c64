//! Length-bounded text segmentation
//!
//! [`TextChunker`] splits long generated text into chunks no longer than a
//! fixed limit, preferring natural boundaries:
//!
//! 1. Paragraphs (separated by a blank line) are packed greedily, joined by
//!    the blank line they were separated by.
//! 2. A paragraph that is longer than the limit on its own is packed sentence
//!    by sentence instead, after flushing whatever was pending. Sentences are
//!    joined by the whitespace between them, which counts toward the limit
//!    like the paragraph separator does; when a chunk breaks there, that
//!    whitespace becomes the next chunk's separator.
//! 3. A sentence longer than the limit becomes a chunk of its own, unsplit.
//!    This is the only way a chunk can exceed the limit.
//!
//! Lengths are counted in `char`s, so a chunk never ends inside a character.
//! Chunks are never empty or whitespace-only; whitespace that would have
//! formed such a chunk is carried into the next chunk's
//! [`separator`](Chunk::separator) instead.

use crate::error::{Error, Result};

/// Separator between paragraphs
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

const PARAGRAPH_SEPARATOR_LEN: usize = 2;

/// A chunk together with the source text that preceded it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Text between the previous chunk and this one: empty for the first chunk
    /// and for sentence continuations, usually [`PARAGRAPH_SEPARATOR`] otherwise
    pub separator: String,
    /// Chunk contents
    pub text: String,
}

impl Chunk {
    /// Length in chars
    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    /// Always false; empty chunks are never produced
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits text into chunks of at most `max_len` chars
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextChunker {
    max_len: usize,
}

impl TextChunker {
    /// Create a chunker
    ///
    /// # Errors
    /// Returns [`Error::Config`] when `max_len` is zero
    pub fn new(max_len: usize) -> Result<Self> {
        if max_len == 0 {
            return Err(Error::config(
                "chunk length must be greater than zero",
                "telegram.max_message_length",
            ));
        }
        Ok(Self { max_len })
    }

    /// Configured limit
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Split `text` into chunk strings
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_chunks(text)
            .into_iter()
            .map(|chunk| chunk.text)
            .collect()
    }

    /// Split `text`, keeping the separator that preceded each chunk
    ///
    /// [`reassemble`] on the result reproduces `text`, minus any trailing
    /// whitespace-only remainder.
    pub fn split_chunks(&self, text: &str) -> Vec<Chunk> {
        let mut sink = ChunkSink::default();
        let mut buffer = String::new();
        let mut buffer_len = 0;
        let mut open = false;

        for (index, paragraph) in text.split(PARAGRAPH_SEPARATOR).enumerate() {
            let leading = if index == 0 { "" } else { PARAGRAPH_SEPARATOR };
            let paragraph_len = char_len(paragraph);

            if paragraph_len > self.max_len {
                if open {
                    sink.emit(std::mem::take(&mut buffer));
                    buffer_len = 0;
                    open = false;
                }
                sink.separator(leading);
                self.pack_sentences(paragraph, &mut sink);
                continue;
            }

            if open && buffer_len + PARAGRAPH_SEPARATOR_LEN + paragraph_len > self.max_len {
                sink.emit(std::mem::take(&mut buffer));
                buffer_len = 0;
                open = false;
            }

            if open {
                buffer.push_str(PARAGRAPH_SEPARATOR);
                buffer_len += PARAGRAPH_SEPARATOR_LEN;
            } else {
                sink.separator(leading);
                open = true;
            }
            buffer.push_str(paragraph);
            buffer_len += paragraph_len;
        }

        if open {
            sink.emit(buffer);
        }
        sink.chunks
    }

    fn pack_sentences(&self, paragraph: &str, sink: &mut ChunkSink) {
        let (sentences, trailing) = split_sentences(paragraph);
        let mut buffer = String::new();
        let mut buffer_len = 0;

        for Sentence { gap, text } in sentences {
            let gap_len = char_len(gap);
            let text_len = char_len(text);

            if !buffer.is_empty() && buffer_len + gap_len + text_len <= self.max_len {
                buffer.push_str(gap);
                buffer.push_str(text);
                buffer_len += gap_len + text_len;
                continue;
            }

            if !buffer.is_empty() {
                sink.emit(std::mem::take(&mut buffer));
                buffer_len = 0;
            }
            sink.separator(gap);

            if text_len > self.max_len {
                sink.emit(text.to_string());
            } else {
                buffer.push_str(text);
                buffer_len = text_len;
            }
        }

        if !buffer.is_empty() {
            sink.emit(buffer);
        }
        sink.separator(trailing);
    }
}

/// Split `text` into chunks of at most `max_len` chars
///
/// # Errors
/// Returns [`Error::Config`] when `max_len` is zero
pub fn split(text: &str, max_len: usize) -> Result<Vec<String>> {
    Ok(TextChunker::new(max_len)?.split(text))
}

/// Join chunks back together with their separators
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&chunk.separator);
        out.push_str(&chunk.text);
    }
    out
}

/// Split a paragraph into sentences
///
/// A sentence ends after a run of terminators (`.`, `!`, `?`, `。`, `！`, `？`)
/// and any closing quotes or brackets that follow it. ASCII terminators only
/// end a sentence when followed by whitespace or the end of the text, so
/// `3.14` and `example.com` stay whole. Whitespace between sentences is not
/// part of either one.
pub fn sentences(paragraph: &str) -> Vec<&str> {
    split_sentences(paragraph)
        .0
        .into_iter()
        .map(|sentence| sentence.text)
        .collect()
}

/// A sentence and the whitespace before it
struct Sentence<'a> {
    gap: &'a str,
    text: &'a str,
}

/// Sentences of `paragraph` plus its trailing whitespace
///
/// Gaps, sentence texts and the trailing whitespace concatenate back to
/// `paragraph`. Sentence texts never start or end with whitespace.
fn split_sentences(paragraph: &str) -> (Vec<Sentence<'_>>, &str) {
    let mut out = Vec::new();
    let mut chars = paragraph.char_indices().peekable();
    let mut gap_start = 0;

    loop {
        while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(text_start, _)) = chars.peek() else {
            break;
        };

        let mut end = paragraph.len();
        while let Some((_, c)) = chars.next() {
            if !is_terminator(c) {
                continue;
            }

            let mut full_width = is_full_width_terminator(c);
            while let Some((_, next)) = chars.next_if(|&(_, n)| is_terminator(n)) {
                full_width |= is_full_width_terminator(next);
            }
            while chars.next_if(|&(_, n)| is_closer(n)).is_some() {}

            match chars.peek() {
                None => break,
                Some(&(index, next)) if full_width || next.is_whitespace() => {
                    end = index;
                    break;
                }
                Some(_) => {}
            }
        }

        // An unterminated tail can end in whitespace
        let text = paragraph[text_start..end].trim_end();
        out.push(Sentence {
            gap: &paragraph[gap_start..text_start],
            text,
        });
        gap_start = text_start + text.len();
    }

    (out, &paragraph[gap_start..])
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?') || is_full_width_terminator(c)
}

fn is_full_width_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '」' | '』' | '）')
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[derive(Default)]
struct ChunkSink {
    chunks: Vec<Chunk>,
    pending: String,
}

impl ChunkSink {
    fn separator(&mut self, separator: &str) {
        self.pending.push_str(separator);
    }

    fn emit(&mut self, text: String) {
        if text.trim().is_empty() {
            self.pending.push_str(&text);
            return;
        }
        self.chunks.push(Chunk {
            separator: std::mem::take(&mut self.pending),
            text,
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_paragraph_per_chunk_when_pairs_overflow() {
        assert_eq!(split("A\n\nB\n\nC", 3).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_exact_fill_does_not_carry_separator() {
        assert_eq!(split("AAAA\n\nB", 4).unwrap(), vec!["AAAA", "B"]);
    }

    #[test]
    fn test_paragraphs_pack_together_when_they_fit() {
        assert_eq!(
            split("A\n\nB\n\nC", 4).unwrap(),
            vec!["A\n\nB", "C"],
            "A + separator + B is exactly 4"
        );
        assert_eq!(split("A\n\nB\n\nC", 7).unwrap(), vec!["A\n\nB\n\nC"]);
    }

    #[test]
    fn test_oversized_sentence_is_emitted_whole() {
        let text = "x".repeat(50);
        let chunks = split(&text, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 50);
    }

    #[test]
    fn test_zero_max_len_is_rejected() {
        assert!(matches!(split("anything", 0), Err(Error::Config { .. })));
        assert!(TextChunker::new(0).is_err());
    }

    #[test]
    fn test_long_paragraph_falls_back_to_sentences() {
        assert_eq!(
            split("One. Two. Three.", 10).unwrap(),
            vec!["One. Two.", "Three."]
        );
    }

    #[test]
    fn test_pending_buffer_is_flushed_before_sentence_packing() {
        let text = "Intro\n\nFirst one. Second one. Third.\n\nOutro";
        let chunks = split(text, 12).unwrap();
        assert_eq!(
            chunks,
            vec!["Intro", "First one.", "Second one.", "Third.", "Outro"]
        );
    }

    #[test]
    fn test_oversized_sentence_between_small_ones() {
        let text = "Hi. Thisisaverylongsentencewithoutanybreaks. Bye.";
        let chunks = split(text, 10).unwrap();
        assert_eq!(
            chunks,
            vec!["Hi.", "Thisisaverylongsentencewithoutanybreaks.", "Bye."]
        );
        let over: Vec<_> = chunks.iter().filter(|c| c.chars().count() > 10).collect();
        assert_eq!(over.len(), 1, "only the unsplittable sentence exceeds the limit");
    }

    #[test]
    fn test_whitespace_after_sentence_does_not_count_against_it() {
        let chunks = split("Hello. World.", 6).unwrap();
        assert_eq!(chunks, vec!["Hello.", "World."]);

        let chunks = split("Hi.          Bye. Ok.", 5).unwrap();
        assert_eq!(chunks, vec!["Hi.", "Bye.", "Ok."]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn test_sentence_gaps_become_separators() {
        let chunker = TextChunker::new(8).unwrap();
        let text = "Intro\n\nHi.   Bye. Ok.  ";
        let chunks = chunker.split_chunks(text);
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    separator: String::new(),
                    text: "Intro".to_string()
                },
                Chunk {
                    separator: "\n\n".to_string(),
                    text: "Hi.".to_string()
                },
                Chunk {
                    separator: "   ".to_string(),
                    text: "Bye. Ok.".to_string()
                },
            ]
        );
        assert_eq!(reassemble(&chunks), text.trim_end());
    }

    #[test]
    fn test_empty_text_produces_no_chunks() {
        assert!(split("", 10).unwrap().is_empty());
        assert!(split("\n\n\n\n", 1).unwrap().is_empty());
    }

    #[test]
    fn test_blank_paragraphs_move_into_separators() {
        let chunker = TextChunker::new(1).unwrap();
        let chunks = chunker.split_chunks("A\n\n\n\nB");
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    separator: String::new(),
                    text: "A".to_string()
                },
                Chunk {
                    separator: "\n\n\n\n".to_string(),
                    text: "B".to_string()
                },
            ]
        );
        assert_eq!(reassemble(&chunks), "A\n\n\n\nB");
    }

    #[test]
    fn test_full_width_terminators() {
        assert_eq!(
            split("第一句。第二句。第三句。", 8).unwrap(),
            vec!["第一句。第二句。", "第三句。"]
        );
    }

    #[test]
    fn test_sentences_keep_terminators_and_decimals() {
        assert_eq!(
            sentences("Pi is 3.14 today. Wait... what?! \"Fine.\" Ok"),
            vec!["Pi is 3.14 today.", "Wait...", "what?!", "\"Fine.\"", "Ok"]
        );
        assert_eq!(sentences("好的。真的吗？是的"), vec!["好的。", "真的吗？", "是的"]);
        assert!(sentences("").is_empty());
    }

    #[test]
    fn test_multibyte_text_is_measured_in_chars() {
        // 4 chars but 12 bytes
        let chunks = split("ééé\n\nü", 4).unwrap();
        assert_eq!(chunks, vec!["ééé", "ü"]);
        let chunks = split("éé\n\nü", 5).unwrap();
        assert_eq!(chunks, vec!["éé\n\nü"]);
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "Alpha beta. Gamma delta!\n\nEpsilon? Zeta.\n\nEta";
        let chunker = TextChunker::new(9).unwrap();
        assert_eq!(chunker.split(text), chunker.split(text));
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_limit_unless_single_sentence(
            text in "[ab .!?\n]{0,160}",
            max_len in 1usize..40,
        ) {
            let chunker = TextChunker::new(max_len).unwrap();
            for chunk in chunker.split_chunks(&text) {
                prop_assert!(!chunk.text.trim().is_empty());
                if chunk.len() > max_len {
                    prop_assert!(
                        chunk.text.trim().chars().count() > max_len,
                        "chunk {:?} only exceeds {} through whitespace", chunk.text, max_len
                    );
                    prop_assert_eq!(sentences(&chunk.text).len(), 1, "oversized chunk {:?}", chunk.text);
                }
            }
        }

        #[test]
        fn prop_reassemble_reproduces_text(
            text in "[ab .!?\n]{0,160}",
            max_len in 1usize..40,
        ) {
            let chunker = TextChunker::new(max_len).unwrap();
            let rebuilt = reassemble(&chunker.split_chunks(&text));
            prop_assert!(text.starts_with(&rebuilt), "{:?} is not a prefix of {:?}", rebuilt, text);
            prop_assert!(text[rebuilt.len()..].trim().is_empty());
        }

        #[test]
        fn prop_reassemble_is_exact_for_word_paragraphs(
            paragraphs in prop::collection::vec("[a-z]{1,6}( [a-z]{1,6}){0,4}[.!?]", 1..8),
            max_len in 1usize..30,
        ) {
            let text = paragraphs.join(PARAGRAPH_SEPARATOR);
            let chunker = TextChunker::new(max_len).unwrap();
            prop_assert_eq!(reassemble(&chunker.split_chunks(&text)), text);
        }
    }
}
