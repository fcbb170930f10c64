//! Prompts for the digest and for single-story detail requests, and parsing of
//! the numbered digest reply

use crate::generation::CompletionRequest;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[(\d+)\]\s*(.*)$").expect("literal pattern"));

/// One numbered paragraph of a digest reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberedSummary {
    /// The `[n]` number, 1-based
    pub number: usize,
    /// Paragraph text without the `[n]` marker
    pub text: String,
}

/// Prompt asking for one numbered paragraph per story
///
/// `contents` are rendered story contexts, numbered from 1 in order.
pub fn digest_prompt(contents: &[String], language: &str) -> CompletionRequest {
    let system = format!(
        "You are the editor of a daily Hacker News digest. You write concise, \
         neutral summaries for busy engineers. Write in {language}."
    );

    let mut user = format!(
        "Summarize each of the {} stories below. For every story write exactly one \
         paragraph that starts with the story number in square brackets followed by \
         the title in bold, for example:\n\
         [1] **Title of the story**\n\
         Follow the title with two or three sentences: what the story is about, then \
         the most interesting points raised in the comments. Separate paragraphs with \
         a blank line. Do not add an introduction or a closing remark.\n",
        contents.len()
    );
    for (index, content) in contents.iter().enumerate() {
        user.push_str(&format!("\n=== Story [{}] ===\n{}\n", index + 1, content));
    }

    CompletionRequest { system, user }
}

/// Prompt asking for an in-depth summary of one story and its discussion
pub fn detail_prompt(content: &str, language: &str) -> CompletionRequest {
    CompletionRequest {
        system: format!(
            "You are a technical journalist explaining a Hacker News thread to a \
             reader who has not seen it. Write in {language}."
        ),
        user: format!(
            "Write a detailed summary of the story below: background, the key points \
             of the article, and the notable opinions and disagreements in the \
             comments. Use short paragraphs separated by blank lines and keep it \
             under 600 words.\n\n{content}"
        ),
    }
}

/// Split a digest reply into numbered paragraphs
///
/// A line starting with `[n]` opens a new entry; following lines belong to it
/// until the next marker. Text before the first marker is ignored, and each
/// entry is trimmed.
pub fn parse_numbered_summaries(reply: &str) -> Vec<NumberedSummary> {
    let mut summaries: Vec<NumberedSummary> = Vec::new();

    for line in reply.lines() {
        if let Some(caps) = NUMBERED_LINE.captures(line)
            && let Ok(number) = caps[1].parse::<usize>()
        {
            summaries.push(NumberedSummary {
                number,
                text: caps[2].to_string(),
            });
            continue;
        }

        if let Some(current) = summaries.last_mut() {
            current.text.push('\n');
            current.text.push_str(line);
        }
    }

    for summary in &mut summaries {
        summary.text = summary.text.trim().to_string();
    }
    summaries.retain(|s| !s.text.is_empty());
    summaries
}
