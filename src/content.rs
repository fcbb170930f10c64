//! Plain-text story context for the generation backend

use crate::comments::{Forest, ResolvedNode};
use crate::config::ContentConfig;
use crate::stories::Story;
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PARAGRAPH_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p\s*/?>").expect("literal pattern"));

#[allow(clippy::expect_used)]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("literal pattern"));

/// Turn an HTML fragment from the item API into plain text
///
/// `<p>` becomes a paragraph break, other tags are removed, the handful of
/// entities the API emits are decoded, and the result is trimmed.
pub fn clean_html(html: &str) -> String {
    let text = PARAGRAPH_TAG.replace_all(html, "\n\n");
    let text = ANY_TAG.replace_all(&text, "");
    // &amp; last, so "&amp;lt;" decodes to the literal "&lt;"
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&#x2F;", "/")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Render a story and its comment forest as backend context
pub fn render_story(story: &Story, forest: &Forest, limits: &ContentConfig) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Title: {}", story.title);
    if let Some(url) = &story.url {
        let _ = writeln!(out, "Link: {url}");
    }
    let _ = writeln!(out, "Discussion: {}", story.discussion_url());
    let _ = writeln!(
        out,
        "Score: {} | Author: {} | Comments: {}",
        story.score, story.author, story.comment_count
    );

    if let Some(text) = story.text.as_deref().map(clean_html).filter(|t| !t.is_empty()) {
        let _ = write!(out, "\n{text}\n");
    }

    let comments: Vec<&ResolvedNode> = forest.nodes.iter().take(limits.max_comments).collect();
    if !comments.is_empty() {
        out.push_str("\nTop comments:\n");
        for (index, comment) in comments.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", index + 1, comment_line(comment));
            for reply in comment.children.iter().take(limits.max_replies) {
                let _ = writeln!(out, "   - {}", comment_line(reply));
            }
        }
    }

    out.trim_end().to_string()
}

fn comment_line(node: &ResolvedNode) -> String {
    // One line per comment keeps the reply structure readable
    let text = clean_html(&node.item.text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}: {}", node.item.author, text)
}
