//! Prompt rendering: taxonomy → system instruction, batch → user message.

use labelwave_core::{Batch, FieldKind, Taxonomy};

/// Record text longer than this many characters is cut and marked with `...`.
pub const MAX_RECORD_CHARS: usize = 300;

const RECORD_SEPARATOR: &str = "\n\n---\n\n";

/// One backend request: a system instruction plus the rendered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn for_batch(taxonomy: &Taxonomy, batch: &Batch) -> Self {
        Self {
            system: system_prompt(taxonomy),
            user: format!(
                "Classify the following {} posts:\n\n{}",
                batch.len(),
                render_batch(batch)
            ),
        }
    }
}

/// Describe every taxonomy field and the expected JSON array reply.
pub fn system_prompt(taxonomy: &Taxonomy) -> String {
    let mut out = String::from(
        "You label short social media posts. For every post, fill in these fields:\n\n",
    );
    for field in &taxonomy.fields {
        let line = match &field.kind {
            FieldKind::Choice { allowed, .. } => {
                format!("- {}: one of {}\n", field.name, allowed.join(" | "))
            }
            FieldKind::Text { max_chars } => {
                format!("- {}: free text, at most {max_chars} characters\n", field.name)
            }
            FieldKind::Keywords { max_items } => format!(
                "- {}: JSON array of at most {max_items} short keywords\n",
                field.name
            ),
        };
        out.push_str(&line);
    }
    out.push_str(
        "- confidence: number between 0 and 1\n\n\
         Reply with a single JSON array and nothing else. Use one object per post, \
         in the order the posts are given, and copy each post's id into an \"id\" field.",
    );
    out
}

/// Render records as `[ID: n]` blocks separated by `---` lines.
pub fn render_batch(batch: &Batch) -> String {
    batch
        .records()
        .iter()
        .map(|r| format!("[ID: {}]\n{}", r.id, truncate(r.text(), MAX_RECORD_CHARS)))
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use labelwave_core::{EMPTY_CONTENT, Record};

    use super::*;

    #[test]
    fn renders_id_blocks_with_separator() {
        let batch = Batch::new(vec![Record::new(5, "first"), Record::new(9, "second")]);
        assert_eq!(
            render_batch(&batch),
            "[ID: 5]\nfirst\n\n---\n\n[ID: 9]\nsecond"
        );
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let long = "あ".repeat(MAX_RECORD_CHARS + 10);
        let batch = Batch::new(vec![Record::new(1, long)]);
        let rendered = render_batch(&batch);
        let body = rendered.strip_prefix("[ID: 1]\n").unwrap();
        assert!(body.ends_with("..."));
        assert_eq!(body.chars().count(), MAX_RECORD_CHARS + 3);
    }

    #[test]
    fn exact_length_is_not_marked() {
        let text = "x".repeat(MAX_RECORD_CHARS);
        assert_eq!(truncate(&text, MAX_RECORD_CHARS), text);
    }

    #[test]
    fn empty_record_uses_placeholder() {
        let batch = Batch::new(vec![Record {
            id: 3,
            content: None,
            title: None,
        }]);
        assert_eq!(render_batch(&batch), format!("[ID: 3]\n{EMPTY_CONTENT}"));
    }

    #[test]
    fn system_prompt_lists_every_field() {
        let taxonomy = Taxonomy::default_ugc();
        let system = system_prompt(&taxonomy);
        for field in &taxonomy.fields {
            assert!(system.contains(&format!("- {}:", field.name)), "{}", field.name);
        }
        assert!(system.contains("positive | neutral | negative"));
    }

    #[test]
    fn user_message_counts_records() {
        let batch = Batch::new(vec![Record::new(1, "a"), Record::new(2, "b")]);
        let prompt = Prompt::for_batch(&Taxonomy::default_ugc(), &batch);
        assert!(prompt.user.starts_with("Classify the following 2 posts:"));
    }
}
