/// Remove a single wrapping Markdown code fence (```markdown ... ```), if any.
///
/// Models sometimes wrap a whole Markdown document in a fence; the report file
/// should contain the document itself.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let Some((_, inner)) = trimmed.split_once('\n') else {
        return trimmed;
    };
    match inner.trim_end().strip_suffix("```") {
        Some(body) => body.trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        let fenced = "```markdown\n# Relatorio\n\nTexto.\n```\n";
        assert_eq!(strip_code_fence(fenced), "# Relatorio\n\nTexto.");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fence("```\n# A\n```"), "# A");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(strip_code_fence("  # A\n\n```rust\nx\n```\n"), "# A\n\n```rust\nx\n```");
    }

    #[test]
    fn unterminated_fence_is_kept() {
        assert_eq!(strip_code_fence("```md\n# A"), "```md\n# A");
    }
}
