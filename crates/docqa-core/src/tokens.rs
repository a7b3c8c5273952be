//! Token estimation shared by budgeting, compression and tracing.

/// Rough token count: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Total estimated tokens across a set of texts.
pub fn estimate_tokens_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> usize {
    texts.into_iter().map(estimate_tokens).sum()
}
