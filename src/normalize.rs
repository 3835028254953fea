//! Pre-inference text normalization
//!
//! fastText predicts one line at a time, so newlines are folded into spaces.
//! Mostly-uppercase text is lowercased because the lid models tend to read
//! all-caps Latin text as another language. Long inputs are cut to the
//! configured character budget.

use crate::config::LangDetectConfig;
use std::borrow::Cow;

/// Share of uppercase ASCII letters above which text is lowercased
const UPPERCASE_RATIO: f64 = 0.8;

/// Minimum character count for the ratio heuristic to apply
const UPPERCASE_MIN_LEN: usize = 5;

/// Apply the configured normalization steps to `text`
///
/// Returns the input unchanged (borrowed) when no step applies.
pub fn normalize<'a>(text: &'a str, config: &LangDetectConfig) -> Cow<'a, str> {
    if !config.normalize_input() {
        return Cow::Borrowed(text);
    }

    let mut text = Cow::Borrowed(text);

    if text.contains('\n') {
        tracing::trace!("Replacing newline characters with spaces");
        text = Cow::Owned(text.replace('\n', " "));
    }

    // Judge case on the part the model will actually see
    let visible = match config
        .max_input_length()
        .and_then(|max_len| truncation_point(&text, max_len))
    {
        Some(cut) => &text[..cut],
        None => &text[..],
    };
    if is_mostly_uppercase(visible) {
        tracing::trace!("Lowercasing mostly-uppercase input");
        text = Cow::Owned(text.to_lowercase());
    }

    if let Some(max_len) = config.max_input_length()
        && let Some(cut) = truncation_point(&text, max_len)
    {
        tracing::warn!(
            max_input_length = max_len,
            "Input exceeds max_input_length and was truncated; accuracy may be reduced"
        );
        crate::metrics::record_truncation();
        text = match text {
            Cow::Borrowed(s) => Cow::Borrowed(&s[..cut]),
            Cow::Owned(mut s) => {
                s.truncate(cut);
                Cow::Owned(s)
            }
        };
    }

    text
}

/// Byte offset of the first character past `max_chars`, if any
fn truncation_point(text: &str, max_chars: usize) -> Option<usize> {
    text.char_indices().nth(max_chars).map(|(offset, _)| offset)
}

/// True when every cased character is uppercase, or when more than 80% of the
/// ASCII letters in a text longer than five characters are uppercase
fn is_mostly_uppercase(text: &str) -> bool {
    let mut cased = 0usize;
    let mut lower = 0usize;
    let mut ascii_letters = 0usize;
    let mut ascii_upper = 0usize;

    for c in text.chars() {
        if c.is_uppercase() {
            cased += 1;
        } else if c.is_lowercase() {
            cased += 1;
            lower += 1;
        }
        if c.is_ascii_alphabetic() {
            ascii_letters += 1;
            if c.is_ascii_uppercase() {
                ascii_upper += 1;
            }
        }
    }

    if cased > 0 && lower == 0 {
        return true;
    }

    ascii_upper > 0
        && ascii_upper as f64 > UPPERCASE_RATIO * ascii_letters as f64
        && text.chars().count() > UPPERCASE_MIN_LEN
}
