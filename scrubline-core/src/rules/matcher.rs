//! Applies a single compiled rule to a single string.

use std::borrow::Cow;

use crate::rules::compiler::CompiledRule;

/// Replaces every non-overlapping match of `rule` in `input` with the rule's
/// replacement text and returns the result with the number of matches.
///
/// The replacement is inserted literally; `$1`-style references are not
/// expanded. For marker rules the whole matched span is replaced, not just the
/// `content` group. With no matches the input is returned borrowed.
///
/// Every match is non-empty: the compiler rejects patterns that can match
/// without consuming text.
pub fn apply_rule<'a>(rule: &CompiledRule, input: &'a str) -> (Cow<'a, str>, usize) {
    let mut matches = rule.regex.find_iter(input).peekable();
    if matches.peek().is_none() {
        return (Cow::Borrowed(input), 0);
    }

    let mut output = String::with_capacity(input.len());
    let mut last_end = 0usize;
    let mut count = 0usize;
    for m in matches {
        output.push_str(&input[last_end..m.start()]);
        output.push_str(&rule.replacement);
        last_end = m.end();
        count += 1;
    }
    output.push_str(&input[last_end..]);
    (Cow::Owned(output), count)
}
