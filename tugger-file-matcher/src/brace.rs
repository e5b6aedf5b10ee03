// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Brace expansion for glob patterns.

`{a,b}` expands to one pattern per comma separated alternative and `{0..3}`
expands to one pattern per integer in the inclusive range. Groups nest and
multiple groups in a pattern produce the cartesian product of their
alternatives.

A `{` without a matching `}`, or a group that is neither a list nor a range
(e.g. `{a}`), is kept literally.
*/

use crate::MatcherError;

/// Upper bound on the number of patterns a single pattern may expand to.
pub const MAX_EXPANSIONS: usize = 4096;

/// Expand brace groups in a pattern.
///
/// Always returns at least one pattern. A pattern without expandable groups
/// is returned unchanged.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, MatcherError> {
    let mut res = vec![];
    expand_into(pattern, pattern, &mut res)?;

    Ok(res)
}

fn expand_into(original: &str, pattern: &str, res: &mut Vec<String>) -> Result<(), MatcherError> {
    let mut search_from = 0;

    while let Some(offset) = pattern[search_from..].find('{') {
        let open = search_from + offset;

        if let Some(close) = find_closing_brace(pattern, open) {
            if let Some(alternatives) = group_alternatives(original, &pattern[open + 1..close])? {
                let prefix = &pattern[..open];
                let suffix = &pattern[close + 1..];

                for alternative in alternatives {
                    let candidate = format!("{}{}{}", prefix, alternative, suffix);
                    expand_into(original, &candidate, res)?;

                    if res.len() > MAX_EXPANSIONS {
                        return Err(MatcherError::TooManyExpansions(original.to_string()));
                    }
                }

                return Ok(());
            }
        }

        // Literal brace. Groups nested inside it may still expand.
        search_from = open + 1;
    }

    res.push(pattern.to_string());

    Ok(())
}

/// Find the index of the `}` closing the `{` at `open`.
fn find_closing_brace(pattern: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;

    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Resolve the alternatives of a group body, or `None` if it is not expandable.
fn group_alternatives(original: &str, body: &str) -> Result<Option<Vec<String>>, MatcherError> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }

    if !parts.is_empty() {
        parts.push(body[start..].to_string());
        return Ok(Some(parts));
    }

    numeric_range(original, body)
}

fn numeric_range(original: &str, body: &str) -> Result<Option<Vec<String>>, MatcherError> {
    let (first, last) = match body.split_once("..") {
        Some(v) => v,
        None => return Ok(None),
    };

    let (start, end) = match (first.parse::<i64>(), last.parse::<i64>()) {
        (Ok(start), Ok(end)) => (start, end),
        _ => return Ok(None),
    };

    if start.abs_diff(end) >= MAX_EXPANSIONS as u64 {
        return Err(MatcherError::TooManyExpansions(original.to_string()));
    }

    // `{01..10}` pads to the widest bound.
    let padded = |s: &str| {
        let digits = s.trim_start_matches('-');
        digits.len() > 1 && digits.starts_with('0')
    };
    let width = if padded(first) || padded(last) {
        first.len().max(last.len())
    } else {
        0
    };

    let values: Vec<i64> = if start <= end {
        (start..=end).collect()
    } else {
        (end..=start).rev().collect()
    };

    Ok(Some(
        values
            .into_iter()
            .map(|v| {
                if v < 0 {
                    format!("-{:0width$}", v.unsigned_abs(), width = width.saturating_sub(1))
                } else {
                    format!("{:0width$}", v, width = width)
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_braces() -> Result<(), MatcherError> {
        assert_eq!(expand_braces("**/*.dll")?, vec!["**/*.dll"]);

        Ok(())
    }

    #[test]
    fn comma_list() -> Result<(), MatcherError> {
        assert_eq!(
            expand_braces("*.{dll,exe}")?,
            vec!["*.dll".to_string(), "*.exe".to_string()]
        );
        assert_eq!(expand_braces("a{,b}")?, vec!["a", "ab"]);

        Ok(())
    }

    #[test]
    fn multiple_and_nested_groups() -> Result<(), MatcherError> {
        assert_eq!(
            expand_braces("{x,y}/{a,b{1,2}}")?,
            vec!["x/a", "x/b1", "x/b2", "y/a", "y/b1", "y/b2"]
        );

        Ok(())
    }

    #[test]
    fn numeric_ranges() -> Result<(), MatcherError> {
        assert_eq!(expand_braces("f{0..3}")?, vec!["f0", "f1", "f2", "f3"]);
        assert_eq!(expand_braces("f{2..0}")?, vec!["f2", "f1", "f0"]);
        assert_eq!(expand_braces("f{-1..1}")?, vec!["f-1", "f0", "f1"]);
        assert_eq!(expand_braces("f{08..10}")?, vec!["f08", "f09", "f10"]);

        Ok(())
    }

    #[test]
    fn invalid_groups_are_literal() -> Result<(), MatcherError> {
        assert_eq!(expand_braces("a{b")?, vec!["a{b"]);
        assert_eq!(expand_braces("a}b")?, vec!["a}b"]);
        assert_eq!(expand_braces("{a}")?, vec!["{a}"]);
        assert_eq!(expand_braces("{a..z}")?, vec!["{a..z}"]);
        assert_eq!(expand_braces("a{b{c,d}")?, vec!["a{bc", "a{bd"]);
        assert_eq!(expand_braces("{{a,b}}")?, vec!["{a}", "{b}"]);

        Ok(())
    }

    #[test]
    fn expansion_limit() {
        assert!(matches!(
            expand_braces("{0..100000}"),
            Err(MatcherError::TooManyExpansions(_))
        ));
        assert!(matches!(
            expand_braces("{0..9}{0..9}{0..9}{0..9}"),
            Err(MatcherError::TooManyExpansions(_))
        ));
    }
}
