//! Recursive-descent parser for nested parenthesised arrays such as
//! `((1, 2) (3, <a>), 5)`.
//!
//! Every group is assigned a level equal to its height: a group with no
//! child groups is level 1, its parent level 2 and so on. A group's own
//! content (its text with child groups removed) is comma-split and each part
//! converted as an unshaped value. Groups sharing a level keep their
//! left-to-right order. Text inside `<...>` never opens or closes a group.

use crate::convert::{convert_data_to, split_unquoted, Shape};
use crate::error::ParamError;
use crate::value::{Levels, ParsedValue};

struct RawGroup {
    height: usize,
    content: String,
    top_level: bool,
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            chars: text.chars().peekable(),
        }
    }

    /// Consume a group whose opening `(` has already been read. Groups are
    /// pushed in post-order, children before their parent.
    fn group(&mut self, out: &mut Vec<RawGroup>, top_level: bool) -> usize {
        let mut content = String::new();
        let mut child_height = 0;
        while let Some(c) = self.chars.next() {
            match c {
                '(' => child_height = child_height.max(self.group(out, false)),
                ')' => break,
                '<' => {
                    content.push(c);
                    for q in self.chars.by_ref() {
                        content.push(q);
                        if q == '>' {
                            break;
                        }
                    }
                }
                _ => content.push(c),
            }
        }
        let height = child_height + 1;
        out.push(RawGroup {
            height,
            content,
            top_level,
        });
        height
    }

    fn groups(mut self) -> Vec<RawGroup> {
        let mut out = Vec::new();
        while let Some(c) = self.chars.next() {
            match c {
                '(' => {
                    self.group(&mut out, true);
                }
                '<' => {
                    for q in self.chars.by_ref() {
                        if q == '>' {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// Parse nested array text into level buckets. Top-level groups whose own
/// content is empty (pure wrappers like the outer pair of `((1)(2))`) are
/// not recorded.
pub fn parse_levels(key: &str, text: &str) -> Result<Levels, ParamError> {
    let mut levels = Levels::new();
    for group in Scanner::new(text).groups() {
        let mut values = Vec::new();
        for part in split_unquoted(&group.content, |c| c == ',') {
            let value = convert_data_to(key, part.trim(), &Shape::None)?;
            if !value.is_null() {
                values.push(value);
            }
        }
        if group.top_level && values.is_empty() {
            continue;
        }
        levels.push(group.height, values);
    }
    Ok(levels)
}

/// Convenience used by tests and callers holding a single nested value.
pub fn parse_nested(text: &str) -> Result<ParsedValue, ParamError> {
    parse_levels("", text).map(ParsedValue::Leveled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn levels(text: &str) -> serde_json::Value {
        parse_nested(text).unwrap().to_json()
    }

    #[test]
    fn two_inner_groups_single_pass() {
        let parsed = parse_levels("X", "((1,2)(3,4))").unwrap();
        let level_1 = parsed.level(1).unwrap();
        assert_eq!(level_1.len(), 2);
        assert!(level_1.iter().all(|g| g.len() == 2));
        assert_eq!(parsed.depth(), 1);
    }

    #[test]
    fn outer_content_becomes_higher_level() {
        assert_eq!(
            levels("((1, 2), 5)"),
            json!({"level_1": [[1, 2]], "level_2": [[5]]})
        );
    }

    #[test]
    fn heights_follow_nesting_depth() {
        assert_eq!(
            levels("((a, (b, c)), (d))"),
            json!({
                "level_1": [["b", "c"], ["d"]],
                "level_2": [["a"]]
            })
        );
    }

    #[test]
    fn quoted_parentheses_are_opaque() {
        assert_eq!(
            levels("((<x(y)>, 1))"),
            json!({"level_1": [["x(y)", 1]]})
        );
    }

    #[test]
    fn inner_whitespace_lists_convert_recursively() {
        assert_eq!(
            levels("((1 2, 3))"),
            json!({"level_1": [[[1, 2], 3]]})
        );
    }

    #[test]
    fn empty_top_level_wrapper_is_dropped() {
        assert_eq!(levels("((1)(2))"), json!({"level_1": [[1], [2]]}));
    }

    #[test]
    fn empty_inner_group_is_kept() {
        assert_eq!(levels("((), (1))"), json!({"level_1": [[], [1]]}));
    }
}
