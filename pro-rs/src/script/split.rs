//! Argument and value-list splitting.
//!
//! Both splitters are aware of parentheses and quotes so that nested calls
//! and quoted text survive intact:
//!
//! | Function | Separator | Quotes |
//! |----------|-----------|--------|
//! | [`split_arg_list`]   | top-level `,`; pieces trimmed | kept (an unterminated outer pair is stripped) |
//! | [`split_value_list`] | top-level space, optionally `;` | kept, nested `'`/`"` tracked on a stack |

/// Split a function-call argument string on top-level commas.
///
/// An empty (or all-space) string still yields one empty argument.
pub fn split_arg_list(params: &str) -> Vec<String> {
    let chars: Vec<char> = params.chars().collect();
    let mut args = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    let skip_spaces = |mut i: usize| {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        i
    };

    let mut last = skip_spaces(0);
    for x in last..chars.len() {
        let c = chars[x];
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if quote == Some(c) => quote = None,
            '\'' | '"' if quote.is_none() => quote = Some(c),
            _ => {}
        }
        if depth == 0 && quote.is_none() && c == ',' {
            let piece: String = chars[last..x].iter().collect();
            args.push(piece.trim().to_owned());
            last = skip_spaces(x + 1);
        }
    }

    let mut end = chars.len();
    while end > last && chars[end - 1] == ' ' {
        end -= 1;
    }
    let mut tail: String = chars[last.min(end)..end].iter().collect();
    if let Some(q) = quote {
        if tail.len() >= 2 && tail.starts_with(q) && tail.ends_with(q) {
            tail = tail[1..tail.len() - 1].to_owned();
        }
    }
    args.push(tail);
    args
}

/// Split a value list on top-level spaces (and `;` when `semicolon` is set).
///
/// `\'` and `\"` are kept verbatim and do not open a quote.  Adjacent
/// separators produce empty fields.
pub fn split_value_list(vals: &str, semicolon: bool) -> Vec<String> {
    let chars: Vec<char> = vals.chars().collect();
    let mut out = Vec::new();
    let mut build = String::new();
    let mut quotes: Vec<char> = Vec::new();
    let mut depth = 0i32;

    let mut x = 0;
    while x < chars.len() {
        let c = chars[x];
        if c == '\\' && x + 1 < chars.len() && matches!(chars[x + 1], '\'' | '"') {
            build.push(c);
            build.push(chars[x + 1]);
            x += 2;
            continue;
        }
        match c {
            _ if quotes.last() == Some(&c) => {
                quotes.pop();
            }
            '\'' | '"' => quotes.push(c),
            ')' => depth -= 1,
            '(' => depth += 1,
            _ => {}
        }
        let is_sep = c == ' ' || (semicolon && c == ';');
        if depth == 0 && quotes.is_empty() && is_sep {
            out.push(std::mem::take(&mut build));
        } else {
            build.push(c);
        }
        x += 1;
    }
    if !build.is_empty() {
        out.push(build);
    }
    out
}

/// Strip one matching pair of surrounding quotes.
pub fn remove_quotes(arg: &str) -> &str {
    let bytes = arg.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'\'' || first == b'"') && bytes[bytes.len() - 1] == first {
            return &arg[1..arg.len() - 1];
        }
    }
    arg
}

/// Variables whose values are path lists and also split on `;`.
pub fn is_path_list_var(name: &str) -> bool {
    matches!(name, "DEPENDPATH" | "INCLUDEPATH")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_split_on_commas_and_trim() {
        assert_eq!(split_arg_list("a, b ,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn args_empty_string_is_one_empty_arg() {
        assert_eq!(split_arg_list(""), vec![""]);
        assert_eq!(split_arg_list("   "), vec![""]);
    }

    #[test]
    fn args_nested_parens_keep_commas() {
        assert_eq!(
            split_arg_list("$$join(X, -), b"),
            vec!["$$join(X, -)", "b"]
        );
    }

    #[test]
    fn args_quoted_commas_are_kept() {
        assert_eq!(split_arg_list("\"a,b\", c"), vec!["\"a,b\"", "c"]);
    }

    #[test]
    fn args_unterminated_quote_swallows_rest() {
        assert_eq!(split_arg_list("\"a, b"), vec!["\"a, b"]);
    }

    #[test]
    fn args_trailing_empty() {
        assert_eq!(split_arg_list("a,"), vec!["a", ""]);
    }

    #[test]
    fn values_split_on_space() {
        assert_eq!(split_value_list("a b c", false), vec!["a", "b", "c"]);
    }

    #[test]
    fn values_keep_quoted_spaces() {
        assert_eq!(
            split_value_list("\"a b\" 'c d' e", false),
            vec!["\"a b\"", "'c d'", "e"]
        );
    }

    #[test]
    fn values_keep_parenthesised_spaces() {
        assert_eq!(
            split_value_list("$$join(X, \" \") y", false),
            vec!["$$join(X, \" \")", "y"]
        );
    }

    #[test]
    fn values_escaped_quote_does_not_open_quote() {
        assert_eq!(split_value_list("a\\\"b c", false), vec!["a\\\"b", "c"]);
    }

    #[test]
    fn values_semicolon_only_when_requested() {
        assert_eq!(split_value_list("a;b", false), vec!["a;b"]);
        assert_eq!(split_value_list("a;b c", true), vec!["a", "b", "c"]);
    }

    #[test]
    fn values_adjacent_separators_give_empty_fields() {
        assert_eq!(split_value_list("a  b", false), vec!["a", "", "b"]);
    }

    #[test]
    fn values_nested_quote_kinds() {
        assert_eq!(
            split_value_list("\"a 'b c' d\" e", false),
            vec!["\"a 'b c' d\"", "e"]
        );
    }

    #[test]
    fn remove_quotes_only_matching_pairs() {
        assert_eq!(remove_quotes("\"x\""), "x");
        assert_eq!(remove_quotes("'x'"), "x");
        assert_eq!(remove_quotes("\"x'"), "\"x'");
        assert_eq!(remove_quotes("\""), "\"");
    }
}
