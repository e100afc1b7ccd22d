//! Label list parsing

/// Parse a newline-delimited label list.
///
/// Lines may carry a numeric index prefix (`"0 Close_eyes"`), which is stripped.
/// Blank lines are dropped.
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_start)
        .map(strip_index_prefix)
        .map(str::trim_end)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_index_prefix(line: &str) -> &str {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return line;
    }
    match line[digits..].chars().next() {
        Some(c) if c.is_whitespace() => line[digits..].trim_start(),
        // A bare number or a label that merely starts with digits
        _ => line,
    }
}
