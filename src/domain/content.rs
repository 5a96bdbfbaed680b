use std::sync::Arc;

/// File content as lines, each keeping its own terminator.
pub type Lines = Arc<[String]>;

pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    lines.concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_terminators() {
        assert_eq!(split_lines("a\nb\n"), vec!["a\n", "b\n"]);
        assert_eq!(split_lines("a\nb"), vec!["a\n", "b"]);
        assert!(split_lines("").is_empty());
        assert_eq!(join_lines(&split_lines("x\r\ny")), "x\r\ny");
    }
}
