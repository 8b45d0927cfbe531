use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

/// Substring that marks where a payload breaks into markup.
pub const INJECTION_MARKER: &str = "<script";

/// Prefixes tried in front of the marker to close an attribute or tag first.
const ESCAPE_PREFIXES: [&str; 2] = ["\">", "'>"];

/// Reads the headers file, one base header per line. Blank lines are kept.
///
/// Bytes that are not valid UTF-8 become U+FFFD instead of failing the file.
pub fn read_headers<P: AsRef<Path>>(filename: P) -> Result<Vec<String>> {
    let file = File::open(&filename)
        .with_context(|| format!("Cannot open file: {}", filename.as_ref().display()))?;
    let mut reader = io::BufReader::new(file);
    let mut headers = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Cannot read file: {}", filename.as_ref().display()))?;
        if read == 0 {
            break;
        }
        if line.ends_with(b"\n") {
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
        }
        headers.push(String::from_utf8_lossy(&line).into_owned());
    }
    Ok(headers)
}

/// Expands base headers into the full list of variants to send.
///
/// Every header carrying [`INJECTION_MARKER`] is followed by one variant per
/// escape prefix. Other headers pass through on their own.
pub fn expand_variants(base: &[String]) -> Vec<String> {
    let mut variants = Vec::with_capacity(base.len());
    for header in base {
        variants.push(header.clone());
        if header.contains(INJECTION_MARKER) {
            for prefix in ESCAPE_PREFIXES {
                let escaped = format!("{}{}", prefix, INJECTION_MARKER);
                variants.push(header.replace(INJECTION_MARKER, &escaped));
            }
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn marker_header_yields_original_then_escaped_variants() {
        let out = expand_variants(&lines(&["X-Test: <script>alert(1)</script>"]));
        assert_eq!(
            out,
            vec![
                "X-Test: <script>alert(1)</script>",
                "X-Test: \"><script>alert(1)</script>",
                "X-Test: '><script>alert(1)</script>",
            ]
        );
    }

    #[test]
    fn plain_header_passes_through_alone() {
        let out = expand_variants(&lines(&["X-Forwarded-Host: evil.com"]));
        assert_eq!(out, vec!["X-Forwarded-Host: evil.com"]);
    }

    #[test]
    fn order_and_blank_lines_are_preserved() {
        let out = expand_variants(&lines(&["A: 1", "", "B: <script src=x>", "A: 1"]));
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], "A: 1");
        assert_eq!(out[1], "");
        assert_eq!(out[2], "B: <script src=x>");
        assert_eq!(out[3], "B: \"><script src=x>");
        assert_eq!(out[4], "B: '><script src=x>");
        assert_eq!(out[5], "A: 1");
    }

    #[test]
    fn every_marker_occurrence_is_escaped() {
        let out = expand_variants(&lines(&["X: <script></script><script>"]));
        assert_eq!(out[1], "X: \"><script></script>\"><script>");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(expand_variants(&[]).is_empty());
    }

    #[test]
    fn read_headers_keeps_blank_lines_and_strips_crlf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "X-One: a\r\n\r\nX-Two: <script>\n").unwrap();

        let headers = read_headers(file.path()).unwrap();
        assert_eq!(headers, vec!["X-One: a", "", "X-Two: <script>"]);
    }

    #[test]
    fn read_headers_tolerates_latin1_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"X-A: caf\xe9\nX-B: <script>\n").unwrap();

        let headers = read_headers(file.path()).unwrap();
        assert_eq!(headers, vec!["X-A: caf\u{FFFD}", "X-B: <script>"]);
        assert_eq!(expand_variants(&headers).len(), 4);
    }

    #[test]
    fn read_headers_keeps_last_line_without_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "X-A: 1\nX-B: 2").unwrap();

        assert_eq!(read_headers(file.path()).unwrap(), vec!["X-A: 1", "X-B: 2"]);
    }

    #[test]
    fn read_headers_reports_missing_file() {
        let err = read_headers("/nonexistent/headers.txt").unwrap_err();
        assert!(err.to_string().contains("Cannot open file"));
    }
}
