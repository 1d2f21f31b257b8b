use std::sync::LazyLock;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use html2text::render::TrivialDecorator;
use regex::Regex;

/// URL-safe alphabet that accepts input with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Wide enough that paragraphs are never wrapped; `<hr>` is drawn at this
/// width, so it must stay bounded.
const RENDER_WIDTH: usize = 100_000;

static HTML_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(!doctype|html|head|body|div|p|br|span|table|tr|td|a|b|i|strong|em|font|ul|ol|li|h[1-6])[\s>/]")
        .expect("valid html regex")
});

/// Decode Gmail's base64url payloads. Standard-alphabet characters and
/// embedded whitespace are tolerated as well.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let normalized: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_LENIENT
        .decode(normalized.as_bytes())
        .context("invalid base64url data")
}

/// Decode RFC 2047 encoded-words in a header value ("=?UTF-8?B?...?=").
pub fn decode_mime_words(raw: &str) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw.as_bytes());
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => raw.to_string(),
    }
}

/// Sniffs for common structural or inline tags only; a fragment made solely
/// of rarer elements (`<center>`, `<blockquote>`, ...) is not detected.
/// Meant for bodies that arrive without a MIME type.
pub fn looks_like_html(text: &str) -> bool {
    HTML_MARKUP.is_match(text)
}

fn is_rule(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| ('\u{2500}'..='\u{257f}').contains(&c))
}

/// Render HTML to its human-visible text: tags dropped, entities decoded,
/// no markdown-style decoration, link footnotes or hard wrapping.
pub fn html_to_text(html: &str) -> Result<String> {
    let rendered = html2text::config::with_decorator(TrivialDecorator::new())
        .raw_mode(true)
        .no_link_wrapping()
        .allow_width_overflow()
        .string_from_read(html.as_bytes(), RENDER_WIDTH)
        .context("failed to render html")?;

    let text = rendered
        .lines()
        .filter(|line| !is_rule(line))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(text.trim().to_string())
}

/// CRLF becomes LF and any run of 3+ newlines becomes exactly two.
pub fn normalize_newlines(text: &str) -> String {
    let unix = text.replace("\r\n", "\n");
    NEWLINE_RUNS.replace_all(&unix, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose;

    #[test]
    fn base64url_roundtrip_without_padding() {
        let samples: Vec<Vec<u8>> = (0..12u8)
            .map(|len| (0..len).map(|i| i.wrapping_mul(97).wrapping_add(250)).collect())
            .collect();

        for bytes in samples {
            let encoded = general_purpose::URL_SAFE_NO_PAD.encode(&bytes);
            assert_eq!(decode_base64url(&encoded).unwrap(), bytes, "input {encoded:?}");
        }
    }

    #[test]
    fn base64url_accepts_padding_and_standard_alphabet() {
        let bytes = vec![0xfb, 0xff, 0xfe, 0x3e];
        let padded = general_purpose::URL_SAFE.encode(&bytes);
        let standard = general_purpose::STANDARD.encode(&bytes);
        assert!(padded.ends_with('='));
        assert_eq!(decode_base64url(&padded).unwrap(), bytes);
        assert_eq!(decode_base64url(&standard).unwrap(), bytes);
    }

    #[test]
    fn base64url_rejects_garbage() {
        assert!(decode_base64url("@@@@").is_err());
    }

    #[test]
    fn mime_words_are_decoded() {
        assert_eq!(decode_mime_words("=?UTF-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_mime_words("plain subject"), "plain subject");
    }

    #[test]
    fn newline_runs_collapse_to_two() {
        assert_eq!(normalize_newlines("a\n\n\n\nb\n\nc\nd"), "a\n\nb\n\nc\nd");
        assert_eq!(normalize_newlines("a\r\n\r\n\r\nb"), "a\n\nb");
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html("<p>Hi</p>"));
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("Jane Doe <jane@example.com> wrote:"));
        assert!(!looks_like_html("1 < 2 and 3 > 2"));
    }

    #[test]
    fn html_is_reduced_to_visible_text() {
        assert_eq!(html_to_text("<p>Hi</p>").unwrap(), "Hi");
        assert_eq!(html_to_text("<div>Tom &amp; Jerry</div>").unwrap(), "Tom & Jerry");
        assert_eq!(html_to_text("<p>Please <b>confirm</b> now</p>").unwrap(), "Please confirm now");
    }

    #[test]
    fn links_headings_and_lists_carry_no_decoration() {
        let text = html_to_text(
            r#"<h1>Offsite</h1><p>Please <b>confirm</b> via <a href="https://x.example/t?id=1">this link</a>.</p><ul><li>one</li><li>two</li></ul>"#,
        )
        .unwrap();

        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Offsite", "Please confirm via this link.", "one", "two"]);
        assert!(!text.contains("https://"), "{text}");
    }

    #[test]
    fn long_paragraphs_are_not_wrapped() {
        let paragraph = "lorem ipsum ".repeat(150);
        let text = html_to_text(&format!("<p>{paragraph}</p>")).unwrap();
        assert!(text.len() > 1500);
        assert!(!text.contains('\n'));
        assert_eq!(text, paragraph.trim());
    }

    #[test]
    fn horizontal_rules_are_dropped() {
        let text = html_to_text("<p>above</p><hr><p>below</p>").unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["above", "below"]);
    }
}
