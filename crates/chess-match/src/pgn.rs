//! PGN text utilities — lightweight regex-based handling.
//!
//! Chat-relayed PGN tends to arrive with its line structure flattened
//! (headers run together on one line, no blank line before the movetext).
//! `normalize` repairs those known irregularities before the text is fed to
//! the engine.

use regex::Regex;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Repair formatting irregularities in relayed PGN: headers squashed onto a
/// single line and a missing blank line between headers and movetext.
pub fn normalize(pgn: &str) -> String {
    let mut text = pgn.replace("] [", "]\n[");
    if let Some(idx) = text.find("] 1.") {
        text.replace_range(idx..idx + 4, "]\n\n1.");
    }
    text
}

/// Extract a string value from a PGN header (e.g. FEN, White).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
pub fn extract_moves(pgn: &str) -> Vec<String> {
    // Remove headers
    let header_re = Regex::new(r"\[[^\]]*\]").unwrap();
    let no_headers = header_re.replace_all(pgn, "");

    // Remove comments
    let comment_re = Regex::new(r"\{[^}]*\}").unwrap();
    let no_comments = comment_re.replace_all(&no_headers, "");

    // Remove variations
    let variation_re = Regex::new(r"\([^)]*\)").unwrap();
    let no_variations = variation_re.replace_all(&no_comments, "");

    // Extract moves
    let move_re =
        Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O").unwrap();

    move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}
