//! Transcript text helpers.

/// Join recognised segments into one transcript.
///
/// Empty and whitespace-only segments are dropped; the rest are trimmed and
/// joined with single spaces.
pub fn merge_transcripts<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut merged = String::new();
    for segment in segments {
        let piece = segment.as_ref().trim();
        if piece.is_empty() {
            continue;
        }
        if !merged.is_empty() {
            merged.push(' ');
        }
        merged.push_str(piece);
    }
    merged
}
