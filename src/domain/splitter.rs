/// Applied in this order; each pass splits every fragment from the previous pass.
pub const BULK_DELIMITERS: [char; 7] = ['\n', ';', ',', '|', '•', '-', '*'];

/// Fragments this short are treated as accidental splits and dropped.
const MIN_TITLE_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEntry {
    Empty,
    Single(String),
    Multiple(Vec<String>),
}

/// Splits one pasted line into item titles.
///
/// Splitting is plain character splitting: a comma or hyphen inside a title
/// ("Follow-up call") still splits it.
pub fn split_bulk_entry(input: &str) -> Vec<String> {
    let mut fragments = vec![input.to_string()];
    for delimiter in BULK_DELIMITERS {
        fragments = fragments
            .iter()
            .flat_map(|fragment| fragment.split(delimiter))
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }

    fragments
        .into_iter()
        .filter(|fragment| fragment.chars().count() >= MIN_TITLE_CHARS)
        .collect()
}

pub fn classify_bulk_entry(input: &str) -> BulkEntry {
    let mut fragments = split_bulk_entry(input);
    match fragments.len() {
        0 => BulkEntry::Empty,
        1 => BulkEntry::Single(fragments.remove(0)),
        _ => BulkEntry::Multiple(fragments),
    }
}
