//! Parses `hg status` output into typed entries.

/// The status letter Mercurial prints at the start of each `hg status` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// `A` — scheduled for addition.
    Added,
    /// `M` — modified.
    Modified,
    /// `R` — scheduled for removal.
    Removed,
    /// `!` — tracked but missing from the working copy.
    Missing,
    /// `?` — not tracked.
    Unknown,
    /// `C` — unmodified (only shown with `-A`/`--all`).
    Clean,
    /// `I` — ignored (only shown with `-i`/`--ignored`).
    Ignored,
}

impl StatusKind {
    fn from_letter(letter: char) -> Option<StatusKind> {
        match letter {
            'A' => Some(StatusKind::Added),
            'M' => Some(StatusKind::Modified),
            'R' => Some(StatusKind::Removed),
            '!' => Some(StatusKind::Missing),
            '?' => Some(StatusKind::Unknown),
            'C' => Some(StatusKind::Clean),
            'I' => Some(StatusKind::Ignored),
            _ => None,
        }
    }
}

/// One line of `hg status` output: a status kind and the path it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// The parsed status letter.
    pub kind: StatusKind,
    /// The path, as printed (relative to the invocation directory).
    pub path: String,
}

/// Parses each non-empty line of `stdout` as `"<letter> <path>"`.
///
/// Lines with an unrecognized letter or without the expected `"<c> "`
/// prefix are skipped rather than failing the whole parse, since a future
/// Mercurial release adding a new letter shouldn't break every caller.
pub(crate) fn parse(stdout: &str) -> Vec<StatusEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            let letter = chars.next()?;
            if chars.next() != Some(' ') {
                return None;
            }
            let kind = StatusKind::from_letter(letter)?;
            Some(StatusEntry {
                kind,
                path: chars.as_str().to_string(),
            })
        })
        .collect()
}
