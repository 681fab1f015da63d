//! Filename sanitization.
//!
//! Playlist and video titles are arbitrary Unicode chosen by strangers on the
//! internet. Every backend has different rules for what may appear in a key
//! or path segment (Dropbox, for one, rejects raw non-ASCII in its API
//! argument header), so names are squeezed into printable-ish ASCII before
//! they reach any backend:
//!
//! 1. Diacritical marks are stripped (`é` → `e`), including the strokes
//!    that Unicode doesn't decompose (`ø` → `o`, `ł` → `l`).
//! 2. Path separators (`/` and `\`) become `-`.
//! 3. Anything at or above `0x7F` is escaped as `\uXXXX` (four lowercase hex
//!    digits per UTF-16 code unit, so astral characters become a surrogate pair).

use std::fmt::Write;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Map a human-readable title to a storage-safe name. Total and deterministic.
///
/// ```
/// use tubevault_storage::sanitize;
///
/// assert_eq!(sanitize("Café del Mar"), "Cafe del Mar");
/// assert_eq!(sanitize("AC/DC \\ Live"), "AC-DC - Live");
/// assert_eq!(sanitize("東京"), "\\u6771\\u4eac");
/// ```
pub fn sanitize(name: &str) -> String {
    let mut output = String::with_capacity(name.len());
    let mut after_base = false;
    for c in name.nfd() {
        // A combining mark only counts as a diacritic when it decorates
        // something; a lone mark is kept (and escaped) so the result is
        // never emptier than the input.
        if is_combining_mark(c) && after_base {
            continue;
        }
        after_base = !is_combining_mark(c);
        match fold_stroke(c) {
            '/' | '\\' => output.push('-'),
            c if (c as u32) < 0x7F => output.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // Writing to a String never fails.
                    let _ = write!(output, "\\u{unit:04x}");
                }
            },
        }
    }
    output
}

/// Base letter of a Latin letter with an overlaid stroke or bar.
fn fold_stroke(c: char) -> char {
    match c {
        'ø' => 'o',
        'Ø' => 'O',
        'ł' => 'l',
        'Ł' => 'L',
        'đ' => 'd',
        'Đ' => 'D',
        'ħ' => 'h',
        'Ħ' => 'H',
        'ŧ' => 't',
        'Ŧ' => 'T',
        'ƀ' => 'b',
        'ƶ' => 'z',
        'Ƶ' => 'Z',
        c => c,
    }
}
