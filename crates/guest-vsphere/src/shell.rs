//! POSIX shell quoting for commands handed to `/bin/sh -c`.
//!
//! `cmd.exe` arguments are passed through untouched; quoting for Windows
//! guests is not handled here.

/// Quote `s` as exactly one POSIX shell word whose value is `s`.
///
/// The word is single-quoted; each embedded `'` closes the quote, emits an
/// escaped `\'` and reopens it. Nothing inside single quotes is special to
/// `sh`, so no input can end the word early.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    out.push_str(&s.replace('\'', r"'\''"));
    out.push('\'');
    out
}
