//! ASCII escaping for JSON carried in HTTP headers

use std::fmt::Write;

/// Escape every non-ASCII character as `\uXXXX`.
///
/// Header values must be ASCII, so JSON arguments for upload/download routes
/// go through this before being placed in `Dropbox-Api-Arg`. Characters
/// outside the BMP are written as a UTF-16 surrogate pair, which keeps the
/// result valid JSON.
pub fn ascii_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut units = [0u16; 2];
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut units) {
            // Writing to a String cannot fail
            let _ = write!(out, "\\u{:04x}", unit);
        }
    }
    out
}
