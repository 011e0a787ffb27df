//! Login-token extraction from gateway markup.
//!
//! The gateway embeds a one-time token as `<param>=<token>` somewhere in the
//! login page (usually a form action or redirect link). There is no schema
//! for this; everything that depends on the page shape lives here.

/// Extract the value of the last `<param>=<token>` occurrence in `text`.
///
/// Token characters are ASCII alphanumerics, `_` and `-`. An occurrence whose
/// value is empty is skipped in favour of an earlier one. `param` must not be
/// the tail of a longer identifier (`xreq=` does not match `req`).
pub fn extract_login_token(text: &str, param: &str) -> Option<String> {
    if param.is_empty() {
        return None;
    }
    let needle = format!("{param}=");
    let bytes = text.as_bytes();

    let mut end = text.len();
    while let Some(pos) = text[..end].rfind(&needle) {
        end = pos;

        let preceded_by_ident =
            pos > 0 && (bytes[pos - 1].is_ascii_alphanumeric() || bytes[pos - 1] == b'_');
        if preceded_by_ident {
            continue;
        }

        let start = pos + needle.len();
        let len = bytes[start..].iter().take_while(|b| is_token_byte(**b)).count();
        if len > 0 {
            return Some(text[start..start + len].to_string());
        }
    }
    None
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}
