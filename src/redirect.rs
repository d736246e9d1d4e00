//! `Location` handling for redirects.
//!
//! Absolute URLs (with a scheme or a `//host` prefix) pass through. Anything
//! else is a path, resolved against the directory of the request path and
//! cleaned of `.`, `..` and repeated slashes. A trailing slash and the
//! query string survive cleaning.

/// Resolves `target` against `request_path`. The result is not yet escaped.
pub(crate) fn resolve(request_path: &str, target: &str) -> String {
    if has_scheme(target) || target.starts_with("//") {
        return target.to_owned();
    }

    let current = if request_path.is_empty() { "/" } else { request_path };
    let joined = if target.starts_with('/') {
        target.to_owned()
    } else {
        let dir = current.rfind('/').map_or("", |i| &current[..=i]);
        format!("{dir}{target}")
    };

    let (path, query) = match joined.find('?') {
        Some(i) => joined.split_at(i),
        None => (joined.as_str(), ""),
    };

    let mut cleaned = clean(path);
    if path.ends_with('/') && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned.push_str(query);
    cleaned
}

/// Percent-escapes every byte outside ASCII so the value is a legal header.
pub(crate) fn escape_non_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b.is_ascii() {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// RFC 3986 scheme: a letter, then letters, digits, `+`, `-` or `.`, then `:`.
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lexical path cleaning: no filesystem access, no symlink resolution.
fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}
