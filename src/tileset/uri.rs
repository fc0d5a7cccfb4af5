//! Content URI resolution relative to the referencing document

/// True if `uri` carries a scheme (`https:`, `file:`, `data:` ...)
fn has_scheme(uri: &str) -> bool {
    match uri.find(':') {
        Some(pos) => {
            let scheme = &uri[..pos];
            // A single letter is a Windows drive, not a scheme
            scheme.len() > 1
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Resolve `reference` against the URI of the document that contains it.
///
/// Absolute references (with a scheme or a leading `/`) are returned as is.
/// `.` and `..` segments are collapsed in the relative case.
pub fn resolve_uri(base: &str, reference: &str) -> String {
    if has_scheme(reference) || reference.starts_with('/') {
        return reference.to_string();
    }

    let directory = match base.rfind('/') {
        Some(pos) => &base[..=pos],
        None => "",
    };
    // Keep `scheme://host/` intact while normalizing the path part
    let (prefix, path) = match directory.find("://") {
        Some(pos) => {
            let after = pos + 3;
            let host_end = directory[after..].find('/').map_or(directory.len(), |i| after + i);
            directory.split_at(host_end)
        }
        None => ("", directory),
    };

    let joined = format!("{path}{reference}");
    let absolute = joined.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut resolved = String::from(prefix);
    if absolute {
        resolved.push('/');
    }
    resolved.push_str(&segments.join("/"));
    resolved
}
