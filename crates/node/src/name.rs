//! Graph name validation, cleaning, and resolution.
//!
//! A graph name is empty, absolute (`/...`), relative, or private (`~...`).
//! Characters after position 0 must be alphanumeric, `/`, or `_`.

use crate::remap::RemapTable;

#[derive(Debug)]
pub enum NameError {
    Invalid(String),
}

impl std::error::Error for NameError {}

impl std::fmt::Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(name) => write!(f, "invalid graph name: {name}"),
        }
    }
}

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '/' || c == '_'
}

/// Validates a raw (unresolved) graph name.
///
/// # Test
///
/// ```
/// use graphnode::name::validate;
///
/// assert!(validate("").is_ok());
/// assert!(validate("/foo/bar").is_ok());
/// assert!(validate("~private").is_ok());
/// assert!(validate("foo bar").is_err());
/// ```
pub fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Ok(());
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphanumeric() || first == '/' || first == '~' || first == '_') {
        return Err(NameError::Invalid(name.to_string()));
    }

    // `~` is only meaningful at position 0.
    if !chars.all(is_valid_char) {
        return Err(NameError::Invalid(name.to_string()));
    }

    Ok(())
}

/// Collapses duplicate `/` separators and strips a trailing `/`, except for
/// the bare root name.
///
/// # Test
///
/// ```
/// use graphnode::name::clean;
///
/// assert_eq!(clean("/foo//bar/"), "/foo/bar");
/// assert_eq!(clean("/"), "/");
/// assert_eq!(clean(""), "");
/// ```
pub fn clean(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(name.len());
    let mut last_was_slash = false;
    for c in name.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }

    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }

    out
}

/// Returns the parent of a resolved graph name.
///
/// # Test
///
/// ```
/// use graphnode::name::parent;
///
/// assert_eq!(parent("/foo/bar"), "/foo");
/// assert_eq!(parent("/foo"), "/");
/// assert_eq!(parent("/"), "/");
/// ```
pub fn parent(name: &str) -> String {
    if name == "/" || name.is_empty() {
        return "/".to_string();
    }

    match name.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => name[..index].to_string(),
        None => "/".to_string(),
    }
}

/// Appends a relative child name onto a resolved namespace.
///
/// # Test
///
/// ```
/// use graphnode::name::append;
///
/// assert_eq!(append("/foo", "bar"), "/foo/bar");
/// assert_eq!(append("/", "bar"), "/bar");
/// ```
pub fn append(namespace: &str, child: &str) -> String {
    if namespace == "/" || namespace.is_empty() {
        format!("/{child}")
    } else {
        format!("{namespace}/{child}")
    }
}

/// Resolves a graph name against a namespace and node name, then applies
/// the remap table.
///
/// `~name` resolves against `<node_name>/name`; a relative name is prefixed
/// with `namespace`; the result is cleaned then remapped.
///
/// # Test
///
/// ```
/// use graphnode::name::resolve;
/// use graphnode::remap::RemapTable;
///
/// let remap = RemapTable::default();
/// assert_eq!(resolve("bar", "/ns", "/ns/talker", &remap).unwrap(), "/ns/bar");
/// assert_eq!(resolve("/bar", "/ns", "/ns/talker", &remap).unwrap(), "/bar");
/// assert_eq!(resolve("~bar", "/ns", "/ns/talker", &remap).unwrap(), "/ns/talker/bar");
/// ```
pub fn resolve(name: &str, namespace: &str, node_name: &str, remap: &RemapTable) -> Result<String, NameError> {
    validate(name)?;

    let resolved = if let Some(rest) = name.strip_prefix('~') {
        append(node_name, rest)
    } else if name.starts_with('/') || name.is_empty() {
        name.to_string()
    } else {
        append(namespace, name)
    };

    let cleaned = clean(&resolved);
    Ok(remap.apply(&cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_characters() {
        assert!(validate("foo.bar").is_err());
        assert!(validate("foo bar").is_err());
        assert!(validate("foo~bar").is_err());
    }

    #[test]
    fn resolution_round_trips_through_clean() {
        let remap = RemapTable::default();
        for (name, ns, node) in [("a/b", "/ns", "/ns/n"), ("/a/b", "/other", "/other/n"), ("~c", "/ns", "/ns/n")] {
            let resolved = resolve(name, ns, node, &remap).unwrap();
            assert!(resolved.is_empty() || resolved.starts_with('/'));
            assert!(!resolved.contains("//"));
            assert!(resolved == "/" || !resolved.ends_with('/'));
        }
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(parent("/foo"), "/");
        assert_eq!(parent("/"), "/");
    }
}
