//! Remap table: `name:=value` command-line arguments, plus the four
//! special double-underscore keys.

use crate::name::{append, clean};

#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: Vec<(String, String)>,
    pub node_name: Option<String>,
    pub namespace: Option<String>,
    pub advertised_host: Option<String>,
    pub directory_uri: Option<String>,
}

/// Resolves one side of a `from:=to` entry against a namespace/node name,
/// the same way an ordinary graph name resolves (§4.1), but without
/// consulting the remap table itself — an entry can't remap its own sides.
fn resolve_side(raw: &str, namespace: &str, node_name: &str) -> String {
    let resolved = if let Some(rest) = raw.strip_prefix('~') {
        append(node_name, rest)
    } else if raw.starts_with('/') || raw.is_empty() {
        raw.to_string()
    } else {
        append(namespace, raw)
    };
    clean(&resolved)
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name:=value` arguments. Special keys (`__name`, `__ns`,
    /// `__ip`/`__hostname`, `__master`) are routed to their dedicated
    /// slots rather than the ordered remap list. Entries whose left-hand
    /// side starts with a single underscore (but is not one of the
    /// double-underscore special keys) are dropped, per the private
    /// parameter convention. Both sides of every surviving entry are
    /// resolved against the resulting namespace/node name before being
    /// stored, so `apply` only ever needs to match already-resolved names.
    ///
    /// # Test
    ///
    /// ```
    /// use graphnode::remap::RemapTable;
    ///
    /// let table = RemapTable::parse_args(&[
    ///     "__name:=talker".to_string(),
    ///     "__ns:=/robot".to_string(),
    ///     "chatter:=/voice".to_string(),
    ///     "_private:=ignored".to_string(),
    /// ]);
    ///
    /// assert_eq!(table.node_name.as_deref(), Some("talker"));
    /// assert_eq!(table.namespace.as_deref(), Some("/robot"));
    /// assert_eq!(table.apply("/robot/chatter"), "/voice");
    /// ```
    pub fn parse_args(args: &[String]) -> Self {
        let mut table = Self::new();
        let mut raw_entries: Vec<(String, String)> = Vec::new();

        for arg in args {
            let Some((key, value)) = arg.split_once(":=") else {
                continue;
            };

            match key {
                "__name" => table.node_name = Some(value.to_string()),
                "__ns" => table.namespace = Some(value.to_string()),
                "__ip" | "__hostname" => table.advertised_host = Some(value.to_string()),
                "__master" => table.directory_uri = Some(value.to_string()),
                _ if key.starts_with("__") => raw_entries.push((key.to_string(), value.to_string())),
                _ if key.starts_with('_') => continue,
                _ => raw_entries.push((key.to_string(), value.to_string())),
            }
        }

        let namespace = table.namespace.clone().unwrap_or_else(|| "/".to_string());
        let node_name = table.node_name.clone().unwrap_or_else(|| "/".to_string());
        table.entries = raw_entries
            .into_iter()
            .map(|(from, to)| (resolve_side(&from, &namespace, &node_name), resolve_side(&to, &namespace, &node_name)))
            .collect();

        table
    }

    /// Applies the first matching remap entry to `name`. Idempotent: a
    /// name that is already a remap target is left unchanged as long as no
    /// entry maps it further. `name` is expected to already be resolved
    /// (absolute), as `name::resolve` does before calling this.
    pub fn apply(&self, name: &str) -> String {
        for (from, to) in &self.entries {
            if from == name {
                return to.clone();
            }
        }
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_is_idempotent_on_already_remapped_names() {
        let table = RemapTable::parse_args(&["a:=b".to_string()]);
        let once = table.apply("/a");
        let twice = table.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn double_underscore_keys_survive_while_single_underscore_keys_are_dropped() {
        let table = RemapTable::parse_args(&["__name:=n".to_string(), "_hidden:=x".to_string()]);
        assert_eq!(table.node_name.as_deref(), Some("n"));
        assert_eq!(table.apply("_hidden"), "_hidden");
    }

    #[test]
    fn entries_resolve_against_the_declared_namespace() {
        let table = RemapTable::parse_args(&["__ns:=/robot".to_string(), "chatter:=voice".to_string()]);
        assert_eq!(table.apply("/robot/chatter"), "/robot/voice");
    }
}
