use std::collections::BTreeMap;

/// Variables a spawned server inherits by default.
#[cfg(not(windows))]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
    "PROGRAMFILES",
];

/// Read-only snapshot of a process environment.
///
/// Entries whose key or value is not valid Unicode are left out of the
/// snapshot rather than recorded as deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Entry whose key matches `key` ignoring ASCII case, as stored.
    pub fn get_ignore_case(&self, key: &str) -> Option<(&str, &str)> {
        self.vars
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look `key` up the way the platform does: case-insensitively on
    /// Windows (where `PATH` is usually stored as `Path`), exactly elsewhere.
    pub fn var(&self, key: &str) -> Option<(&str, &str)> {
        if cfg!(windows) {
            self.get_ignore_case(key)
        } else {
            self.vars.get_key_value(key).map(|(k, v)| (k.as_str(), v.as_str()))
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Platform baseline taken from `snapshot`.
///
/// Keys keep the spelling found in the snapshot so that the later merge
/// never holds both `PATH` and `Path`. Values starting with `()` are
/// exported shell functions and are skipped.
pub fn default_environment(snapshot: &Environment) -> BTreeMap<String, String> {
    DEFAULT_INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| {
            let (key, value) = snapshot.var(key)?;
            if value.starts_with("()") {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Baseline, then every snapshot entry, then `overrides`; later layers win.
pub fn merged_environment(
    snapshot: &Environment,
    overrides: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut env = default_environment(snapshot);
    env.extend(snapshot.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    if let Some(overrides) = overrides {
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    env
}
