//! Ordered, case-insensitive header storage.

use std::fmt;

use http_types::headers::HeaderName;

/// HTTP header fields.
///
/// Names compare case-insensitively; iteration yields fields in insertion
/// order, with repeated names kept as separate fields.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(HeaderName, String)>,
}

fn same(a: &HeaderName, b: &HeaderName) -> bool {
    a.as_str().eq_ignore_ascii_case(b.as_str())
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first value stored for `name`.
    pub fn get(&self, name: impl Into<HeaderName>) -> Option<&str> {
        let name = name.into();
        self.fields
            .iter()
            .find(|(n, _)| same(n, &name))
            .map(|(_, v)| v.as_str())
    }

    /// The last value stored for `name`.
    pub fn last(&self, name: impl Into<HeaderName>) -> Option<&str> {
        let name = name.into();
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| same(n, &name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored for `name`, in insertion order.
    pub fn get_all(&self, name: impl Into<HeaderName>) -> Vec<&str> {
        let name = name.into();
        self.fields
            .iter()
            .filter(|(n, _)| same(n, &name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether any field is named `name`.
    pub fn contains(&self, name: impl Into<HeaderName>) -> bool {
        let name = name.into();
        self.fields.iter().any(|(n, _)| same(n, &name))
    }

    /// Replace all fields named `name` with a single value.
    ///
    /// The replacement keeps the position of the first existing field.
    pub fn insert(&mut self, name: impl Into<HeaderName>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.fields.iter().position(|(n, _)| same(n, &name)) {
            Some(idx) => {
                self.fields[idx].1 = value;
                let mut i = idx + 1;
                while i < self.fields.len() {
                    if same(&self.fields[i].0, &name) {
                        self.fields.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.fields.push((name, value)),
        }
    }

    /// Add a field without touching existing ones.
    pub fn append(&mut self, name: impl Into<HeaderName>, value: impl ToString) {
        self.fields.push((name.into(), value.to_string()));
    }

    /// Remove all fields named `name`, returning whether any existed.
    pub fn remove(&mut self, name: impl Into<HeaderName>) -> bool {
        let name = name.into();
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !same(n, &name));
        before != self.fields.len()
    }

    /// Whether `name` carries `token` in its comma-separated value list.
    pub fn has_token(&self, name: impl Into<HeaderName>, token: &str) -> bool {
        let name = name.into();
        self.fields
            .iter()
            .filter(|(n, _)| same(n, &name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &str)> {
        self.fields.iter().map(|(n, v)| (n, v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(n, v)| (n.as_str(), v)))
            .finish()
    }
}
