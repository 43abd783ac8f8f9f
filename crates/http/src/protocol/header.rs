//! Ordered header container shared by requests and responses.
//!
//! Unlike `http::HeaderMap`, [`Headers`] keeps every field in arrival order,
//! including the relative order of different names. Lookups are
//! case-insensitive through the lowercased [`HeaderName`], while the name as
//! received and the value are kept byte-for-byte.

use bytes::Bytes;
use http::HeaderName;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: HeaderName,
    /// Name with the casing it was received with, `None` when set by the application
    received_name: Option<Bytes>,
    value: Bytes,
}

impl Field {
    fn new(name: HeaderName, value: Bytes) -> Self {
        Self { name, received_name: None, value }
    }

    fn original_name(&self) -> &str {
        self.received_name.as_deref().and_then(|raw| std::str::from_utf8(raw).ok()).unwrap_or(self.name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Field>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Appends a field, keeping any existing field with the same name.
    pub fn append(&mut self, name: HeaderName, value: impl Into<Bytes>) {
        self.entries.push(Field::new(name, value.into()));
    }

    /// Appends a field parsed from the wire, `received_name` keeps its original casing.
    pub(crate) fn append_received(&mut self, name: HeaderName, received_name: Bytes, value: Bytes) {
        self.entries.push(Field { name, received_name: Some(received_name), value });
    }

    /// Replaces every field named `name` with a single one.
    ///
    /// The new field takes the position of the first replaced one, or goes last
    /// if there was none.
    pub fn insert(&mut self, name: HeaderName, value: impl Into<Bytes>) {
        let value = value.into();
        match self.entries.iter().position(|field| field.name == name) {
            Some(index) => {
                self.entries[index] = Field::new(name.clone(), value);
                let mut seen = 0usize;
                self.entries.retain(|field| {
                    if field.name != name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.entries.push(Field::new(name, value)),
        }
    }

    /// Removes every field named `name`, returns true if any was present.
    pub fn remove<N: AsRef<str>>(&mut self, name: N) -> bool {
        let before = self.entries.len();
        self.entries.retain(|field| !field.name.as_str().eq_ignore_ascii_case(name.as_ref()));
        before != self.entries.len()
    }

    /// Returns the first value of `name`.
    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Bytes> {
        self.get_all(name).next()
    }

    /// Returns the first value of `name` if it is valid UTF-8.
    pub fn get_str<N: AsRef<str>>(&self, name: N) -> Option<&str> {
        self.get(name).and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Returns every value of `name`, in arrival order.
    pub fn get_all<N: AsRef<str>>(&self, name: N) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().filter(move |field| field.name.as_str().eq_ignore_ascii_case(name.as_ref())).map(|field| &field.value)
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.get(name).is_some()
    }

    /// Checks whether any value of `name`, read as a comma separated list,
    /// contains `token` (case-insensitive), e.g. `Connection: keep-alive, close`.
    pub fn contains_token<N: AsRef<str>>(&self, name: N, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|value| value.split(|b| *b == b','))
            .any(|item| item.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
    }

    /// Iterates over fields in order, names with the casing they were received with.
    ///
    /// Fields added by the application report the lowercased [`HeaderName`].
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|field| (field.original_name(), &field.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(HeaderName, Bytes)> for Headers {
    fn from_iter<T: IntoIterator<Item = (HeaderName, Bytes)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(name, value)| Field::new(name, value)).collect() }
    }
}
