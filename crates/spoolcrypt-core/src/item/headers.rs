//! Per-item header storage.

/// Headers that arrived with an item's part of the upload.
///
/// Names compare case-insensitively; the first spelling seen is kept for
/// [`header_names`](Self::header_names), and values keep arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl ItemHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `name`.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// First value recorded for `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value recorded for `name`, oldest first.
    pub fn headers<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.values(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn values(&self, name: &str) -> Option<&Vec<String>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }
}

impl<K, V> FromIterator<(K, V)> for ItemHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = ItemHeaders::new();
        for (name, value) in iter {
            headers.add_header(name, value);
        }
        headers
    }
}
