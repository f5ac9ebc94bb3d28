//! Insertion-ordered key/value maps for image properties and profiles.
//!
//! Keys are unique and matched case-insensitively (`Comment` and `comment`
//! name the same property); the spelling of the first insertion is kept.
//! Iteration follows insertion order.
//!
//! ```rust
//! use pixmill_core::Properties;
//!
//! let mut props = Properties::new();
//! props.set("tiff:software", "pixmill");
//! props.set("Comment", "hello");
//! props.set("comment", "replaced");
//! assert_eq!(props.get("COMMENT"), Some("replaced"));
//! assert_eq!(props.keys().collect::<Vec<_>>(), ["tiff:software", "Comment"]);
//! ```

/// Ordered textual properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Inserts or replaces a value, keeping the original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Looks up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.entries[i].1.as_str())
    }

    /// Removes a value, returning it.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Returns `true` when the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Embedded profiles keyed by lowercase name (`icc`, `iptc`, `8bim`, `xmp`
/// or a numeric tag such as `tiff:37724`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profiles {
    entries: Vec<(String, Vec<u8>)>,
}

impl Profiles {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a profile.
    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        let name = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = data,
            None => self.entries.push((name, data)),
        }
    }

    /// Looks up a profile.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Removes a profile.
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let name = name.to_ascii_lowercase();
        let i = self.entries.iter().position(|(n, _)| *n == name)?;
        Some(self.entries.remove(i).1)
    }

    /// Iterates profiles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d.as_slice()))
    }

    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_kept_on_replace() {
        let mut p = Properties::new();
        p.set("a", "1");
        p.set("b", "2");
        p.set("A", "3");
        let collected: Vec<_> = p.iter().collect();
        assert_eq!(collected, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_remove() {
        let mut p = Properties::new();
        p.set("EXIF:Orientation", "6");
        assert_eq!(p.remove("exif:orientation").as_deref(), Some("6"));
        assert!(p.is_empty());
        assert_eq!(p.remove("missing"), None);
    }

    #[test]
    fn test_profiles_lowercase_names() {
        let mut profiles = Profiles::new();
        profiles.set("ICC", vec![1, 2, 3]);
        assert_eq!(profiles.get("icc"), Some(&[1u8, 2, 3][..]));
        profiles.set("icc", vec![9]);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles.remove("Icc"), Some(vec![9]));
    }
}
