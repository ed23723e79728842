//! Interface name accumulator.
//!
//! Enumeration results are collected into a single NUL-delimited buffer,
//! `name\0name\0...\0\0`, the shape `wg(8)` style callers walk until they hit
//! an empty entry.

use crate::error::{Error, Result};

/// Growable list of interface names stored as one NUL-delimited buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameList {
    /// Always ends with the terminating empty entry.
    buf: Vec<u8>,
}

impl Default for NameList {
    fn default() -> Self {
        Self::new()
    }
}

impl NameList {
    /// Create an empty list (the one-byte buffer `\0`).
    pub fn new() -> Self {
        Self { buf: vec![0] }
    }

    /// Append a name. Empty names are ignored.
    ///
    /// On allocation failure the list keeps its previous entries.
    pub fn add(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        let needed = self.buf.len() + name.len() + 1;
        if needed > self.buf.capacity() {
            let target = needed.max(self.buf.capacity().saturating_mul(2));
            self.buf
                .try_reserve_exact(target - self.buf.len())
                .map_err(|_| Error::OutOfMemory)?;
        }

        // Overwrite the old terminator with the new entry.
        self.buf.pop();
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
        self.buf.push(0);
        Ok(())
    }

    /// Append every name from another list, keeping order.
    pub fn extend_from(&mut self, other: &NameList) -> Result<()> {
        for name in other.iter() {
            self.add(name)?;
        }
        Ok(())
    }

    /// The raw `name\0...\0\0` buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Iterate over the names in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.buf[..self.buf.len() - 1]
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .filter_map(|s| std::str::from_utf8(s).ok())
    }

    /// Number of names in the list.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the list holds no names.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == 1
    }

    /// Check if a name is in the list.
    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|n| n == name)
    }

    /// Collect the names into owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        let names = NameList::new();
        assert_eq!(names.as_bytes(), b"\0");
        assert!(names.is_empty());
        assert_eq!(names.len(), 0);
        assert_eq!(names.iter().count(), 0);
    }

    #[test]
    fn test_add_names() {
        let mut names = NameList::new();
        names.add("wg0").unwrap();
        names.add("").unwrap();
        names.add("wg1").unwrap();

        assert_eq!(names.as_bytes(), b"wg0\0wg1\0\0");
        assert_eq!(names.len(), 2);
        assert_eq!(names.to_vec(), vec!["wg0", "wg1"]);
        assert!(names.contains("wg1"));
        assert!(!names.contains("wg2"));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut names = NameList::new();
        names.add("wg0").unwrap();
        names.add("wg0").unwrap();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_many_names_grow() {
        let mut names = NameList::new();
        for i in 0..1000 {
            names.add(&format!("wg{}", i)).unwrap();
        }
        assert_eq!(names.len(), 1000);
        assert_eq!(names.iter().last(), Some("wg999"));
        assert_eq!(names.as_bytes().last(), Some(&0));
    }

    #[test]
    fn test_extend_from() {
        let mut kernel = NameList::new();
        kernel.add("wg0").unwrap();
        let mut user = NameList::new();
        user.add("utun3").unwrap();

        kernel.extend_from(&user).unwrap();
        assert_eq!(kernel.to_vec(), vec!["wg0", "utun3"]);
    }
}
