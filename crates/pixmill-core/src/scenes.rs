//! Scene specifiers.
//!
//! A scene specifier selects frames of a multi-frame file, as in
//! `image.tif[0,3,5-7]`. Ranges may run backwards (`7-5`) and the list
//! keeps the order it was written in.
//!
//! ```rust
//! use pixmill_core::scenes::SceneSpec;
//!
//! let spec = SceneSpec::parse("0,3,5-7").unwrap();
//! assert_eq!(spec.iter().collect::<Vec<_>>(), vec![0, 3, 5, 6, 7]);
//! assert!(spec.contains(6));
//! assert_eq!((spec.min(), spec.max()), (Some(0), Some(7)));
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// An inclusive run of scene numbers; `start > end` runs backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneRange {
    start: usize,
    end: usize,
}

impl SceneRange {
    /// Creates a range from `start` to `end` inclusive.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Creates a range holding one scene.
    pub fn single(scene: usize) -> Self {
        Self::new(scene, scene)
    }

    /// First scene as written.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last scene as written.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Smallest scene.
    pub fn low(&self) -> usize {
        self.start.min(self.end)
    }

    /// Largest scene.
    pub fn high(&self) -> usize {
        self.start.max(self.end)
    }

    /// Number of scenes.
    pub fn len(&self) -> usize {
        self.high() - self.low() + 1
    }

    /// Always `false`; ranges hold at least one scene.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `scene` lies in the range.
    pub fn contains(&self, scene: usize) -> bool {
        scene >= self.low() && scene <= self.high()
    }

    /// Iterates scenes in written order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = usize>> {
        if self.start <= self.end {
            Box::new(self.start..=self.end)
        } else {
            Box::new((self.end..=self.start).rev())
        }
    }
}

impl fmt::Display for SceneRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parsed comma-separated list of scene ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SceneSpec {
    ranges: Vec<SceneRange>,
}

impl SceneSpec {
    /// Parses `"0,3,5-7"`. Whitespace around items is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidSceneSpecifier(text.to_string());
        let mut ranges = Vec::new();
        for item in text.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let range = match item.split_once('-') {
                Some((a, b)) => {
                    let a = a.trim().parse().map_err(|_| invalid())?;
                    let b = b.trim().parse().map_err(|_| invalid())?;
                    SceneRange::new(a, b)
                }
                None => SceneRange::single(item.parse().map_err(|_| invalid())?),
            };
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Err(invalid());
        }
        Ok(Self { ranges })
    }

    /// Returns `true` if the text looks like a scene list rather than a
    /// geometry (digits, commas, dashes and spaces only).
    pub fn looks_like(text: &str) -> bool {
        !text.trim().is_empty()
            && text
                .chars()
                .all(|c| c.is_ascii_digit() || c == ',' || c == '-' || c == ' ')
    }

    /// Ranges in written order.
    pub fn ranges(&self) -> &[SceneRange] {
        &self.ranges
    }

    /// Returns `true` if any range holds `scene`.
    pub fn contains(&self, scene: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(scene))
    }

    /// Smallest scene named.
    pub fn min(&self) -> Option<usize> {
        self.ranges.iter().map(|r| r.low()).min()
    }

    /// Largest scene named.
    pub fn max(&self) -> Option<usize> {
        self.ranges.iter().map(|r| r.high()).max()
    }

    /// Iterates every named scene in written order; duplicates are kept.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|r| r.iter())
    }
}

impl fmt::Display for SceneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_ranges() {
        let spec = SceneSpec::parse("2").unwrap();
        assert_eq!(spec.iter().collect::<Vec<_>>(), vec![2]);
        let spec = SceneSpec::parse("1-3, 9").unwrap();
        assert_eq!(spec.iter().collect::<Vec<_>>(), vec![1, 2, 3, 9]);
        assert_eq!(spec.to_string(), "1-3,9");
    }

    #[test]
    fn test_descending_range() {
        let spec = SceneSpec::parse("7-5").unwrap();
        assert_eq!(spec.iter().collect::<Vec<_>>(), vec![7, 6, 5]);
        assert_eq!(spec.ranges()[0].len(), 3);
        assert!(spec.contains(6));
    }

    #[test]
    fn test_invalid() {
        assert!(SceneSpec::parse("").is_err());
        assert!(SceneSpec::parse("a-b").is_err());
        assert!(SceneSpec::parse("1-").is_err());
    }

    #[test]
    fn test_looks_like() {
        assert!(SceneSpec::looks_like("0,2,4"));
        assert!(SceneSpec::looks_like("3-5"));
        assert!(!SceneSpec::looks_like("64x64"));
        assert!(!SceneSpec::looks_like(""));
    }
}
