//! Ordered image sequences.
//!
//! [`ImageList`] owns its frames outright; neighbours are addressed by
//! position rather than by links, so a frame can never alias another.
//!
//! ```rust
//! use pixmill_core::{Image, ImageList};
//!
//! let mut list = ImageList::new();
//! for scene in 0..4 {
//!     let mut frame = Image::new(1, 1).unwrap();
//!     frame.scene = scene;
//!     list.append(frame);
//! }
//! let picked = list.clone_by_scenes("0,2-3").unwrap();
//! assert_eq!(picked.iter().map(|i| i.scene).collect::<Vec<_>>(), vec![0, 2, 3]);
//! ```

use std::ops::{Index, IndexMut};

use crate::error::Result;
use crate::image::Image;
use crate::scenes::SceneSpec;

/// Owned sequence of frames.
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    images: Vec<Image>,
}

impl ImageList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a frame at the end.
    pub fn append(&mut self, image: Image) {
        self.images.push(image);
    }

    /// Moves every frame of `other` to the end.
    pub fn append_list(&mut self, other: ImageList) {
        self.images.extend(other.images);
    }

    /// Adds a frame at the front.
    pub fn prepend(&mut self, image: Image) {
        self.images.insert(0, image);
    }

    /// Inserts a frame at `position` (clamped to the length).
    pub fn insert(&mut self, position: usize, image: Image) {
        let position = position.min(self.images.len());
        self.images.insert(position, image);
    }

    /// Removes and returns the frame at `position`.
    pub fn remove(&mut self, position: usize) -> Option<Image> {
        if position < self.images.len() {
            Some(self.images.remove(position))
        } else {
            None
        }
    }

    /// Frame at `position`.
    pub fn get(&self, position: usize) -> Option<&Image> {
        self.images.get(position)
    }

    /// Mutable frame at `position`.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut Image> {
        self.images.get_mut(position)
    }

    /// Frame after `position`.
    pub fn next(&self, position: usize) -> Option<&Image> {
        self.images.get(position.checked_add(1)?)
    }

    /// Frame before `position`.
    pub fn previous(&self, position: usize) -> Option<&Image> {
        self.images.get(position.checked_sub(1)?)
    }

    /// First frame.
    pub fn first(&self) -> Option<&Image> {
        self.images.first()
    }

    /// Mutable first frame.
    pub fn first_mut(&mut self) -> Option<&mut Image> {
        self.images.first_mut()
    }

    /// Last frame.
    pub fn last(&self) -> Option<&Image> {
        self.images.last()
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Drops every frame.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Iterates frames.
    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// Iterates frames mutably.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Image> {
        self.images.iter_mut()
    }

    /// Unwraps into the frame vector.
    pub fn into_vec(self) -> Vec<Image> {
        self.images
    }

    /// Clones the frames whose `scene` matches a specifier such as
    /// `0,3,5-7`, in list order. An empty result is not an error here; the
    /// dispatcher decides what an empty selection means.
    pub fn clone_by_scenes(&self, specifier: &str) -> Result<ImageList> {
        let spec = SceneSpec::parse(specifier)?;
        Ok(self
            .images
            .iter()
            .filter(|image| spec.contains(image.scene))
            .cloned()
            .collect())
    }

    /// Returns `true` when scenes are strictly increasing.
    pub fn scenes_increasing(&self) -> bool {
        self.images.windows(2).all(|w| w[0].scene < w[1].scene)
    }

    /// Renumbers frames `0..len` in list order.
    pub fn normalize_scenes(&mut self) {
        for (scene, image) in self.images.iter_mut().enumerate() {
            image.scene = scene;
        }
    }
}

impl From<Image> for ImageList {
    fn from(image: Image) -> Self {
        Self {
            images: vec![image],
        }
    }
}

impl From<Vec<Image>> for ImageList {
    fn from(images: Vec<Image>) -> Self {
        Self { images }
    }
}

impl FromIterator<Image> for ImageList {
    fn from_iter<T: IntoIterator<Item = Image>>(iter: T) -> Self {
        Self {
            images: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ImageList {
    type Item = Image;
    type IntoIter = std::vec::IntoIter<Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}

impl<'a> IntoIterator for &'a ImageList {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

impl Index<usize> for ImageList {
    type Output = Image;

    fn index(&self, index: usize) -> &Image {
        &self.images[index]
    }
}

impl IndexMut<usize> for ImageList {
    fn index_mut(&mut self, index: usize) -> &mut Image {
        &mut self.images[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(scene: usize) -> Image {
        let mut image = Image::new(1, 1).unwrap();
        image.scene = scene;
        image
    }

    fn scenes(list: &ImageList) -> Vec<usize> {
        list.iter().map(|i| i.scene).collect()
    }

    #[test]
    fn test_append_prepend_insert_remove() {
        let mut list = ImageList::new();
        list.append(frame(1));
        list.prepend(frame(0));
        list.insert(10, frame(3));
        list.insert(2, frame(2));
        assert_eq!(scenes(&list), vec![0, 1, 2, 3]);
        assert_eq!(list.remove(1).map(|i| i.scene), Some(1));
        assert!(list.remove(9).is_none());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_navigation() {
        let list: ImageList = (0..3).map(frame).collect();
        assert_eq!(list.first().map(|i| i.scene), Some(0));
        assert_eq!(list.last().map(|i| i.scene), Some(2));
        assert_eq!(list.next(0).map(|i| i.scene), Some(1));
        assert!(list.next(2).is_none());
        assert!(list.previous(0).is_none());
        assert_eq!(list.previous(2).map(|i| i.scene), Some(1));
    }

    #[test]
    fn test_clone_by_scenes() {
        let list: ImageList = (0..8).map(frame).collect();
        let picked = list.clone_by_scenes("0,3,5-7").unwrap();
        assert_eq!(scenes(&picked), vec![0, 3, 5, 6, 7]);
        assert!(list.clone_by_scenes("20").unwrap().is_empty());
        assert!(list.clone_by_scenes("x").is_err());
        assert_eq!(list.len(), 8);
    }

    #[test]
    fn test_normalize_scenes() {
        let mut list: ImageList = [5, 5, 2].into_iter().map(frame).collect();
        assert!(!list.scenes_increasing());
        list.normalize_scenes();
        assert_eq!(scenes(&list), vec![0, 1, 2]);
        assert!(list.scenes_increasing());
    }

    #[test]
    fn test_clear() {
        let mut list: ImageList = (0..2).map(frame).collect();
        list.clear();
        assert!(list.is_empty());
    }
}
