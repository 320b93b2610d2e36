//! Marker 模板库

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage};
use log::{debug, info};

use crate::core::error::ScanError;
use crate::core::video::frame::Frame;

/// Template image plus optional binary mask, with planes precomputed for matching.
#[derive(Debug, Clone)]
pub struct Marker {
    name: String,
    color: Frame,
    mask: Option<GrayImage>,
    gray: GrayImage,
    planes: [GrayImage; 3],
}

impl Marker {
    pub fn new(name: impl Into<String>, color: Frame, mask: Option<GrayImage>) -> Self {
        let gray = color.to_gray();
        let planes = [color.channel(0), color.channel(1), color.channel(2)];
        Self {
            name: name.into(),
            color,
            mask,
            gray,
            planes,
        }
    }

    pub fn from_rgb(name: impl Into<String>, image: RgbImage) -> Self {
        Self::new(name, Frame::from_image(image), None)
    }

    /// A 4th channel becomes the mask unless every pixel is opaque.
    pub fn from_dynamic(name: impl Into<String>, image: DynamicImage) -> Self {
        let color = Frame::from_image(image.to_rgb8());
        let mask = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let alpha: Vec<u8> = rgba.pixels().map(|p| p[3]).collect();
            if alpha.iter().all(|&a| a == 255) {
                None
            } else {
                GrayImage::from_raw(rgba.width(), rgba.height(), alpha)
            }
        } else {
            None
        };
        Self::new(name, color, mask)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.color.width
    }

    pub fn height(&self) -> u32 {
        self.color.height
    }

    pub fn color(&self) -> &Frame {
        &self.color
    }

    pub fn mask(&self) -> Option<&GrayImage> {
        self.mask.as_ref()
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn plane(&self, index: usize) -> &GrayImage {
        &self.planes[index]
    }
}

/// Read-only name → marker table, loaded once and shared between sessions.
#[derive(Debug, Default, Clone)]
pub struct MarkerStore {
    markers: BTreeMap<String, Arc<Marker>>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.png` in `dir`, keyed by file stem.
    pub fn load_dir(dir: &Path) -> Result<Self, ScanError> {
        if !dir.is_dir() {
            return Err(ScanError::MarkerDirMissing(dir.to_path_buf()));
        }

        let mut store = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_png = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false);
            if !is_png {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let marker = Marker::from_dynamic(name, image::open(&path)?);
            debug!(
                "Loaded marker {} ({}x{}, mask: {})",
                marker.name(),
                marker.width(),
                marker.height(),
                marker.mask().is_some()
            );
            store.insert(marker);
        }

        info!("🎯 MarkerStore: {} markers loaded from {:?}", store.len(), dir);
        Ok(store)
    }

    pub fn insert(&mut self, marker: Marker) {
        self.markers.insert(marker.name.clone(), Arc::new(marker));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Marker>> {
        self.markers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.markers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Marker>)> {
        self.markers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    #[test]
    fn test_opaque_alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let marker = Marker::from_dynamic("opaque", DynamicImage::ImageRgba8(rgba));
        assert!(marker.mask().is_none());
        assert_eq!((marker.width(), marker.height()), (4, 3));
    }

    #[test]
    fn test_transparent_alpha_becomes_mask() {
        let mut rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let marker = Marker::from_dynamic("masked", DynamicImage::ImageRgba8(rgba));

        let mask = marker.mask().unwrap();
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(marker.plane(2).get_pixel(1, 1)[0], 30);
    }

    #[test]
    fn test_load_dir_reads_png_only() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]))
            .save(dir.path().join("formation-icons.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = MarkerStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("formation-icons"));
        assert_eq!(store.get("formation-icons").unwrap().width(), 5);
    }

    #[test]
    fn test_missing_dir() {
        let err = MarkerStore::load_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ScanError::MarkerDirMissing(_)));
    }
}
