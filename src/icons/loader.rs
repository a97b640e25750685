use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use image::{ImageReader, RgbaImage};
use tiny_skia::{Pixmap, Transform};

use crate::error::ExtractionError;

/// Rasterizes an icon file at `size` pixels (aspect ratio preserved).
pub fn load_icon(path: &Path, size: u32) -> Result<RgbaImage, ExtractionError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "svg" | "svgz" => load_svg(path, size),
        _ => load_raster(path, size),
    }
}

fn decode_error(path: &Path, message: impl ToString) -> ExtractionError {
    ExtractionError::Decode {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn load_raster(path: &Path, size: u32) -> Result<RgbaImage, ExtractionError> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| decode_error(path, e))?;
    let img = if img.width() == size && img.height() == size {
        img
    } else {
        img.resize(size, size, FilterType::Lanczos3)
    };
    Ok(img.into_rgba8())
}

fn load_svg(path: &Path, size: u32) -> Result<RgbaImage, ExtractionError> {
    let opt = resvg::usvg::Options::default();
    let svg_data = fs::read(path)?;
    let tree = resvg::usvg::Tree::from_data(&svg_data, &opt).map_err(|e| decode_error(path, e))?;

    let mut pixmap = Pixmap::new(size, size).ok_or_else(|| decode_error(path, "zero-sized icon"))?;
    let transform = Transform::from_scale(
        size as f32 / tree.size().width(),
        size as f32 / tree.size().height(),
    );

    resvg::render(&tree, transform, &mut pixmap.as_mut());
    Ok(pixmap_to_rgba(&pixmap))
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut rgba = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in rgba.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_icons_are_scaled_to_the_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbaImage::from_pixel(128, 128, image::Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let icon = load_icon(&path, 32).unwrap();
        assert_eq!(icon.dimensions(), (32, 32));
    }

    #[test]
    fn svg_icons_are_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.svg");
        fs::write(
            &path,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"><rect width="16" height="16" fill="#ff0000"/></svg>"##,
        )
        .unwrap();

        let icon = load_icon(&path, 24).unwrap();
        assert_eq!(icon.dimensions(), (24, 24));
        assert_eq!(icon.get_pixel(12, 12).0, [255, 0, 0, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"definitely not an image").unwrap();
        assert!(load_icon(&path, 32).is_err());
    }
}
