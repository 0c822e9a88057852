use std::fs;
use std::path::Path;

use image::DynamicImage;
use tracing::{debug, info};

use crate::{MapError, Zone, ZoneMap, ZONE_COLORS};

/// Whether the encoded map gets an impassable ring around it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Border {
    #[default]
    Cliff,
    None,
}

/// Classifies every pixel of `img` into a zone.
pub fn encode_image(img: &DynamicImage, border: Border) -> ZoneMap {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut map = ZoneMap::new(height as usize, width as usize, Zone::Cliff);
    for (col, row, pixel) in rgb.enumerate_pixels() {
        map.cells[row as usize][col as usize] = Zone::from_color(*pixel);
    }

    match border {
        Border::Cliff => map.with_cliff_border(),
        Border::None => map,
    }
}

pub fn open_image(image_path: &Path) -> Result<DynamicImage, MapError> {
    image::open(image_path).map_err(|source| MapError::ImageRead {
        path: image_path.to_path_buf(),
        source,
    })
}

/// Reads `image_path` and renders it as map text.
pub fn encode(image_path: &Path, border: Border) -> Result<String, MapError> {
    let img = open_image(image_path)?;
    Ok(encode_image(&img, border).to_string())
}

/// Encodes `image_path` and writes the result to `map_path`, replacing any
/// existing file.
pub fn encode_to_file(
    image_path: &Path,
    map_path: &Path,
    border: Border,
) -> Result<ZoneMap, MapError> {
    info!(
        image = %image_path.display(),
        map = %map_path.display(),
        "encoding map"
    );
    for (color, zone) in ZONE_COLORS {
        debug!(zone = ?zone, color = ?color.0, "zone color");
    }

    let img = open_image(image_path)?;
    debug!(width = img.width(), height = img.height(), "image loaded");
    let map = encode_image(&img, border);

    if let Some(parent) = map_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| MapError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(map_path, map.to_string()).map_err(|source| MapError::Io {
        path: map_path.to_path_buf(),
        source,
    })?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CLIFF_COLOR, OPEN_COLOR, ROAD_COLOR, TREE_COLOR};
    use chrono::Utc;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pathlab_encode_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    fn striped_image() -> RgbImage {
        let palette = [OPEN_COLOR, ROAD_COLOR, TREE_COLOR, CLIFF_COLOR];
        RgbImage::from_fn(5, 3, |x, y| palette[((x + y) % 4) as usize])
    }

    #[test]
    fn unbordered_encoding_preserves_zone_per_pixel() {
        let img = striped_image();
        let text = encode_image(&DynamicImage::ImageRgb8(img.clone()), Border::None).to_string();
        let decoded: ZoneMap = text.parse().expect("encoded map parses");

        assert_eq!(decoded.height, 3);
        assert_eq!(decoded.width, 5);
        for (x, y, pixel) in img.enumerate_pixels() {
            assert_eq!(
                decoded.get(y as usize, x as usize),
                Some(Zone::from_color(*pixel)),
                "pixel ({}, {})",
                x,
                y
            );
        }
    }

    #[test]
    fn unknown_colors_become_cliff() {
        let mut img = RgbImage::from_pixel(2, 1, OPEN_COLOR);
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let map = encode_image(&DynamicImage::ImageRgb8(img), Border::None);
        assert_eq!(map.to_string(), "1 2\nOC\n");
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([30, 147, 45, 10]));
        let map = encode_image(&DynamicImage::ImageRgba8(img), Border::None);
        assert_eq!(map.get(0, 0), Some(Zone::Tree));
    }

    #[test]
    fn bordered_encoding_adds_cliff_ring() {
        let (w, h) = (4usize, 2usize);
        let img = RgbImage::from_pixel(w as u32, h as u32, ROAD_COLOR);
        let text = encode_image(&DynamicImage::ImageRgb8(img), Border::Cliff).to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], format!("{} {}", h + 2, w + 2));
        assert_eq!(lines.len(), h + 3);
        assert_eq!(lines[1], "C".repeat(w + 2));
        assert_eq!(lines[h + 2], "C".repeat(w + 2));
        for line in &lines[2..h + 2] {
            assert_eq!(line.len(), w + 2);
            assert!(line.starts_with('C') && line.ends_with('C'));
            assert_eq!(&line[1..w + 1], "R".repeat(w));
        }
    }

    #[test]
    fn encode_to_file_overwrites_and_is_deterministic() {
        let dir = temp_dir("file");
        let image_path = dir.join("terrain.png");
        striped_image().save(&image_path).expect("save png");
        let map_path = dir.join("maps").join("terrain.map");
        fs::create_dir_all(map_path.parent().expect("parent")).expect("mkdir");
        fs::write(&map_path, "stale").expect("write stale");

        let map = encode_to_file(&image_path, &map_path, Border::Cliff).expect("encode");
        let first = fs::read_to_string(&map_path).expect("read map");
        assert_eq!(first, map.to_string());
        assert_eq!(first, encode(&image_path, Border::Cliff).expect("encode again"));
        assert!(first.starts_with("5 7\n"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = temp_dir("bad");
        let image_path = dir.join("not_an_image.png");
        fs::write(&image_path, b"definitely not a png").expect("write");

        let err = encode_to_file(&image_path, &dir.join("out.map"), Border::Cliff)
            .expect_err("garbage must not decode");
        assert!(matches!(err, MapError::ImageRead { .. }));
        assert!(!dir.join("out.map").exists());

        let missing = encode(&dir.join("missing.png"), Border::None).expect_err("missing file");
        assert!(matches!(missing, MapError::ImageRead { .. }));
        let _ = fs::remove_dir_all(dir);
    }
}
