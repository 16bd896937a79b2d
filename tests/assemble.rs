use formfill::raster::{RASTER_DPI, assemble_pdf};
use image::{Rgb, RgbImage};
use lopdf::Document;

#[test]
fn one_page_per_raster_at_physical_size() {
    // 8.5 x 11 in at 300 DPI -> US Letter in points.
    let letter = RgbImage::from_pixel(2550, 3300, Rgb([255, 255, 255]));
    let half = RgbImage::from_pixel(600, 300, Rgb([0, 0, 0]));
    let bytes = assemble_pdf(&[letter, half], RASTER_DPI, 100).unwrap();

    let doc = Document::load_mem(&bytes).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 2);

    let media_box = |n: u32| -> Vec<f32> {
        doc.get_dictionary(pages[&n])
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    };
    assert_eq!(media_box(1), vec![0.0, 0.0, 612.0, 792.0]);
    assert_eq!(media_box(2), vec![0.0, 0.0, 144.0, 72.0]);
}

#[test]
fn pages_embed_a_jpeg_image() {
    let img = RgbImage::from_pixel(30, 20, Rgb([200, 10, 10]));
    let bytes = assemble_pdf(&[img], RASTER_DPI, 90).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();

    let image = doc
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .find(|s| s.dict.get(b"Subtype").and_then(|v| v.as_name()).ok() == Some(b"Image".as_slice()))
        .expect("image XObject");
    assert_eq!(image.dict.get(b"Width").unwrap().as_i64().unwrap(), 30);
    assert_eq!(image.dict.get(b"Height").unwrap().as_i64().unwrap(), 20);
    assert_eq!(
        image.dict.get(b"Filter").unwrap().as_name().unwrap(),
        b"DCTDecode".as_slice()
    );
    // JPEG SOI marker.
    assert_eq!(&image.content[..2], &[0xFF, 0xD8]);
}

#[test]
fn no_pages_is_an_error() {
    assert!(assemble_pdf(&[], RASTER_DPI, 100).is_err());
}
