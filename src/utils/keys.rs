use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;

/// Characters left readable in object keys on top of alphanumerics.
const KEY_SAFE: &percent_encoding::AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Derive the object key for an uploaded file: a category prefix from
/// the extension, then the percent-encoded bare file name. Path
/// components are stripped so a hostile file name cannot escape its
/// prefix.
pub fn derive_key(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed");

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let prefix = match extension.as_str() {
        "csv" | "xlsx" => "spreadsheets",
        "jpg" | "jpeg" | "png" => "images",
        "pdf" => "pdfs",
        "gif" => "gifs",
        "mp4" | "avi" | "m4a" | "mkv" => "videos",
        "mp3" | "wav" | "ogg" => "musics",
        _ => "misc",
    };

    let encoded = utf8_percent_encode(name, KEY_SAFE);
    format!("{}/{}", prefix, encoded)
}

/// Content type for an upload: sniffed from the payload's leading
/// bytes, with `application/octet-stream` as the fallback for anything
/// unrecognized.
pub fn sniff_content_type(head: &[u8]) -> String {
    match infer::get(head) {
        Some(kind) => kind.mime_type().to_string(),
        None => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_prefixes() {
        assert_eq!(derive_key("report.csv"), "spreadsheets/report.csv");
        assert_eq!(derive_key("budget.XLSX"), "spreadsheets/budget.XLSX");
        assert_eq!(derive_key("photo.jpeg"), "images/photo.jpeg");
        assert_eq!(derive_key("scan.pdf"), "pdfs/scan.pdf");
        assert_eq!(derive_key("loop.gif"), "gifs/loop.gif");
        assert_eq!(derive_key("clip.mp4"), "videos/clip.mp4");
        assert_eq!(derive_key("song.mp3"), "musics/song.mp3");
        assert_eq!(derive_key("notes.txt"), "misc/notes.txt");
        assert_eq!(derive_key("README"), "misc/README");
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(derive_key("../../etc/passwd"), "misc/passwd");
        assert_eq!(derive_key("nested/dir/cat.png"), "images/cat.png");
    }

    #[test]
    fn test_unsafe_characters_are_encoded() {
        assert_eq!(derive_key("my report.csv"), "spreadsheets/my%20report.csv");
        assert_eq!(derive_key("a+b.txt"), "misc/a%2Bb.txt");
    }

    #[test]
    fn test_sniff_recognizes_common_formats() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(sniff_content_type(&png_header), "image/png");

        let pdf_header = b"%PDF-1.7 rest of document";
        assert_eq!(sniff_content_type(pdf_header), "application/pdf");
    }

    #[test]
    fn test_sniff_falls_back_to_octet_stream() {
        assert_eq!(
            sniff_content_type(b"nothing recognizable"),
            "application/octet-stream"
        );
        assert_eq!(sniff_content_type(&[]), "application/octet-stream");
    }
}
