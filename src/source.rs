// source.rs - Selected input files and their media types

use image::ImageFormat;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Avif,
    Unknown,
}

impl MediaType {
    pub fn from_extension(ext: &str) -> Self {
        ImageFormat::from_extension(ext)
            .map(Self::from_format)
            .unwrap_or(Self::Unknown)
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .map(|ext| Self::from_extension(&ext.to_string_lossy()))
            .unwrap_or(Self::Unknown)
    }

    /// Detect the type from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        image::guess_format(bytes)
            .map(Self::from_format)
            .unwrap_or(Self::Unknown)
    }

    fn from_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => Self::Png,
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Gif => Self::Gif,
            ImageFormat::WebP => Self::Webp,
            ImageFormat::Bmp => Self::Bmp,
            ImageFormat::Tiff => Self::Tiff,
            ImageFormat::Avif => Self::Avif,
            _ => Self::Unknown,
        }
    }

    /// Whether files of this type can carry an alpha channel. Unknown types
    /// are treated as possibly transparent.
    pub fn may_have_transparency(&self) -> bool {
        matches!(
            self,
            Self::Png | Self::Gif | Self::Webp | Self::Tiff | Self::Avif | Self::Unknown
        )
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
            Self::Unknown => "img",
        }
    }
}

#[derive(Debug, Clone)]
enum SourceContent {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// One image selected for conversion. Cloning is cheap; bytes on disk are only
/// read when the file's turn comes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    media_type: MediaType,
    content: SourceContent,
}

impl SourceFile {
    pub fn from_bytes(name: impl Into<String>, media_type: MediaType, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type,
            content: SourceContent::Memory(bytes.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Self {
            name,
            media_type: MediaType::from_path(&path),
            content: SourceContent::Disk(path),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[cfg(test)]
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            SourceContent::Disk(path) => Some(path),
            SourceContent::Memory(_) => None,
        }
    }

    /// File name with its last extension removed.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(dot) if dot > 0 => &self.name[..dot],
            _ => &self.name,
        }
    }

    pub fn read_bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match &self.content {
            SourceContent::Memory(bytes) => Ok(Cow::Borrowed(&bytes[..])),
            SourceContent::Disk(path) => fs::read(path).map(Cow::Owned),
        }
    }
}

/// Image files under `path` (the file itself, or everything below a folder),
/// sorted by path.
pub fn collect_images(path: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();

    if path.is_file() && is_image_file(path) {
        images.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && is_image_file(path) {
                images.push(path.to_path_buf());
            }
        }
    }

    images
}

pub fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(
                ext.as_str(),
                "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "avif" | "tif" | "tiff"
            )
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stem_drops_only_last_extension() {
        let file = SourceFile::from_bytes("holiday.photo.png", MediaType::Png, vec![1u8]);
        assert_eq!(file.stem(), "holiday.photo");

        let bare = SourceFile::from_bytes("README", MediaType::Unknown, vec![1u8]);
        assert_eq!(bare.stem(), "README");

        let hidden = SourceFile::from_bytes(".png", MediaType::Png, vec![1u8]);
        assert_eq!(hidden.stem(), ".png");
    }

    #[test]
    fn media_type_from_extension_and_magic() {
        assert_eq!(MediaType::from_extension("PNG"), MediaType::Png);
        assert_eq!(MediaType::from_extension("jpeg"), MediaType::Jpeg);
        assert_eq!(MediaType::from_extension("txt"), MediaType::Unknown);

        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(MediaType::sniff(&png_magic), MediaType::Png);
        assert_eq!(MediaType::sniff(b"not an image"), MediaType::Unknown);
    }

    #[test]
    fn transparency_follows_media_type() {
        assert!(MediaType::Png.may_have_transparency());
        assert!(MediaType::Webp.may_have_transparency());
        assert!(!MediaType::Jpeg.may_have_transparency());
        assert!(!MediaType::Bmp.may_have_transparency());
    }

    #[test]
    fn collects_only_images_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("a.JPG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("nested").join("c.webp"), b"x").unwrap();

        let names: Vec<String> = collect_images(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.webp"]);
    }

    #[test]
    fn disk_source_reads_lazily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.gif");
        fs::write(&path, b"GIF89a").unwrap();

        let file = SourceFile::from_path(&path);
        assert_eq!(file.name(), "pic.gif");
        assert_eq!(file.media_type(), MediaType::Gif);
        assert_eq!(file.path(), Some(path.as_path()));
        assert_eq!(&*file.read_bytes().unwrap(), b"GIF89a");
    }
}
