use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

/// MIME types accepted for person and garment uploads.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

/// A user-supplied image. Immutable once built; `base64` always decodes to
/// `bytes`.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    mime_type: String,
    base64: String,
    preview: String,
}

impl ImageAsset {
    pub fn from_bytes(
        bytes: impl Into<Vec<u8>>,
        mime_type: &str,
        preview: impl Into<String>,
    ) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            bail!("image is empty");
        }
        let mime_type = normalize_mime(mime_type);
        if !is_supported_mime(&mime_type) {
            bail!("unsupported image type '{mime_type}'");
        }
        let base64 = BASE64.encode(&bytes);
        Ok(Self {
            bytes,
            mime_type,
            base64,
            preview: preview.into(),
        })
    }

    /// Reads an image from disk. The format is sniffed from the content and
    /// falls back to the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime = sniff_mime(&bytes)
            .or_else(|| mime_for_path(path))
            .with_context(|| format!("could not determine image type of {}", path.display()))?;
        Self::from_bytes(bytes, mime, path.to_string_lossy().to_string())
            .with_context(|| format!("invalid image {}", path.display()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Standard base64 of the bytes, without a `data:` header.
    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// Reference shown in history listings (a path or a data URI).
    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("preview", &self.preview)
            .finish()
    }
}

pub fn is_supported_mime(mime_type: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&normalize_mime(mime_type).as_str())
}

/// Splits a `data:<mime>;base64,<payload>` URI into its MIME type and the
/// decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = uri.trim().strip_prefix("data:") else {
        bail!("not a data URI");
    };
    let Some((mime_type, payload)) = rest.split_once(";base64,") else {
        bail!("data URI is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("data URI base64 decode failed")?;
    Ok((mime_type.to_string(), bytes))
}

fn normalize_mime(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    mime_for_format(format)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "heic" => return Some("image/heic"),
        "heif" => return Some("image/heif"),
        _ => {}
    }
    mime_for_format(ImageFormat::from_extension(ext)?)
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::{decode_data_uri, ImageAsset, BASE64};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn base64_round_trips_to_original_bytes() -> anyhow::Result<()> {
        let asset = ImageAsset::from_bytes(vec![1u8, 2, 3, 250], "image/png", "person.png")?;
        assert_eq!(BASE64.decode(asset.base64())?, asset.bytes());
        assert!(!asset.base64().starts_with("data:"));
        assert_eq!(asset.data_uri(), format!("data:image/png;base64,{}", asset.base64()));
        Ok(())
    }

    #[test]
    fn rejects_unsupported_or_empty_images() {
        assert!(ImageAsset::from_bytes(vec![1u8], "application/pdf", "doc.pdf").is_err());
        assert!(ImageAsset::from_bytes(Vec::<u8>::new(), "image/png", "empty.png").is_err());
    }

    #[test]
    fn normalizes_jpg_alias() -> anyhow::Result<()> {
        let asset = ImageAsset::from_bytes(vec![0xFFu8, 0xD8], "IMAGE/JPG", "a.jpg")?;
        assert_eq!(asset.mime_type(), "image/jpeg");
        Ok(())
    }

    #[test]
    fn from_path_sniffs_content_before_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("garment.jpg");
        std::fs::write(&path, PNG_MAGIC)?;
        let asset = ImageAsset::from_path(&path)?;
        assert_eq!(asset.mime_type(), "image/png");
        assert_eq!(asset.preview(), path.to_string_lossy());
        Ok(())
    }

    #[test]
    fn from_path_falls_back_to_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("person.webp");
        std::fs::write(&path, b"not really sniffable")?;
        let asset = ImageAsset::from_path(&path)?;
        assert_eq!(asset.mime_type(), "image/webp");
        Ok(())
    }

    #[test]
    fn debug_does_not_dump_payload() -> anyhow::Result<()> {
        let asset = ImageAsset::from_bytes(vec![7u8; 64], "image/png", "p.png")?;
        let rendered = format!("{asset:?}");
        assert!(!rendered.contains(asset.base64()));
        assert!(rendered.contains("len: 64"));
        Ok(())
    }

    #[test]
    fn data_uri_decodes_back_to_bytes() -> anyhow::Result<()> {
        let asset = ImageAsset::from_bytes(vec![9u8, 8, 7], "image/webp", "look.webp")?;
        let (mime_type, bytes) = decode_data_uri(&asset.data_uri())?;
        assert_eq!(mime_type, "image/webp");
        assert_eq!(bytes, vec![9u8, 8, 7]);

        assert!(decode_data_uri("https://example.com/a.png").is_err());
        assert!(decode_data_uri("data:image/png,plain").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
        Ok(())
    }
}
