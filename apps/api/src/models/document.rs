use bytes::Bytes;
use uuid::Uuid;

/// Fallback media type when neither the upload nor the file name says anything useful.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// An uploaded document as handed to the extraction engine.
///
/// The bytes are reference-counted: strategies clone the handle, never the payload.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub media_type: String,
    bytes: Bytes,
}

impl Document {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            media_type: media_type.into().to_ascii_lowercase(),
            bytes: bytes.into(),
        }
    }

    /// Builds a document from a multipart upload. A missing or generic declared
    /// content type is replaced by a guess from the file name.
    pub fn from_upload(file_name: &str, declared: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        let media_type = match declared.map(str::trim) {
            Some(ct) if !ct.is_empty() && ct != OCTET_STREAM => ct.to_string(),
            _ => mime_guess::from_path(file_name)
                .first_raw()
                .unwrap_or(OCTET_STREAM)
                .to_string(),
        };
        Self::new(file_name, media_type, bytes)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lower-cased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// True for real PDFs and for image-typed uploads that still carry a `.pdf` name.
    pub fn is_pdf_like(&self) -> bool {
        self.media_type == "application/pdf" || self.extension().as_deref() == Some("pdf")
    }
}
