//! Content sniffing: infer a MIME type from the leading bytes of a payload.

/// A type recognised from content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    pub mime: String,
    pub extension: String,
}

pub trait ContentSniffer: Send + Sync {
    /// `None` when the bytes match no known signature. Must not panic on
    /// empty or truncated input.
    fn detect(&self, bytes: &[u8]) -> Option<SniffedType>;
}

/// Magic-byte detection backed by the `infer` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferSniffer;

impl ContentSniffer for InferSniffer {
    fn detect(&self, bytes: &[u8]) -> Option<SniffedType> {
        infer::get(bytes).map(|kind| SniffedType {
            mime: kind.mime_type().to_string(),
            extension: kind.extension().to_string(),
        })
    }
}
