//! Structural view of an embedded CPIM message header block.

/// Headers found at the start of a `message/cpim` body.
///
/// The block holds the CPIM message headers followed by the MIME content
/// headers, each section ending at a blank line. Values are kept verbatim;
/// no semantic interpretation is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpimBlock {
    /// CPIM message headers (`From`, `To`, `DateTime`, `NS`, ...).
    pub headers: Vec<(String, String)>,
    /// MIME headers of the encapsulated content.
    pub mime: Vec<(String, String)>,
    /// Byte length of the block inside the body; application content starts
    /// at this offset.
    pub len: usize,
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

impl CpimBlock {
    /// First CPIM message header called `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { lookup(&self.headers, name) }

    /// First MIME header called `name`, matched case-insensitively.
    #[must_use]
    pub fn mime_header(&self, name: &str) -> Option<&str> { lookup(&self.mime, name) }

    /// Content type of the encapsulated payload.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.mime_header("Content-Type") }

    /// Content disposition of the encapsulated payload.
    #[must_use]
    pub fn content_disposition(&self) -> Option<&str> { self.mime_header("Content-Disposition") }
}
