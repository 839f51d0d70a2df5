//! Typed header block shared by every protocol unit.

use thiserror::Error;

use super::{ByteRange, CpimBlock, HeaderValueError, MessageId, ReportFlag, Status};
use crate::tokenizer::{Pattern, SyntaxError, split_words};

/// Errors raised while storing a header line.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The same header appeared twice in one unit.
    #[error("duplicate header {name}")]
    Duplicate {
        /// Header name as received.
        name: String,
    },
    /// The value does not parse for its header.
    #[error(transparent)]
    InvalidValue(#[from] HeaderValueError),
    /// A path header lists more than one URI; relays are not supported.
    #[error("{header} lists {count} URIs; multi-hop paths are unsupported")]
    MultiHop {
        /// `To-Path` or `From-Path`.
        header: &'static str,
        /// Number of URIs found.
        count: usize,
    },
    /// A path header is empty.
    #[error("{header} is empty")]
    EmptyPath {
        /// `To-Path` or `From-Path`.
        header: &'static str,
    },
    /// The path list could not be split.
    #[error("malformed path list: {0}")]
    Path(#[from] SyntaxError),
}

/// Header values of a request, response or report.
///
/// Known headers map to typed fields; anything else is kept verbatim in
/// [`Headers::extensions`] in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    /// Single `To-Path` URI.
    pub to_path: Option<String>,
    /// Single `From-Path` URI.
    pub from_path: Option<String>,
    /// `Message-ID`.
    pub message_id: Option<MessageId>,
    /// `Byte-Range`.
    pub byte_range: Option<ByteRange>,
    /// `Content-Type`.
    pub content_type: Option<String>,
    /// `Content-Disposition`.
    pub content_disposition: Option<String>,
    /// `Success-Report`.
    pub success_report: Option<ReportFlag>,
    /// `Failure-Report`.
    pub failure_report: Option<ReportFlag>,
    /// `Status`, carried by REPORT requests.
    pub status: Option<Status>,
    /// Unrecognised headers as `(name, value)` pairs; names are unique.
    pub extensions: Vec<(String, String)>,
    /// Embedded CPIM header block found at the start of the body.
    pub cpim: Option<CpimBlock>,
}

fn set_once<T>(slot: &mut Option<T>, name: &str, value: T) -> Result<(), HeaderError> {
    if slot.is_some() {
        return Err(HeaderError::Duplicate {
            name: name.to_owned(),
        });
    }
    *slot = Some(value);
    Ok(())
}

fn single_path(header: &'static str, value: &str) -> Result<String, HeaderError> {
    let mut uris = split_words(value, Pattern::path_list())?;
    match uris.len() {
        0 => Err(HeaderError::EmptyPath { header }),
        1 => Ok(uris.remove(0)),
        count => Err(HeaderError::MultiHop { header, count }),
    }
}

impl Headers {
    /// Store a received header line. Names are case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] for duplicates, malformed values and path
    /// headers listing more than one URI.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        match name {
            "To-Path" => set_once(&mut self.to_path, name, single_path("To-Path", value)?),
            "From-Path" => set_once(&mut self.from_path, name, single_path("From-Path", value)?),
            "Message-ID" => set_once(&mut self.message_id, name, MessageId::new(value)),
            "Byte-Range" => set_once(&mut self.byte_range, name, value.parse()?),
            "Content-Type" => set_once(&mut self.content_type, name, value.to_owned()),
            "Content-Disposition" => {
                set_once(&mut self.content_disposition, name, value.to_owned())
            }
            "Success-Report" => set_once(&mut self.success_report, name, value.parse()?),
            "Failure-Report" => set_once(&mut self.failure_report, name, value.parse()?),
            "Status" => set_once(&mut self.status, name, value.parse()?),
            _ => {
                if self.extension(name).is_some() {
                    return Err(HeaderError::Duplicate {
                        name: name.to_owned(),
                    });
                }
                self.extensions.push((name.to_owned(), value.to_owned()));
                Ok(())
            }
        }
    }

    /// Look up an extension header by exact name.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the body carries an embedded CPIM message.
    #[must_use]
    pub fn is_cpim(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("message/cpim"))
    }

    /// Whether the sender expects a transaction response.
    ///
    /// `Failure-Report: no` suppresses responses entirely; `partial` only
    /// wants failures reported.
    #[must_use]
    pub fn wants_response(&self, success: bool) -> bool {
        match self.failure_report {
            Some(ReportFlag::No) => false,
            Some(ReportFlag::Partial) => !success,
            _ => true,
        }
    }

    /// Whether the sender asked for a success REPORT.
    #[must_use]
    pub fn wants_success_report(&self) -> bool { self.success_report == Some(ReportFlag::Yes) }

    /// Copy of these headers with the paths swapped, as used when
    /// answering a request.
    #[must_use]
    pub fn reversed_paths(&self) -> Self {
        Self {
            to_path: self.from_path.clone(),
            from_path: self.to_path.clone(),
            ..Self::default()
        }
    }
}
