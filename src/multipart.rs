//! multipart/form-data body encoding.
//!
//! The encoder is byte-exact: each form field becomes
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="{name}"\r\n
//! \r\n
//! {value}\r\n
//! ```
//!
//! each attachment becomes
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="{field}"; filename="{file}"\r\n
//! Content-Type: {mime}\r\n
//! \r\n
//! {bytes}\r\n
//! ```
//!
//! and the body ends with `--{boundary}--` without a trailing CRLF. Quotes,
//! CR and LF inside `name` and `filename` are written as `%22`, `%0D` and
//! `%0A`.

use bytes::Bytes;
use std::borrow::Cow;
use rand::Rng;
use uuid::Uuid;

/// MIME type used for attachments that do not name one.
pub const DEFAULT_ATTACHMENT_MIME: &str = "image/jpg";

/// Extension given to generated attachment filenames.
pub const DEFAULT_ATTACHMENT_EXTENSION: &str = "jpeg";

/// Binary payload of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: Bytes,
    /// Used when set (after escaping); otherwise a name is generated.
    pub file_name: Option<String>,
    /// Defaults to [`DEFAULT_ATTACHMENT_MIME`].
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Produces boundary tokens, one per request.
#[cfg_attr(test, mockall::automock)]
pub trait BoundaryGenerator: Send + Sync {
    fn boundary(&self) -> String;
}

/// `Boundary-` followed by an uppercase v4 UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidBoundary;

impl BoundaryGenerator for UuidBoundary {
    fn boundary(&self) -> String {
        format!("Boundary-{}", Uuid::new_v4().to_string().to_uppercase())
    }
}

/// Names attachments that arrive without a filename.
#[cfg_attr(test, mockall::automock)]
pub trait FileNameGenerator: Send + Sync {
    fn file_name(&self) -> String;
}

impl<F: FileNameGenerator + ?Sized> FileNameGenerator for Box<F> {
    fn file_name(&self) -> String {
        (**self).file_name()
    }
}

/// A random `u32` with a `.jpeg` extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFileNames;

impl FileNameGenerator for RandomFileNames {
    fn file_name(&self) -> String {
        let n: u32 = rand::thread_rng().r#gen();
        format!("{}.{}", n, DEFAULT_ATTACHMENT_EXTENSION)
    }
}

/// Value of the outer request's `Content-Type` header for `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Encodes form fields and attachments, both in the order given.
pub struct MultipartEncoder<F: FileNameGenerator = RandomFileNames> {
    file_names: F,
}

impl Default for MultipartEncoder<RandomFileNames> {
    fn default() -> Self {
        Self::new(RandomFileNames)
    }
}

impl<F: FileNameGenerator> MultipartEncoder<F> {
    pub fn new(file_names: F) -> Self {
        Self { file_names }
    }

    pub fn encode(
        &self,
        form_fields: &[(String, String)],
        attachments: &[(String, Attachment)],
        boundary: &str,
    ) -> Vec<u8> {
        let mut body = Vec::new();

        for (name, value) in form_fields {
            write_form_field(&mut body, name, value, boundary);
        }

        for (field_name, attachment) in attachments {
            let file_name = attachment
                .file_name
                .clone()
                .unwrap_or_else(|| self.file_names.file_name());
            let mime_type = attachment
                .mime_type
                .as_deref()
                .unwrap_or(DEFAULT_ATTACHMENT_MIME);
            write_file(
                &mut body,
                field_name,
                &file_name,
                mime_type,
                &attachment.data,
                boundary,
            );
        }

        body.extend_from_slice(format!("--{}--", boundary).as_bytes());
        body
    }
}

/// Percent-escapes the characters that would end a quoted
/// `Content-Disposition` parameter or the header line itself.
fn escape_quoted(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 6);
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn write_form_field(body: &mut Vec<u8>, name: &str, value: &str, boundary: &str) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n",
            escape_quoted(name)
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}

fn write_file(
    body: &mut Vec<u8>,
    field_name: &str,
    file_name: &str,
    mime_type: &str,
    data: &[u8],
    boundary: &str,
) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            escape_quoted(field_name),
            escape_quoted(file_name)
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
}
