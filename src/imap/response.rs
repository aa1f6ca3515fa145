//! Wire response model: the dispatcher returns an ordered list of
//! these, the last of which is tagged.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
        }
    }
}

/// One response line (or raw literal payload) produced by a command
/// handler. `render` turns the whole ordered list into wire bytes.
#[derive(Debug, Clone)]
pub enum Response {
    /// `* <text>` untagged line, text pre-formatted, no CRLF.
    Untagged(String),
    /// Pre-rendered untagged bytes (used for FETCH responses carrying
    /// literal bodies, where the text is interleaved with raw bytes).
    UntaggedRaw(Vec<u8>),
    /// `+ <text>` continuation request.
    Continuation(String),
    /// `<tag> <OK|NO|BAD> [resp-text-code] <message>`.
    Tagged {
        tag: String,
        status: Status,
        code: Option<String>,
        message: String,
    },
}

impl Response {
    #[must_use]
    pub fn ok(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tagged {
            tag: tag.into(),
            status: Status::Ok,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn ok_coded(tag: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tagged {
            tag: tag.into(),
            status: Status::Ok,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn no(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tagged {
            tag: tag.into(),
            status: Status::No,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn no_coded(tag: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tagged {
            tag: tag.into(),
            status: Status::No,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tagged {
            tag: tag.into(),
            status: Status::Bad,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn untagged_bad(message: impl Into<String>) -> Self {
        Self::Untagged(format!("BAD {}", message.into()))
    }

    pub fn render_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Untagged(text) => {
                out.extend_from_slice(b"* ");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::UntaggedRaw(bytes) => out.extend_from_slice(bytes),
            Self::Continuation(text) => {
                out.extend_from_slice(b"+ ");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Self::Tagged {
                tag,
                status,
                code,
                message,
            } => {
                out.extend_from_slice(tag.as_bytes());
                out.push(b' ');
                out.extend_from_slice(status.as_str().as_bytes());
                out.push(b' ');
                if let Some(code) = code {
                    out.push(b'[');
                    out.extend_from_slice(code.as_bytes());
                    out.extend_from_slice(b"] ");
                }
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
    }
}

/// Render an ordered response list into wire bytes.
#[must_use]
pub fn render_all(responses: &[Response]) -> Vec<u8> {
    let mut out = Vec::new();
    for r in responses {
        r.render_into(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tagged_ok_with_code() {
        let r = Response::ok_coded("a1", "READ-WRITE", "SELECT completed");
        let mut out = Vec::new();
        r.render_into(&mut out);
        assert_eq!(out, b"a1 OK [READ-WRITE] SELECT completed\r\n");
    }

    #[test]
    fn renders_untagged_line() {
        let r = Response::Untagged("5 EXISTS".to_string());
        let mut out = Vec::new();
        r.render_into(&mut out);
        assert_eq!(out, b"* 5 EXISTS\r\n");
    }

    #[test]
    fn last_of_list_is_tagged() {
        let list = vec![
            Response::Untagged("1 EXISTS".to_string()),
            Response::ok("a1", "done"),
        ];
        let bytes = render_all(&list);
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.last().unwrap().starts_with("a1 OK"));
    }
}
