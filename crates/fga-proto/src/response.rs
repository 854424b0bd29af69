//! Response: a status plus a variant-specific body.

/// Response status. `Ok` carries a body; every other variant carries only
/// an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    ClientError,
    TransportError,
    ServerError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    CheckTuple { allowed: bool },
    WriteTuple,
    DeleteTuple,
    GetStore { found: bool, name: String },
    CreateStore { id: String, name: String },
    DeleteStore,
    None,
}

/// Error-message buffer is logically fixed-size (256 bytes, per
/// `original_source`'s `CheckResponse`); represented as a capped `String`
/// here since nothing benefits from an inline byte array in Rust.
pub const ERROR_MESSAGE_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: ResponseStatus,
    pub error_message: Option<String>,
    pub body: ResponseBody,
}

impl Response {
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            status: ResponseStatus::Ok,
            error_message: None,
            body,
        }
    }

    pub fn error(status: ResponseStatus, message: impl Into<String>) -> Self {
        debug_assert_ne!(status, ResponseStatus::Ok, "error() requires a non-Ok status");
        let mut message = message.into();
        if message.len() > ERROR_MESSAGE_MAX_LEN {
            // `String::truncate` panics off a char boundary; walk back to the
            // nearest one so a multi-byte character straddling the cap can't
            // crash the error path itself.
            let mut cut = ERROR_MESSAGE_MAX_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self {
            status,
            error_message: Some(message),
            body: ResponseBody::None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_is_capped() {
        let r = Response::error(ResponseStatus::TransportError, "x".repeat(1000));
        assert_eq!(r.error_message.unwrap().len(), ERROR_MESSAGE_MAX_LEN);
    }

    #[test]
    fn truncation_does_not_split_a_multibyte_character() {
        // Each "é" is 2 bytes; 255 of them land the cap exactly mid-character.
        let message = "é".repeat(255);
        let r = Response::error(ResponseStatus::TransportError, message);
        let truncated = r.error_message.unwrap();
        assert!(truncated.len() <= ERROR_MESSAGE_MAX_LEN);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn ok_response_has_no_error_message() {
        let r = Response::ok(ResponseBody::CheckTuple { allowed: true });
        assert!(r.is_ok());
        assert!(r.error_message.is_none());
    }
}
