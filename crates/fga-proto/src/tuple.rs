//! Authorization tuple — the unit of fact the remote service reasons about.

/// Field-width budgets, carried from the original `postfga` extension's
/// fixed-size C buffers. Idiomatic Rust doesn't need inline storage for
/// these, but the caps are still enforced at construction so a malformed
/// request is rejected at the same boundary the original rejected it.
pub const TYPE_MAX_LEN: usize = 64;
pub const ID_MAX_LEN: usize = 128;
pub const RELATION_MAX_LEN: usize = 64;
pub const STORE_ID_MAX_LEN: usize = 36;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TupleError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("{field} exceeds {max} bytes (was {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// One authorization fact: `(object, relation, subject)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
}

impl Tuple {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Result<Self, TupleError> {
        let tuple = Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        };
        tuple.validate()?;
        Ok(tuple)
    }

    /// Rejects empty required fields and over-length fields. A [`ClientError`]
    /// surfaces from this, never a silent truncation — a malformed request
    /// (empty required field) is rejected at dispatch, not patched up.
    ///
    /// [`ClientError`]: crate::response::ResponseStatus::ClientError
    pub fn validate(&self) -> Result<(), TupleError> {
        check_field("object_type", &self.object_type, TYPE_MAX_LEN)?;
        check_field("object_id", &self.object_id, ID_MAX_LEN)?;
        check_field("relation", &self.relation, RELATION_MAX_LEN)?;
        check_field("subject_type", &self.subject_type, TYPE_MAX_LEN)?;
        check_field("subject_id", &self.subject_id, ID_MAX_LEN)?;
        Ok(())
    }
}

fn check_field(name: &'static str, value: &str, max: usize) -> Result<(), TupleError> {
    if value.is_empty() {
        return Err(TupleError::EmptyField { field: name });
    }
    if value.len() > max {
        return Err(TupleError::TooLong {
            field: name,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}
