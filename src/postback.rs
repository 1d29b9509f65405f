//! Postback action payloads
//!
//! Carousel buttons carry an opaque data string that the platform echoes back
//! verbatim when the user taps it. The wire form is
//!
//! ```text
//! action=<accept|reject>&face=<u32>&inference=<u32>
//! ```
//!
//! `&` and `=` never occur inside unsigned decimal ids, so splitting on them
//! is unambiguous. Keys may come in any order but each exactly once.

use crate::config::POSTBACK_DATA_MAX_BYTES;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const KEY_ACTION: &str = "action";
const KEY_FACE: &str = "face";
const KEY_INFERENCE: &str = "inference";

/// Malformed postback payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostbackError {
    /// Payload exceeds the platform data ceiling
    #[error("postback data too long: {0} bytes")]
    TooLong(usize),
    /// Wrong number of `key=value` pairs
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),
    /// Segment without `=` or with an unknown key
    #[error("unknown field: {0:?}")]
    UnknownField(String),
    /// Same key given twice
    #[error("duplicate field: {0}")]
    DuplicateField(&'static str),
    /// Required key absent
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// Id value is not an unsigned integer
    #[error("invalid {field} id: {value:?}")]
    InvalidId {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },
    /// Action tag is neither `accept` nor `reject`
    #[error("unknown action: {0:?}")]
    UnknownAction(String),
}

/// What the user decided about an inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostbackAction {
    /// The candidate is the labelled person
    Accept {
        /// Face grouping the inference belongs to
        face_id: u32,
        /// Inference being confirmed
        inference_id: u32,
    },
    /// The candidate is not the labelled person
    Reject {
        /// Face grouping the inference belongs to
        face_id: u32,
        /// Inference being rejected
        inference_id: u32,
    },
}

impl PostbackAction {
    /// Wire tag of this action.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
        }
    }

    /// Face id carried by the action.
    #[must_use]
    pub const fn face_id(&self) -> u32 {
        match *self {
            Self::Accept { face_id, .. } | Self::Reject { face_id, .. } => face_id,
        }
    }

    /// Inference id carried by the action.
    #[must_use]
    pub const fn inference_id(&self) -> u32 {
        match *self {
            Self::Accept { inference_id, .. } | Self::Reject { inference_id, .. } => inference_id,
        }
    }

    /// Encode into button data. At most 50 bytes for any pair of `u32` ids.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{KEY_ACTION}={}&{KEY_FACE}={}&{KEY_INFERENCE}={}",
            self.tag(),
            self.face_id(),
            self.inference_id()
        )
    }

    /// Decode button data echoed back by the platform.
    ///
    /// # Errors
    ///
    /// Returns a `PostbackError` on wrong field count, unknown or repeated
    /// keys, non-numeric ids or an unrecognised action tag.
    pub fn decode(data: &str) -> Result<Self, PostbackError> {
        if data.len() > POSTBACK_DATA_MAX_BYTES {
            return Err(PostbackError::TooLong(data.len()));
        }

        let segments: Vec<&str> = data.split('&').collect();
        if segments.len() != 3 {
            return Err(PostbackError::FieldCount(segments.len()));
        }

        let mut action = None;
        let mut face = None;
        let mut inference = None;
        for segment in segments {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| PostbackError::UnknownField(segment.to_string()))?;
            let (slot, name) = match key {
                KEY_ACTION => (&mut action, KEY_ACTION),
                KEY_FACE => (&mut face, KEY_FACE),
                KEY_INFERENCE => (&mut inference, KEY_INFERENCE),
                _ => return Err(PostbackError::UnknownField(key.to_string())),
            };
            if slot.replace(value).is_some() {
                return Err(PostbackError::DuplicateField(name));
            }
        }

        let action = action.ok_or(PostbackError::MissingField(KEY_ACTION))?;
        let face_id = parse_id(KEY_FACE, face.ok_or(PostbackError::MissingField(KEY_FACE))?)?;
        let inference_id = parse_id(
            KEY_INFERENCE,
            inference.ok_or(PostbackError::MissingField(KEY_INFERENCE))?,
        )?;

        match action {
            "accept" => Ok(Self::Accept {
                face_id,
                inference_id,
            }),
            "reject" => Ok(Self::Reject {
                face_id,
                inference_id,
            }),
            other => Err(PostbackError::UnknownAction(other.to_string())),
        }
    }
}

// `u32::from_str` accepts a leading '+', which the format does not allow
fn parse_id(field: &'static str, value: &str) -> Result<u32, PostbackError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PostbackError::InvalidId {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| PostbackError::InvalidId {
        field,
        value: value.to_string(),
    })
}

impl fmt::Display for PostbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for PostbackAction {
    type Err = PostbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
