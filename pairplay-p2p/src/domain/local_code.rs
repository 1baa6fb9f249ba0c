use super::{SdpKind, SessionDescription};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use serde::Serialize;
use std::fmt;

/// URL-safe alphabet, unpadded on the way out, padding optional on the way in.
const CODE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors turning a pasted code back into a session description.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("code is empty")]
    Empty,

    #[error("code is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("code does not hold a session description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected {expected} description, found {found}")]
    UnexpectedKind { expected: SdpKind, found: SdpKind },
}

/// Copy-pasteable text form of a session description.
///
/// `base64url(json(description))` with the trailing `=` stripped, so it
/// survives chat apps and URL query strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct LocalCode(String);

impl LocalCode {
    pub fn encode(desc: &SessionDescription) -> Result<Self, CodecError> {
        let json = serde_json::to_vec(desc)?;
        Ok(Self(CODE_ENGINE.encode(json)))
    }

    /// Inverse of [`LocalCode::encode`]. Tolerates surrounding and embedded
    /// whitespace, the standard `+/` alphabet and restored `=` padding.
    pub fn decode(code: &str) -> Result<SessionDescription, CodecError> {
        let normalized: String = code
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();

        if normalized.is_empty() {
            return Err(CodecError::Empty);
        }

        let bytes = CODE_ENGINE.decode(normalized.as_bytes())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decode and require a particular description kind.
    pub fn decode_kind(code: &str, expected: SdpKind) -> Result<SessionDescription, CodecError> {
        Self::decode(code)?.expect_kind(expected)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for LocalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocalCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
