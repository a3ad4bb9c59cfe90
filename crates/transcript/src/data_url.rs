//! `data:<mime>;base64,<payload>` codec for images crossing the UI boundary.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::TranscriptError;
use crate::model::ImageAttachment;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = "base64";

/// A decoded data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Decodes a base64 data URL. MIME parameters before `;base64` are ignored.
pub fn decode(url: &str) -> Result<DataUrl, TranscriptError> {
    let rest = url
        .get(..SCHEME.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(SCHEME))
        .map(|_| &url[SCHEME.len()..])
        .ok_or_else(|| TranscriptError::invalid_data_url("missing 'data:' scheme"))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| TranscriptError::invalid_data_url("missing ',' before payload"))?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default().trim();
    if mime_type.is_empty() || !mime_type.contains('/') {
        return Err(TranscriptError::invalid_data_url(format!(
            "malformed MIME type '{mime_type}'"
        )));
    }

    if !params.any(|param| param.trim().eq_ignore_ascii_case(BASE64_MARKER)) {
        return Err(TranscriptError::invalid_data_url(
            "only base64-encoded payloads are supported",
        ));
    }

    let data = STANDARD
        .decode(payload.trim().as_bytes())
        .map_err(|error| {
            TranscriptError::invalid_data_url(format!("bad base64 payload: {error}"))
        })?;

    Ok(DataUrl {
        mime_type: mime_type.to_string(),
        data,
    })
}

/// Encodes bytes as a base64 data URL.
#[must_use]
pub fn encode(mime_type: &str, data: &[u8]) -> String {
    format!("{SCHEME}{mime_type};{BASE64_MARKER},{}", STANDARD.encode(data))
}

/// Decodes an image data URL into an attachment keyed by MIME subtype.
pub fn decode_image(url: &str) -> Result<ImageAttachment, TranscriptError> {
    let DataUrl { mime_type, data } = decode(url)?;
    let extension = match mime_type.split_once('/') {
        Some((kind, subtype)) if kind.eq_ignore_ascii_case("image") && !subtype.is_empty() => {
            subtype.to_string()
        }
        _ => return Err(TranscriptError::UnsupportedImageMime { mime_type }),
    };

    Ok(ImageAttachment::new(data, extension))
}
