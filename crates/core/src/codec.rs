//! Binary/object <-> text transcoding for request and response bodies.
//!
//! Binary blobs travel as `data:<media>/<format>;base64,<payload>` strings.
//! On the way out the codec wraps every blob (and, optionally, every
//! structured object); on the way back it recognises wrapped strings by a
//! strict base64 round-trip check and unwraps them according to the
//! configured [`OutputFormat`].
//!
//! Recognition is a heuristic and therefore total: a value that does not
//! look like a wrapped payload is passed through untouched. Only a value
//! that *is* validly wrapped but cannot be deserialized as requested
//! produces an error.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::{DecodedFields, ParamValue, RequestParams, ResultValue};

/// Request key naming the image format of blob parameters. Consumed by the
/// codec, never transmitted.
pub const IMAGE_FORMAT_KEY: &str = "image_format";

/// Request key naming the audio format of blob parameters. Consumed by the
/// codec, never transmitted.
pub const AUDIO_FORMAT_KEY: &str = "audio_format";

/// Media type used when wrapping serialized structured objects.
pub const OBJECT_MEDIA_TYPE: &str = "application/json";

/// Format assumed when sniffing cannot identify a blob.
pub const FALLBACK_FORMAT: &str = "PNG";

const PNG_MAGIC: &[u8] = &[0x89];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];

/// How wrapped base64 strings in responses are returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Leave wrapped strings as they are.
    #[default]
    Base64,
    /// Unwrap into raw bytes.
    Bytes,
    /// Unwrap and deserialize the bytes as JSON.
    ///
    /// Only suits endpoints that object-serialize every wrapped field: any
    /// wrapped payload that is not JSON, such as an image, fails the whole
    /// result with [`CodecError::Decode`].
    Object,
}

/// Errors from the payload codec.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// A validly wrapped payload failed deserialization.
    #[error("Failed to decode field '{field}': {reason}")]
    Decode { field: String, reason: String },
}

/// Transcoder between [`RequestParams`]/[`DecodedFields`] and wire JSON.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    media_type: String,
    output_format: OutputFormat,
    object_serialization: bool,
}

impl PayloadCodec {
    /// Create a codec.
    ///
    /// * `media_type`    - top-level media type for wrapped blobs, e.g. `image` or `audio`.
    /// * `output_format` - how wrapped strings in responses are returned.
    pub fn new(media_type: impl Into<String>, output_format: OutputFormat) -> Self {
        Self {
            media_type: media_type.into(),
            output_format,
            object_serialization: false,
        }
    }

    /// Serialize and wrap [`ParamValue::Object`] values instead of sending
    /// them as plain JSON.
    pub fn with_object_serialization(mut self, enabled: bool) -> Self {
        self.object_serialization = enabled;
        self
    }

    /// Media type used when wrapping request blobs.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Shape of decoded result blobs.
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Whether object parameters are wrapped as JSON.
    pub fn object_serialization(&self) -> bool {
        self.object_serialization
    }

    /// Encode request parameters into a wire JSON object.
    ///
    /// The `image_format`/`audio_format` keys are consumed to name the blob
    /// format; when neither is present the format is sniffed per blob.
    pub fn encode_request(&self, mut params: RequestParams) -> Map<String, Value> {
        let image_format = params.remove(IMAGE_FORMAT_KEY);
        let audio_format = params.remove(AUDIO_FORMAT_KEY);
        let declared_format = image_format.or(audio_format).map(format_name);

        params
            .into_inner()
            .into_iter()
            .map(|(key, value)| {
                let encoded = match value {
                    ParamValue::Json(value) => value,
                    ParamValue::Bytes(bytes) => {
                        let format = match &declared_format {
                            Some(format) => format.clone(),
                            None => sniff_image_format(&bytes).to_string(),
                        };
                        Value::String(wrap_base64(&self.media_type, &format, &bytes))
                    }
                    ParamValue::Object(value) if self.object_serialization => {
                        let bytes = serde_json::to_vec(&value)
                            .expect("serde_json::Value is always serialisable");
                        Value::String(wrap_object(&bytes))
                    }
                    ParamValue::Object(value) => value,
                };
                (key, encoded)
            })
            .collect()
    }

    /// Decode a wire JSON object into result fields.
    ///
    /// Every string, and every string inside a list, is tested with
    /// [`is_wrapped_base64`] and unwrapped per the output format. Other
    /// values pass through unchanged.
    pub fn decode_result(&self, fields: Map<String, Value>) -> Result<DecodedFields, CodecError> {
        fields
            .into_iter()
            .map(|(key, value)| {
                let decoded = self.decode_value(&key, value)?;
                Ok((key, decoded))
            })
            .collect()
    }

    fn decode_value(&self, field: &str, value: Value) -> Result<ResultValue, CodecError> {
        match value {
            Value::String(s) => self.decode_string(field, s),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => self.decode_string(field, s),
                    other => Ok(ResultValue::Json(other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ResultValue::List),
            other => Ok(ResultValue::Json(other)),
        }
    }

    fn decode_string(&self, field: &str, value: String) -> Result<ResultValue, CodecError> {
        if self.output_format == OutputFormat::Base64 {
            return Ok(ResultValue::Json(Value::String(value)));
        }
        let Some(bytes) = unwrap_base64(&value) else {
            return Ok(ResultValue::Json(Value::String(value)));
        };
        match self.output_format {
            OutputFormat::Bytes => Ok(ResultValue::Bytes(bytes)),
            OutputFormat::Object => serde_json::from_slice(&bytes)
                .map(ResultValue::Object)
                .map_err(|e| CodecError::Decode {
                    field: field.to_string(),
                    reason: e.to_string(),
                }),
            OutputFormat::Base64 => Ok(ResultValue::Json(Value::String(value))),
        }
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new("image", OutputFormat::default())
    }
}

/// Guess an image format from a blob's leading bytes.
///
/// Recognises PNG and JPEG; anything else falls back to
/// [`FALLBACK_FORMAT`] with a warning.
pub fn sniff_image_format(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PNG_MAGIC) {
        "PNG"
    } else if bytes.starts_with(JPEG_MAGIC) {
        "JPEG"
    } else {
        tracing::warn!(
            fallback = FALLBACK_FORMAT,
            "Could not detect image format from blob, using fallback",
        );
        FALLBACK_FORMAT
    }
}

/// Wrap a blob as `data:<media_type>/<format>;base64,<payload>`.
pub fn wrap_base64(media_type: &str, format: &str, bytes: &[u8]) -> String {
    format!("data:{media_type}/{format};base64,{}", STANDARD.encode(bytes))
}

fn wrap_object(bytes: &[u8]) -> String {
    format!("data:{OBJECT_MEDIA_TYPE};base64,{}", STANDARD.encode(bytes))
}

/// Whether `value` is a wrapped base64 payload.
///
/// The value must contain a comma and the non-empty segment after the first
/// comma must survive a base64 decode/encode round trip unchanged. The
/// prefix before the comma is not inspected.
pub fn is_wrapped_base64(value: &str) -> bool {
    unwrap_base64(value).is_some()
}

/// Return the payload bytes of a wrapped base64 string, or `None` when the
/// value is not validly wrapped.
pub fn unwrap_base64(value: &str) -> Option<Vec<u8>> {
    let (_, body) = value.split_once(',')?;
    if body.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(body).ok()?;
    (STANDARD.encode(&bytes) == body).then_some(bytes)
}

fn format_name(value: ParamValue) -> String {
    match value {
        ParamValue::Json(Value::String(s)) => s,
        ParamValue::Json(other) | ParamValue::Object(other) => other.to_string(),
        ParamValue::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // -----------------------------------------------------------------------
    // Format sniffing
    // -----------------------------------------------------------------------

    #[test]
    fn sniff_detects_png_and_jpeg() {
        assert_eq!(sniff_image_format(&PNG_HEADER), "PNG");
        assert_eq!(sniff_image_format(&[0xFF, 0xD8, 0xFF, 0xE0]), "JPEG");
    }

    #[test]
    fn sniff_falls_back_to_png() {
        assert_eq!(sniff_image_format(b"GIF89a"), "PNG");
        assert_eq!(sniff_image_format(&[]), "PNG");
    }

    // -----------------------------------------------------------------------
    // Validity rule
    // -----------------------------------------------------------------------

    #[test]
    fn wrapped_base64_is_recognised_without_media_prefix() {
        assert!(is_wrapped_base64("data:image/PNG;base64,iVBORw0KGgo="));
        assert!(is_wrapped_base64("anything,aGVsbG8="));
    }

    #[test]
    fn strings_without_comma_or_valid_body_are_rejected() {
        assert!(!is_wrapped_base64("aGVsbG8="));
        assert!(!is_wrapped_base64("data:image/PNG;base64,"));
        assert!(!is_wrapped_base64("Hello, world"));
        assert!(!is_wrapped_base64("data:image/PNG;base64,iVBORw0KG=="));
        assert!(!is_wrapped_base64("a,aGVsbG8=,b"));
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    #[test]
    fn blobs_are_wrapped_with_sniffed_format() {
        let codec = PayloadCodec::new("image", OutputFormat::Base64);
        let params = RequestParams::new()
            .with("prompt", "cat")
            .with("image", PNG_HEADER.to_vec());

        let encoded = codec.encode_request(params);

        assert_eq!(encoded["prompt"], json!("cat"));
        assert_eq!(encoded["image"], json!("data:image/PNG;base64,iVBORw0KGgo="));
    }

    #[test]
    fn declared_format_is_consumed_and_used() {
        let codec = PayloadCodec::new("audio", OutputFormat::Base64);
        let params = RequestParams::new()
            .with("audio_format", "WAV")
            .with("audio", b"hello".to_vec());

        let encoded = codec.encode_request(params);

        assert!(!encoded.contains_key("audio_format"));
        assert_eq!(encoded["audio"], json!("data:audio/WAV;base64,aGVsbG8="));
    }

    #[test]
    fn image_format_wins_over_audio_format() {
        let codec = PayloadCodec::default();
        let params = RequestParams::new()
            .with("image_format", "JPEG")
            .with("audio_format", "WAV")
            .with("image", PNG_HEADER.to_vec());

        let encoded = codec.encode_request(params);

        assert!(!encoded.contains_key("image_format"));
        assert!(!encoded.contains_key("audio_format"));
        assert!(encoded["image"].as_str().unwrap().starts_with("data:image/JPEG;base64,"));
    }

    #[test]
    fn objects_pass_through_unless_serialization_enabled() {
        let params = RequestParams::new().with("context", ParamValue::Object(json!({"a": 1})));

        let plain = PayloadCodec::default().encode_request(params.clone());
        assert_eq!(plain["context"], json!({"a": 1}));

        let wrapped = PayloadCodec::default()
            .with_object_serialization(true)
            .encode_request(params);
        assert_eq!(
            wrapped["context"],
            json!("data:application/json;base64,eyJhIjoxfQ==")
        );
    }

    #[test]
    fn primitives_pass_through() {
        let params = RequestParams::new()
            .with("top_k", 40)
            .with("temperature", 0.8)
            .with("stream", false)
            .with("tags", json!(["a", "b"]));

        let encoded = PayloadCodec::default().encode_request(params);

        assert_eq!(encoded["top_k"], json!(40));
        assert_eq!(encoded["temperature"], json!(0.8));
        assert_eq!(encoded["stream"], json!(false));
        assert_eq!(encoded["tags"], json!(["a", "b"]));
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    #[test]
    fn bytes_mode_round_trips_blobs() {
        let codec = PayloadCodec::new("image", OutputFormat::Bytes);
        for (blob, format) in [
            (PNG_HEADER.to_vec(), None),
            (vec![0xFF, 0xD8, 0x00, 0x10], Some("JPEG")),
            (b"arbitrary bytes".to_vec(), Some("WEBP")),
        ] {
            let mut params = RequestParams::new().with("x", blob.clone());
            if let Some(format) = format {
                params.insert(IMAGE_FORMAT_KEY, format);
            }
            let decoded = codec.decode_result(codec.encode_request(params)).unwrap();
            assert_eq!(decoded["x"], ResultValue::Bytes(blob));
        }
    }

    #[test]
    fn base64_mode_leaves_wrapped_strings() {
        let codec = PayloadCodec::new("image", OutputFormat::Base64);
        let decoded = codec
            .decode_result(object(json!({"images": ["data:image/PNG;base64,iVBORw0KGgo="]})))
            .unwrap();
        assert_eq!(
            decoded["images"],
            ResultValue::List(vec![ResultValue::Json(json!(
                "data:image/PNG;base64,iVBORw0KGgo="
            ))])
        );
    }

    #[test]
    fn lists_decode_element_wise() {
        let codec = PayloadCodec::new("image", OutputFormat::Bytes);
        let decoded = codec
            .decode_result(object(json!({
                "images": ["data:image/PNG;base64,iVBORw0KGgo=", "plain", 7]
            })))
            .unwrap();
        assert_eq!(
            decoded["images"],
            ResultValue::List(vec![
                ResultValue::Bytes(PNG_HEADER.to_vec()),
                ResultValue::Json(json!("plain")),
                ResultValue::Json(json!(7)),
            ])
        );
    }

    #[test]
    fn non_wrapped_strings_pass_through_in_every_mode() {
        for mode in [OutputFormat::Base64, OutputFormat::Bytes, OutputFormat::Object] {
            let codec = PayloadCodec::new("image", mode);
            for s in ["ok", "Hello, world", "data:image/PNG;base64,", "x,not base64!"] {
                let decoded = codec.decode_result(object(json!({"x": s}))).unwrap();
                assert_eq!(decoded["x"], ResultValue::Json(json!(s)));
            }
        }
    }

    #[test]
    fn object_mode_deserializes_wrapped_json() {
        let codec = PayloadCodec::new("image", OutputFormat::Object).with_object_serialization(true);
        let params = RequestParams::new().with("ctx", ParamValue::Object(json!({"a": 1})));

        let decoded = codec.decode_result(codec.encode_request(params)).unwrap();

        assert_eq!(decoded["ctx"], ResultValue::Object(json!({"a": 1})));
    }

    #[test]
    fn object_mode_rejects_wrapped_non_json() {
        let codec = PayloadCodec::new("image", OutputFormat::Object);
        let result = codec.decode_result(object(json!({"x": "data:text/plain;base64,bm90IGpzb24="})));
        assert_matches!(result, Err(CodecError::Decode { field, .. }) if field == "x");
    }

    #[test]
    fn non_string_values_pass_through() {
        let codec = PayloadCodec::new("image", OutputFormat::Bytes);
        let decoded = codec
            .decode_result(object(json!({"success": true, "n": 3, "meta": {"k": "v"}})))
            .unwrap();
        assert_eq!(decoded["success"], ResultValue::Json(json!(true)));
        assert_eq!(decoded["n"], ResultValue::Json(json!(3)));
        assert_eq!(decoded["meta"], ResultValue::Json(json!({"k": "v"})));
    }
}
