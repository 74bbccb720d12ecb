//! The patch engine: decoding a webhook's `PatchData` and applying it to a
//! JSON byte buffer, whether it's a JSON Patch (RFC 6902) or a JSON Merge
//! Patch (RFC 7396).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;

const JSON_PATCH_MEDIA_TYPE: &str = "application/json-patch+json";
const MERGE_PATCH_MEDIA_TYPE: &str = "application/merge-patch+json";

/// A patch as returned by a webhook: a media type tag plus the raw (possibly
/// base64-encoded-on-the-wire) patch bytes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PatchData {
    #[serde(default, rename = "patchType")]
    pub patch_type: String,
    #[serde(default, rename = "patchData", with = "base64_bytes")]
    pub patch_data: Vec<u8>,
}

impl PatchData {
    /// Is this patch empty, i.e. a declared no-op?
    pub fn is_empty(&self) -> bool {
        self.patch_data.is_empty()
    }

    /// Apply this patch to `doc`, replacing it in place. A no-op if empty.
    pub fn apply(&self, doc: &mut Value) -> Result<(), PatchError> {
        if self.is_empty() {
            return Ok(());
        }
        match self.patch_type.as_str() {
            JSON_PATCH_MEDIA_TYPE => apply_json_patch(doc, &self.patch_data),
            MERGE_PATCH_MEDIA_TYPE => apply_merge_patch(doc, &self.patch_data),
            other => Err(PatchError::UnknownPatchType(other.to_owned())),
        }
    }
}

fn apply_json_patch(doc: &mut Value, raw: &[u8]) -> Result<(), PatchError> {
    let patch: json_patch::Patch =
        serde_json::from_slice(raw).map_err(|e| PatchError::Decode(e.to_string()))?;
    json_patch::patch(doc, &patch).map_err(|e| PatchError::Apply(e.to_string()))
}

fn apply_merge_patch(doc: &mut Value, raw: &[u8]) -> Result<(), PatchError> {
    let merge: Value =
        serde_json::from_slice(raw).map_err(|e| PatchError::Decode(e.to_string()))?;
    json_patch::merge(doc, &merge);
    Ok(())
}

/// Apply a patch to a raw JSON byte buffer, returning the re-serialized
/// result. Used by the interception handler, which only ever holds bytes.
pub fn apply_to_bytes(patch: &PatchData, body: &[u8]) -> Result<Vec<u8>, PatchError> {
    if patch.is_empty() {
        return Ok(body.to_vec());
    }
    let mut doc: Value =
        serde_json::from_slice(body).map_err(|e| PatchError::Decode(e.to_string()))?;
    patch.apply(&mut doc)?;
    serde_json::to_vec(&doc).map_err(|e| PatchError::Decode(e.to_string()))
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
