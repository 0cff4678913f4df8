use serde::{Deserialize, Serialize};

/// The file name the round result is uploaded as.
pub const UPLOAD_FILENAME: &str = "float-array.json";

/// The multipart field holding the round result file.
pub const UPLOAD_FIELD: &str = "file";

/// The body of the file uploaded to `/upload-json-floats` at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundUpload {
    pub params: Vec<f32>,
    #[serde(rename = "numSamples")]
    pub num_samples: usize,
    pub current_round: String,
}

impl RoundUpload {
    /// Serializes the payload into the JSON file body.
    ///
    /// # Returns
    /// The JSON bytes or a serialization error.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_the_coordinator_schema() {
        let upload = RoundUpload {
            params: vec![0.5, -1.0],
            num_samples: 8,
            current_round: "3".into(),
        };

        let value: serde_json::Value = serde_json::from_slice(&upload.to_json().unwrap()).unwrap();
        assert_eq!(value["numSamples"], 8);
        assert_eq!(value["current_round"], "3");
        assert_eq!(value["params"][1], -1.0);
    }
}
