//! Bearer authenticated requests to the coordinator's http api.

use log::debug;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use url::Url;

use crate::{Result, RoundUpload, UPLOAD_FIELD, UPLOAD_FILENAME};

/// The coordinator's endpoint paths.
pub mod endpoints {
    pub const TRAINING_GRAPH: &str = "download-onnx-training-model";
    pub const EVAL_GRAPH: &str = "download-onnx-training-eval-model";
    pub const OPTIMIZER_GRAPH: &str = "download-onnx-optimizer";
    pub const CHECKPOINT: &str = "download-FL-checkpoint";
    pub const UPLOAD: &str = "upload-json-floats";
}

/// Client for the coordinator's http api, every request carries the bearer token.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: Client,
    base: Url,
    token: String,
}

impl CoordinatorClient {
    /// Creates a new `CoordinatorClient`.
    ///
    /// # Arguments
    /// * `base` - The api base url, endpoint paths are resolved relative to it.
    /// * `token` - The user's bearer token.
    pub fn new(mut base: Url, token: impl Into<String>) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Self {
            http: Client::new(),
            base,
            token: token.into(),
        }
    }

    /// Resolves an endpoint path against the base url.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// Downloads a binary asset, the coordinator serves them through empty `POST` requests.
    ///
    /// # Arguments
    /// * `path` - The endpoint path.
    ///
    /// # Returns
    /// The response body or a `CommsErr` on network, auth or status failures.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(path)?;

        let bytes = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        debug!(endpoint = path, bytes = bytes.len(); "downloaded asset");
        Ok(bytes.to_vec())
    }

    /// Uploads a round result as a multipart json file.
    ///
    /// # Arguments
    /// * `upload` - The round result.
    pub async fn upload_round(&self, upload: &RoundUpload) -> Result<()> {
        let url = self.endpoint(endpoints::UPLOAD)?;

        let part = Part::bytes(upload.to_json()?)
            .file_name(UPLOAD_FILENAME)
            .mime_str("application/json")?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        self.http
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        debug!(round = upload.current_round.as_str(); "uploaded round result");
        Ok(())
    }
}
