//! Publishing a dataset folder to the HuggingFace Hub
//!
//! Upload follows the Hub commit protocol:
//! 1. `preupload` asks the Hub which files must go through git-LFS,
//! 2. LFS files are pushed through the LFS batch API (basic transfer),
//! 3. a single NDJSON commit references regular files inline and LFS files
//!    by their sha256 oid.

use crate::error::{Error, Result};
use crate::secrets::SecretString;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_REVISION: &str = "main";

const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";
const SAMPLE_SIZE: usize = 512;

/// A local file and the path it should have inside the repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub repo_path: String,
    pub local_path: PathBuf,
}

impl UploadFile {
    pub fn new(repo_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            local_path: local_path.into(),
        }
    }
}

/// Size, head sample and sha256 of a file, as the Hub wants them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub sample: Vec<u8>,
    pub sha256: String,
}

impl FileDigest {
    pub fn of<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut hasher = Sha256::new();
        let mut sample = Vec::with_capacity(SAMPLE_SIZE);
        let mut buf = [0_u8; 64 * 1024];
        let mut size = 0_u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if sample.len() < SAMPLE_SIZE {
                let take = (SAMPLE_SIZE - sample.len()).min(n);
                sample.extend_from_slice(&buf[..take]);
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Self {
            size,
            sample,
            sha256: hex(&hasher.finalize()),
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    oid: String,
    actions: Option<LfsActions>,
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

/// One entry of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOperation {
    /// Small file sent inline, base64 encoded.
    Regular { path: String, content: Vec<u8> },
    /// File already stored through LFS, referenced by oid.
    Lfs { path: String, oid: String, size: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub commit_url: Option<String>,
    pub commit_oid: Option<String>,
}

/// Split `owner/name` into its organization and name parts.
pub fn split_repo_id(repo_id: &str) -> Result<(Option<&str>, &str)> {
    match repo_id.split_once('/') {
        Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((Some(org), name))
        }
        None if !repo_id.is_empty() => Ok((None, repo_id)),
        _ => Err(Error::Hub(format!("invalid repo id `{repo_id}`"))),
    }
}

/// NDJSON body of a commit: a header line followed by one line per file.
pub fn commit_payload(summary: &str, operations: &[CommitOperation]) -> Result<String> {
    let mut lines = vec![serde_json::to_string(&json!({
        "key": "header",
        "value": {"summary": summary, "description": ""},
    }))?];
    for op in operations {
        let line = match op {
            CommitOperation::Regular { path, content } => json!({
                "key": "file",
                "value": {"content": BASE64.encode(content), "path": path, "encoding": "base64"},
            }),
            CommitOperation::Lfs { path, oid, size } => json!({
                "key": "lfsFile",
                "value": {"path": path, "algo": "sha256", "oid": oid, "size": size},
            }),
        };
        lines.push(serde_json::to_string(&line)?);
    }
    Ok(lines.join("\n"))
}

#[derive(Debug, Serialize)]
struct PreuploadEntry<'a> {
    path: &'a str,
    sample: String,
    size: u64,
}

/// Client for the Hub HTTP API.
#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
    endpoint: String,
    token: SecretString,
}

impl HubClient {
    pub fn new(endpoint: impl Into<String>, token: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<std::time::Duration>)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.expose_secret())
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().unwrap_or_default();
        Err(Error::Hub(format!("{status} from {url}: {body}")))
    }

    fn api_url(&self, repo_id: &str, action: &str, revision: &str) -> String {
        format!(
            "{}/api/datasets/{repo_id}/{action}/{}",
            self.endpoint,
            revision.replace('/', "%2F")
        )
    }

    /// Create a dataset repo. An already existing repo is not an error.
    pub fn create_repo(&self, repo_id: &str, private: bool) -> Result<()> {
        let (organization, name) = split_repo_id(repo_id)?;
        let mut body = json!({"type": "dataset", "name": name, "private": private});
        if let Some(org) = organization {
            body["organization"] = json!(org);
        }
        let response = self
            .authed(self.client.post(format!("{}/api/repos/create", self.endpoint)))
            .json(&body)
            .send()?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::info!(repo_id, "dataset repo already exists");
            return Ok(());
        }
        Self::check(response)?;
        tracing::info!(repo_id, private, "created dataset repo");
        Ok(())
    }

    fn preupload(
        &self,
        repo_id: &str,
        revision: &str,
        files: &[(&UploadFile, FileDigest)],
    ) -> Result<HashMap<String, PreuploadFile>> {
        let entries: Vec<PreuploadEntry<'_>> = files
            .iter()
            .map(|(file, digest)| PreuploadEntry {
                path: &file.repo_path,
                sample: BASE64.encode(&digest.sample),
                size: digest.size,
            })
            .collect();
        let response = self
            .authed(self.client.post(self.api_url(repo_id, "preupload", revision)))
            .json(&json!({ "files": entries }))
            .send()?;
        let parsed: PreuploadResponse = Self::check(response)?.json()?;
        Ok(parsed
            .files
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect())
    }

    fn upload_lfs(
        &self,
        repo_id: &str,
        revision: &str,
        file: &UploadFile,
        digest: &FileDigest,
    ) -> Result<()> {
        let batch_url = format!(
            "{}/datasets/{repo_id}.git/info/lfs/objects/batch",
            self.endpoint
        );
        let request = json!({
            "operation": "upload",
            "transfers": ["basic"],
            "objects": [{"oid": digest.sha256, "size": digest.size}],
            "hash_algo": "sha256",
            "ref": {"name": revision},
        });
        let response = self
            .authed(self.client.post(batch_url))
            .header(reqwest::header::ACCEPT, LFS_CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(serde_json::to_vec(&request)?)
            .send()?;
        let batch: LfsBatchResponse = Self::check(response)?.json()?;
        let object = batch
            .objects
            .into_iter()
            .find(|o| o.oid == digest.sha256)
            .ok_or_else(|| {
                Error::Hub(format!("LFS batch missing object for {}", file.repo_path))
            })?;
        if let Some(err) = object.error {
            return Err(Error::Hub(format!(
                "LFS rejected {} ({}): {}",
                file.repo_path, err.code, err.message
            )));
        }

        let Some(actions) = object.actions else {
            tracing::info!(path = file.repo_path.as_str(), "LFS object already on the Hub");
            return Ok(());
        };
        if let Some(upload) = actions.upload {
            if upload.header.contains_key("chunk_size") {
                return Err(Error::Hub(format!(
                    "{} needs a multipart LFS upload, which is not supported",
                    file.repo_path
                )));
            }
            tracing::info!(
                path = file.repo_path.as_str(),
                bytes = digest.size,
                "uploading LFS object"
            );
            let mut put = self
                .client
                .put(&upload.href)
                .body(Body::from(File::open(&file.local_path)?));
            for (name, value) in &upload.header {
                put = put.header(name.as_str(), value.as_str());
            }
            Self::check(put.send()?)?;
        }
        if let Some(verify) = actions.verify {
            let mut post = self
                .authed(self.client.post(&verify.href))
                .json(&json!({"oid": digest.sha256, "size": digest.size}));
            for (name, value) in &verify.header {
                post = post.header(name.as_str(), value.as_str());
            }
            Self::check(post.send()?)?;
        }
        Ok(())
    }

    /// Upload `files` to a dataset repo as a single commit.
    pub fn upload_folder(
        &self,
        repo_id: &str,
        revision: &str,
        files: &[UploadFile],
        summary: &str,
    ) -> Result<CommitInfo> {
        let digests = files
            .iter()
            .map(|f| -> Result<_> { Ok((f, FileDigest::of(&f.local_path)?)) })
            .collect::<Result<Vec<_>>>()?;
        let modes = self.preupload(repo_id, revision, &digests)?;
        let planned = digests
            .iter()
            .map(|(file, digest)| -> Result<_> {
                let mode = modes.get(&file.repo_path).ok_or_else(|| {
                    Error::Hub(format!(
                        "preupload response does not mention {}",
                        file.repo_path
                    ))
                })?;
                Ok((*file, digest, mode))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut operations = Vec::with_capacity(planned.len());
        for (file, digest, mode) in planned {
            if mode.should_ignore {
                tracing::warn!(path = file.repo_path.as_str(), "Hub ignores this path, skipping");
                continue;
            }
            match mode.upload_mode {
                UploadMode::Lfs => {
                    self.upload_lfs(repo_id, revision, file, digest)?;
                    operations.push(CommitOperation::Lfs {
                        path: file.repo_path.clone(),
                        oid: digest.sha256.clone(),
                        size: digest.size,
                    });
                }
                UploadMode::Regular => operations.push(CommitOperation::Regular {
                    path: file.repo_path.clone(),
                    content: std::fs::read(&file.local_path)?,
                }),
            }
        }

        let response = self
            .authed(self.client.post(self.api_url(repo_id, "commit", revision)))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(commit_payload(summary, &operations)?)
            .send()?;
        let info: CommitInfo = Self::check(response)?.json()?;
        tracing::info!(
            repo_id,
            files = operations.len(),
            commit = info.commit_oid.as_deref().unwrap_or("?"),
            "pushed commit"
        );
        Ok(info)
    }
}
