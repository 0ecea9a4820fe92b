//! Weight and tokenizer downloads from HuggingFace Hub

use super::{ProgressCallback, RuntimeProgress};
use crate::planner::Precision;
use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::api::Progress;
use hf_hub::{Cache, Repo, RepoType};
use std::path::PathBuf;
use tracing::{debug, info};

/// Downloads model files, reusing the local HuggingFace cache
pub struct ModelDownloader {
    api: Api,
    cache: Cache,
}

impl ModelDownloader {
    /// Uses the standard HuggingFace cache location
    pub fn new() -> Result<Self> {
        let cache = Cache::from_env();
        let api = ApiBuilder::from_cache(cache.clone())
            .with_progress(false)
            .build()
            .context("Failed to initialize HuggingFace Hub API")?;

        debug!("HuggingFace cache directory: {}", cache.path().display());
        Ok(Self { api, cache })
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir).context("Failed to create model cache directory")?;

        let cache = Cache::new(cache_dir);
        let api = ApiBuilder::from_cache(cache.clone())
            .with_progress(false)
            .build()
            .context("Failed to initialize HuggingFace Hub API")?;

        Ok(Self { api, cache })
    }

    pub fn cache_dir(&self) -> &PathBuf {
        self.cache.path()
    }

    /// Local path of an already downloaded file
    pub fn cached(&self, repo_id: &str, filename: &str) -> Option<PathBuf> {
        self.cache
            .repo(Repo::new(repo_id.to_string(), RepoType::Model))
            .get(filename)
            .filter(|path| path.exists())
    }

    /// Fetches one file, reporting byte progress through `progress`
    ///
    /// Blocking; call from `spawn_blocking` on async paths.
    pub fn fetch(&self, repo_id: &str, filename: &str, progress: &ProgressCallback) -> Result<PathBuf> {
        if let Some(path) = self.cached(repo_id, filename) {
            debug!("{}/{} already cached at {}", repo_id, filename, path.display());
            progress(RuntimeProgress::Done {
                file: filename.to_string(),
            });
            return Ok(path);
        }

        info!("Downloading {} from {}", filename, repo_id);
        let repo = self
            .api
            .repo(Repo::new(repo_id.to_string(), RepoType::Model));
        let reporter = CallbackProgress::new(progress.clone());

        repo.download_with_progress(filename, reporter)
            .with_context(|| format!("Failed to download {} from {}", filename, repo_id))
    }

    /// Resolves and fetches the GGUF weights for `model_ref` at `precision`
    ///
    /// `model_ref` is either `org/repo` or `org/repo:file.gguf`. Without an
    /// explicit file the repository listing is searched for a matching one.
    pub fn fetch_weights(
        &self,
        model_ref: &str,
        precision: Precision,
        progress: &ProgressCallback,
    ) -> Result<PathBuf> {
        let (repo_id, filename) = match split_model_ref(model_ref) {
            (repo_id, Some(file)) => (repo_id, file.to_string()),
            (repo_id, None) => (repo_id, self.resolve_weight_file(repo_id, precision)?),
        };
        self.fetch(repo_id, &filename, progress)
    }

    pub fn fetch_tokenizer(&self, repo_id: &str, progress: &ProgressCallback) -> Result<PathBuf> {
        self.fetch(repo_id, "tokenizer.json", progress)
            .with_context(|| format!("No tokenizer.json in {}", repo_id))
    }

    fn resolve_weight_file(&self, repo_id: &str, precision: Precision) -> Result<String> {
        let info = self
            .api
            .repo(Repo::new(repo_id.to_string(), RepoType::Model))
            .info()
            .with_context(|| format!("Failed to list files of {}", repo_id))?;

        let files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
        pick_weight_file(&files, precision).ok_or_else(|| {
            anyhow::anyhow!(
                "{} has no single-file GGUF weights at precision {}",
                repo_id,
                precision
            )
        })
    }
}

/// `org/repo:file` → (`org/repo`, Some(`file`))
pub(crate) fn split_model_ref(model_ref: &str) -> (&str, Option<&str>) {
    match model_ref.split_once(':') {
        Some((repo, file)) if !file.is_empty() => (repo, Some(file)),
        Some((repo, _)) => (repo, None),
        None => (model_ref, None),
    }
}

fn precision_tags(precision: Precision) -> &'static [&'static str] {
    match precision {
        Precision::Q4 => &["q4_k_m", "q4_0", "q4_k_s"],
        Precision::Q8 => &["q8_0"],
        Precision::Fp16 => &["fp16", "f16"],
        Precision::Fp32 => &["fp32", "f32"],
    }
}

/// First unsharded `.gguf` file tagged with `precision`, in tag preference order
pub(crate) fn pick_weight_file(files: &[String], precision: Precision) -> Option<String> {
    let candidates: Vec<&String> = files
        .iter()
        .filter(|f| f.to_lowercase().ends_with(".gguf"))
        .filter(|f| !f.contains("-of-"))
        .collect();

    precision_tags(precision).iter().find_map(|tag| {
        candidates
            .iter()
            .find(|f| f.to_lowercase().contains(tag))
            .map(|f| f.to_string())
    })
}

/// Forwards hf-hub download progress as [`RuntimeProgress`] events
#[derive(Clone)]
struct CallbackProgress {
    callback: ProgressCallback,
    file: String,
    loaded: u64,
    total: Option<u64>,
}

impl CallbackProgress {
    fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            file: String::new(),
            loaded: 0,
            total: None,
        }
    }
}

impl Progress for CallbackProgress {
    fn init(&mut self, size: usize, filename: &str) {
        self.file = filename.to_string();
        self.loaded = 0;
        self.total = Some(size as u64).filter(|s| *s > 0);
        (self.callback)(RuntimeProgress::Initiate {
            file: self.file.clone(),
        });
    }

    fn update(&mut self, size: usize) {
        self.loaded += size as u64;
        (self.callback)(RuntimeProgress::Download {
            file: self.file.clone(),
            loaded: self.loaded,
            total: self.total,
        });
    }

    fn finish(&mut self) {
        (self.callback)(RuntimeProgress::Done {
            file: self.file.clone(),
        });
    }
}
