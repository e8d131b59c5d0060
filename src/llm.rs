//! Language model adapter.
//!
//! [`LocalModel`] owns a local inference engine behind the uniform
//! [`TextGenerator`] contract. Opening it makes sure the weights file is
//! present, downloading it once when allowed. A model whose file could not
//! be obtained still opens, but every call to
//! [`generate`](TextGenerator::generate) fails with
//! [`Error::ModelUnavailable`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    config::{Backend, ModelConfig},
    download::{ModelDownloader, model_url},
    error::{Error, Result},
    params::{ModelParameters, ParameterOverrides},
};

/// A loaded model that turns a prompt into text.
pub trait InferenceEngine {
    /// Generate a continuation of `prompt`, cut before the first stop
    /// sequence.
    fn complete(
        &mut self,
        prompt: &str,
        stop: &[String],
        params: &ModelParameters,
    ) -> Result<String>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn complete(
        &mut self,
        prompt: &str,
        stop: &[String],
        params: &ModelParameters,
    ) -> Result<String> {
        (**self).complete(prompt, stop, params)
    }
}

/// Anything that can answer a prompt.
pub trait TextGenerator {
    fn generate(
        &mut self,
        prompt: &str,
        stop: Option<&[String]>,
        overrides: &ParameterOverrides,
    ) -> Result<String>;
}

enum State<E> {
    Ready(E),
    Unavailable(String),
}

/// Parameters that identify a [`LocalModel`].
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyingParams {
    pub model: String,
    pub model_path: PathBuf,
    pub backend: Backend,
    pub available: bool,
    pub parameters: ModelParameters,
}

pub struct LocalModel<E> {
    name: String,
    path: PathBuf,
    backend: Backend,
    defaults: ModelParameters,
    state: State<E>,
}

impl<E: InferenceEngine> LocalModel<E> {
    /// Make sure the model file exists and load it with `load`.
    ///
    /// A missing file is downloaded through `downloader` only when
    /// `config.allow_download` is set. When the file cannot be obtained the
    /// problem is logged and the returned model is unavailable. Errors from
    /// `load` itself are returned.
    pub fn open<D, L>(
        config: &ModelConfig,
        downloader: &D,
        load: L,
    ) -> Result<Self>
    where
        D: ModelDownloader + ?Sized,
        L: FnOnce(&Path) -> Result<E>,
    {
        let path = config.path();

        let state = match ensure_model_file(config, &path, downloader) {
            Ok(()) => State::Ready(load(&path)?),
            Err(reason) => State::Unavailable(reason),
        };

        Ok(Self {
            name: config.name.clone(),
            path,
            backend: config.backend,
            defaults: config.parameters,
            state,
        })
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> &ModelParameters {
        &self.defaults
    }

    /// Release the engine. Later calls to `generate` fail.
    pub fn close(&mut self) {
        if self.is_available() {
            tracing::debug!(model = %self.name, "closing language model");
        }
        self.state = State::Unavailable("model was closed".into());
    }

    pub fn identifying_params(&self) -> IdentifyingParams {
        IdentifyingParams {
            model: self.name.clone(),
            model_path: self.path.clone(),
            backend: self.backend,
            available: self.is_available(),
            parameters: self.defaults,
        }
    }
}

impl<E: InferenceEngine> TextGenerator for LocalModel<E> {
    fn generate(
        &mut self,
        prompt: &str,
        stop: Option<&[String]>,
        overrides: &ParameterOverrides,
    ) -> Result<String> {
        let params = self.defaults.merge(overrides);
        match &mut self.state {
            State::Ready(engine) => {
                engine.complete(prompt, stop.unwrap_or_default(), &params)
            }
            State::Unavailable(reason) => Err(Error::ModelUnavailable(
                format!("{}: {reason}", self.name),
            )),
        }
    }
}

impl<E> std::fmt::Debug for LocalModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalModel")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("available", &matches!(self.state, State::Ready(_)))
            .finish_non_exhaustive()
    }
}

/// Make sure `path` exists, downloading it if allowed. The error is a
/// human-readable reason the model is unavailable.
fn ensure_model_file<D>(
    config: &ModelConfig,
    path: &Path,
    downloader: &D,
) -> std::result::Result<(), String>
where
    D: ModelDownloader + ?Sized,
{
    if path.is_file() {
        tracing::debug!(path = %path.display(), "model file present");
        return Ok(());
    }

    if !config.allow_download {
        let reason = format!(
            "model file {} not found and downloads are disabled",
            path.display()
        );
        tracing::warn!("{reason}; pass --allow-download to fetch it");
        return Err(reason);
    }

    let url = model_url(&config.download_host, &config.file_name());
    tracing::info!(%url, dest = %path.display(), "downloading model");

    let result = std::fs::create_dir_all(&config.folder)
        .map_err(Error::from)
        .and_then(|()| downloader.download(&url, path));

    match result {
        Ok(bytes) => {
            tracing::info!(bytes, "model downloaded");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%url, error = %e, "model download failed");
            Err(format!("download of {url} failed: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Default)]
    struct CountingDownloader {
        calls: Cell<usize>,
        fail: bool,
    }

    impl ModelDownloader for CountingDownloader {
        fn download(&self, _url: &str, dest: &Path) -> Result<u64> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(Error::Network("connection refused".into()));
            }
            std::fs::write(dest, b"weights")?;
            Ok(7)
        }
    }

    #[derive(Default)]
    struct Echo {
        seen: RefCell<Vec<ModelParameters>>,
    }

    impl InferenceEngine for Echo {
        fn complete(
            &mut self,
            prompt: &str,
            stop: &[String],
            params: &ModelParameters,
        ) -> Result<String> {
            self.seen.borrow_mut().push(*params);
            Ok(format!("{prompt}|{}", stop.join(",")))
        }
    }

    fn config(folder: &Path) -> ModelConfig {
        ModelConfig::new("tiny", folder)
    }

    #[test]
    fn existing_file_is_not_downloaded() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("tiny.bin"), b"weights").unwrap();
        let mut config = config(tmp.path());
        config.allow_download = true;
        let downloader = CountingDownloader::default();

        let model =
            LocalModel::open(&config, &downloader, |_| Ok(Echo::default()))
                .unwrap();

        assert_eq!(downloader.calls.get(), 0);
        assert!(model.is_available());
    }

    #[test]
    fn missing_file_is_downloaded_when_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(&tmp.path().join("models"));
        config.allow_download = true;
        let downloader = CountingDownloader::default();

        let model =
            LocalModel::open(&config, &downloader, |_| Ok(Echo::default()))
                .unwrap();

        assert_eq!(downloader.calls.get(), 1);
        assert!(model.is_available());
        assert!(config.path().is_file());
    }

    #[test]
    fn missing_file_without_download_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let downloader = CountingDownloader::default();

        let mut model = LocalModel::open(
            &config(tmp.path()),
            &downloader,
            |_| -> Result<Echo> { panic!("must not load") },
        )
        .unwrap();

        assert_eq!(downloader.calls.get(), 0);
        assert!(!model.is_available());
        let err = model
            .generate("hi", None, &ParameterOverrides::default())
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[test]
    fn failed_download_is_unavailable_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.allow_download = true;
        let downloader = CountingDownloader {
            fail: true,
            ..Default::default()
        };

        let mut model =
            LocalModel::open(&config, &downloader, |_| Ok(Echo::default()))
                .unwrap();

        assert_eq!(downloader.calls.get(), 1);
        assert!(!model.is_available());
        assert!(matches!(
            model.generate("hi", None, &ParameterOverrides::default()),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn generate_merges_overrides_and_passes_stop() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("tiny.bin"), b"weights").unwrap();
        let downloader = CountingDownloader::default();
        let mut model = LocalModel::open(
            &config(tmp.path()),
            &downloader,
            |_| Ok(Echo::default()),
        )
        .unwrap();

        let stop = vec!["###".to_string()];
        let overrides = ParameterOverrides {
            temp: Some(0.0),
            ..Default::default()
        };
        let out = model.generate("prompt", Some(&stop), &overrides).unwrap();
        assert_eq!(out, "prompt|###");

        let State::Ready(engine) = &model.state else {
            panic!("model should be ready");
        };
        let seen = engine.seen.borrow();
        assert_eq!(seen[0].temp, 0.0);
        assert_eq!(seen[0].top_k, ModelParameters::default().top_k);
    }

    #[test]
    fn close_makes_model_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("tiny.bin"), b"weights").unwrap();
        let downloader = CountingDownloader::default();
        let mut model = LocalModel::open(
            &config(tmp.path()),
            &downloader,
            |_| Ok(Echo::default()),
        )
        .unwrap();

        model.close();
        assert!(!model.is_available());
        assert!(matches!(
            model.generate("hi", None, &ParameterOverrides::default()),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn identifying_params_describe_the_model() {
        let tmp = tempfile::tempdir().unwrap();
        let downloader = CountingDownloader::default();
        let model = LocalModel::open(
            &config(tmp.path()),
            &downloader,
            |_| Ok(Echo::default()),
        )
        .unwrap();

        let params = model.identifying_params();
        assert_eq!(params.model, "tiny");
        assert_eq!(params.model_path, tmp.path().join("tiny.bin"));
        assert!(!params.available);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["backend"], "llama");
        assert_eq!(json["parameters"]["top_k"], 40);
    }

    #[test]
    fn load_errors_propagate() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("tiny.bin"), b"weights").unwrap();
        let downloader = CountingDownloader::default();

        let result = LocalModel::<Echo>::open(
            &config(tmp.path()),
            &downloader,
            |_| Err(Error::Config("bad weights".into())),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
