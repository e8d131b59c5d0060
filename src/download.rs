//! First-use acquisition of model weight files over HTTP.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use kdam::{BarExt, tqdm};

use crate::error::{Error, Result};

/// Extension every stored model file carries.
pub const MODEL_EXTENSION: &str = ".bin";

pub const DEFAULT_DOWNLOAD_HOST: &str = "gpt4all.io";

const DOWNLOAD_BUFFER_SIZE: usize = 8192;

/// Append [`MODEL_EXTENSION`] unless `name` already ends with it.
///
/// # Examples
///
/// ```
/// use docqa::download::normalize_model_filename;
///
/// assert_eq!(normalize_model_filename("orca-mini"), "orca-mini.bin");
/// assert_eq!(normalize_model_filename("orca-mini.bin"), "orca-mini.bin");
/// ```
pub fn normalize_model_filename(name: &str) -> String {
    if name.ends_with(MODEL_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{MODEL_EXTENSION}")
    }
}

/// URL a model file is fetched from.
pub fn model_url(host: &str, file_name: &str) -> String {
    format!("http://{host}/models/{file_name}")
}

/// Fetches a remote file to a local path.
pub trait ModelDownloader {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// On failure `dest` must not exist afterwards.
    fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streaming blocking HTTP downloader.
///
/// The body is written in small pieces to `<dest>.part` and renamed into
/// place once complete, so the whole file is never held in memory and an
/// aborted transfer never leaves a truncated model behind.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
    show_progress: bool,
}

impl HttpDownloader {
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            // Model files are gigabytes; let the transfer take as long as
            // it needs.
            .timeout(None)
            .build()
            .map_err(|e| Error::Network(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            show_progress,
        })
    }
}

impl ModelDownloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Network(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("GET {url} returned {status}")));
        }

        let total = response.content_length();
        let part = partial_path(dest);

        let result =
            stream_to_file(&mut response, &part, total, self.show_progress)
                .and_then(|written| {
                    std::fs::rename(&part, dest)?;
                    Ok(written)
                });
        if result.is_err() {
            let _ = std::fs::remove_file(&part);
        }
        result
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn stream_to_file(
    reader: &mut impl Read,
    path: &Path,
    total: Option<u64>,
    show_progress: bool,
) -> Result<u64> {
    let mut file = BufWriter::new(File::create(path)?);
    let mut bar = show_progress.then(|| {
        tqdm!(
            total = total.unwrap_or(0) as usize,
            unit = "B",
            unit_scale = true,
            desc = "Downloading"
        )
    });

    let mut buf = vec![0u8; DOWNLOAD_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::Network(format!("reading response: {e}")))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        written += n as u64;
        if let Some(bar) = bar.as_mut() {
            bar.update(n)?;
        }
    }
    file.flush()?;

    if let Some(expected) = total
        && expected != written
    {
        return Err(Error::Network(format!(
            "transfer ended after {written} of {expected} bytes"
        )));
    }

    if bar.is_some() {
        eprintln!();
    }
    Ok(written)
}
