use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Location of the default document relative to the deployment base.
pub const DEFAULT_CONFIG_PATH: &str = "widgets.config.json";

/// Supplies the remote default configuration document.
pub trait DefaultDocumentSource: Send + Sync {
    fn fetch_default(&self) -> Result<String>;
    /// Where the document is read from, for logs.
    fn location(&self) -> String;
}

/// Fetches the default document over HTTP(S).
pub struct HttpDefaultSource {
    client: Client,
    url: Url,
}

impl HttpDefaultSource {
    pub fn new(base: &Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: document_url(base)?,
        })
    }
}

impl DefaultDocumentSource for HttpDefaultSource {
    fn fetch_default(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .with_context(|| format!("request for {} failed", self.url))?
            .error_for_status()?;
        Ok(resp.text()?)
    }

    fn location(&self) -> String {
        self.url.to_string()
    }
}

/// Reads the default document from a local deployment directory.
pub struct FileDefaultSource {
    path: PathBuf,
}

impl FileDefaultSource {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join(DEFAULT_CONFIG_PATH),
        }
    }
}

impl DefaultDocumentSource for FileDefaultSource {
    fn fetch_default(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// `base` joined with the default document path, keeping the last segment of
/// the base as a directory.
fn document_url(base: &Url) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DEFAULT_CONFIG_PATH)
        .map_err(|e| anyhow!("invalid default document url: {e}"))
}

/// Pick a source for a deployment base given as URL or local directory.
pub fn default_source_for(base: &str) -> Result<Box<dyn DefaultDocumentSource>> {
    match Url::parse(base) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(Box::new(HttpDefaultSource::new(&url)?))
        }
        Ok(url) if url.scheme() == "file" => {
            let dir = url
                .to_file_path()
                .map_err(|_| anyhow!("{base} is not a local path"))?;
            Ok(Box::new(FileDefaultSource::new(dir)))
        }
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => Err(anyhow!(
            "unsupported deployment base scheme `{}`",
            url.scheme()
        )),
        _ => Ok(Box::new(FileDefaultSource::new(base))),
    }
}
