//! Hot reload of the webhook configuration.
//!
//! A [`ConfigLoader`] owns the current compiled [`Manifest`] behind a
//! single-writer cell. Request handlers clone the `Arc` out of the cell and
//! evaluate lock-free; the reload loop is the only writer and swaps the
//! whole manifest atomically. A failed reload keeps the previous manifest.

use gwh_core::{config, Manifest, ParseError};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

/// Possible errors when loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read {path}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The file did not compile to a manifest.
    #[error("failed to compile {path}")]
    Compile {
        /// The config file path.
        path: PathBuf,
        /// Underlying compile error.
        #[source]
        source: ParseError,
    },
}

/// Loads the webhook configuration and republishes it periodically.
pub struct ConfigLoader {
    path: PathBuf,
    current: RwLock<Arc<Manifest>>,
}

impl ConfigLoader {
    /// Load the configuration once. A broken file at startup is fatal.
    pub fn new(path: impl Into<PathBuf>) -> Result<ConfigLoader, LoadError> {
        let path = path.into();
        let manifest = compile(&path)?;
        Ok(ConfigLoader {
            path,
            current: RwLock::new(Arc::new(manifest)),
        })
    }

    /// The currently published manifest. The returned `Arc` stays valid for
    /// the duration of a request even if a reload swaps the cell meanwhile.
    pub fn manifest(&self) -> Arc<Manifest> {
        self.current.read().clone()
    }

    /// Recompile the config file and publish the result.
    pub fn reload(&self) -> Result<(), LoadError> {
        let manifest = compile(&self.path)?;
        *self.current.write() = Arc::new(manifest);
        debug!(path = %self.path.display(), "reloaded webhook configuration");
        Ok(())
    }

    /// The reload loop: recompile every `period` until `stop` flips to true.
    /// Reload failures are logged and the previous manifest stays published.
    pub async fn run(&self, period: Duration, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    if let Err(err) = self.reload() {
                        error!(error = %err, "config reload failed, keeping the previous manifest");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

fn compile(path: &Path) -> Result<Manifest, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    config::from_yaml(&raw).map_err(|source| LoadError::Compile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CONFIG_V1: &str = r#"
apiVersion: generic-webhook/v1alpha1
kind: GenericWebhookConfig
webhooks:
  - name: first
    path: /first
    actions: []
"#;

    const CONFIG_V2: &str = r#"
apiVersion: generic-webhook/v1alpha1
kind: GenericWebhookConfig
webhooks:
  - name: first
    path: /first
    actions: []
  - name: second
    path: /second
    actions: []
"#;

    fn write_config(file: &mut tempfile::NamedTempFile, content: &str) {
        use std::io::{Seek, SeekFrom};
        let f = file.as_file_mut();
        f.set_len(0).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn reload_swaps_the_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, CONFIG_V1);
        let loader = ConfigLoader::new(file.path()).unwrap();
        assert_eq!(loader.manifest().webhooks().len(), 1);

        write_config(&mut file, CONFIG_V2);
        loader.reload().unwrap();
        assert_eq!(loader.manifest().webhooks().len(), 2);
    }

    #[test]
    fn a_broken_file_keeps_the_previous_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, CONFIG_V2);
        let loader = ConfigLoader::new(file.path()).unwrap();

        write_config(&mut file, "kind: not-a-webhook-config");
        assert!(loader.reload().is_err());
        assert_eq!(loader.manifest().webhooks().len(), 2);
    }

    #[test]
    fn a_broken_file_at_startup_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, "{");
        assert!(ConfigLoader::new(file.path()).is_err());
    }
}
