//! `runner.*` → machine and runtime introspection
//!
//! Keys: `executionDirectory`, `tempDirectory`, `os`, `isLinux`,
//! `isWindows`, `isMacOs`, `architecture`, `availableMemory`,
//! `availableDiskSpace` (bytes), `isOnline`, `publicIp`.
//!
//! Network keys are best-effort: a failed probe answers `isOnline = false`
//! and leaves `publicIp` unresolved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

use crate::config::NoxConfig;
use crate::variable::{Namespace, Value};

use super::NamespaceResolver;

#[derive(Debug, Clone)]
pub struct RunnerResolver {
    execution_dir: PathBuf,
    probe_url: Option<String>,
    public_ip_url: Option<String>,
    client: reqwest::Client,
}

impl RunnerResolver {
    pub fn new(config: &NoxConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            execution_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            probe_url: Some(config.probe_url.clone()),
            public_ip_url: Some(config.public_ip_url.clone()),
            client,
        }
    }

    /// No network probes (`isOnline` is false, `publicIp` unresolved)
    pub fn offline() -> Self {
        Self {
            probe_url: None,
            public_ip_url: None,
            ..Self::new(&NoxConfig::default())
        }
    }

    pub fn with_execution_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.execution_dir = dir.into();
        self
    }

    async fn value_for(&self, key: &str) -> Option<Value> {
        let value = match key {
            "executiondirectory" => Value::from(self.execution_dir.display().to_string()),
            "tempdirectory" => Value::from(std::env::temp_dir().display().to_string()),
            "os" => Value::from(std::env::consts::OS),
            "islinux" => Value::Bool(cfg!(target_os = "linux")),
            "iswindows" => Value::Bool(cfg!(target_os = "windows")),
            "ismacos" => Value::Bool(cfg!(target_os = "macos")),
            "architecture" => Value::from(std::env::consts::ARCH),
            "availablememory" => Value::from(available_memory()),
            "availablediskspace" => Value::from(available_disk_space(&self.execution_dir)?),
            "isonline" => Value::Bool(self.is_online().await),
            "publicip" => Value::from(self.public_ip().await?),
            other => {
                debug!(key = other, "unknown runner variable");
                return None;
            }
        };
        Some(value)
    }

    async fn is_online(&self) -> bool {
        let Some(url) = &self.probe_url else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(url = %url, error = %e, "network probe failed");
                false
            }
        }
    }

    async fn public_ip(&self) -> Option<String> {
        let url = self.public_ip_url.as_ref()?;
        let result = async {
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await;

        match result {
            Ok(body) if !body.trim().is_empty() => Some(body.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(url = %url, error = %e, "public ip probe failed");
                None
            }
        }
    }
}

fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Free bytes on the disk whose mount point is the longest prefix of `dir`
fn available_disk_space(dir: &Path) -> Option<u64> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| dir.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

#[async_trait]
impl NamespaceResolver for RunnerResolver {
    fn namespace(&self) -> Namespace {
        Namespace::Runner
    }

    async fn resolve(&self, pending: &[String]) -> FxHashMap<String, Value> {
        let mut found = FxHashMap::default();
        for key in pending {
            if let Some(value) = self.value_for(key).await {
                found.insert(key.clone(), value);
            }
        }
        found
    }
}
