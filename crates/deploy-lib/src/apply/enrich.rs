//! Kind-specific enrichment applied before a resource is written

use crate::error::{DeployError, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;

/// Separator used in place of path separators in ConfigMap keys
const KEY_SEPARATOR: &str = "-";

/// Files read from a ConfigMap source path
#[derive(Debug, Default, PartialEq)]
pub struct ConfigMapEntries {
    pub data: BTreeMap<String, String>,
    pub binary_data: BTreeMap<String, ByteString>,
}

impl ConfigMapEntries {
    pub fn len(&self) -> usize {
        self.data.len() + self.binary_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, key: String, contents: Vec<u8>) {
        match String::from_utf8(contents) {
            Ok(text) => {
                self.data.insert(key, text);
            }
            Err(e) => {
                self.binary_data.insert(key, ByteString(e.into_bytes()));
            }
        }
    }
}

/// Read a file or directory tree into ConfigMap entries
///
/// A single file is keyed by its base name. Files under a directory are
/// keyed by their path relative to it, with separators replaced by `-`.
/// Content that is not valid UTF-8 goes to the binary map.
pub fn read_config_map_source(path: &Path) -> Result<ConfigMapEntries> {
    let source_err = |source: std::io::Error| DeployError::ConfigMapSource {
        path: path.to_path_buf(),
        source,
    };

    let mut entries = ConfigMapEntries::default();
    let metadata = std::fs::metadata(path).map_err(source_err)?;

    if metadata.is_file() {
        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        entries.insert(key, std::fs::read(path).map_err(source_err)?);
        return Ok(entries);
    }

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| source_err(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        let key = flatten_key(relative);
        debug!(file = %entry.path().display(), key = %key, "Adding config map entry");
        entries.insert(key, std::fs::read(entry.path()).map_err(source_err)?);
    }

    Ok(entries)
}

/// Join path components with `-` so the key fits the ConfigMap key alphabet
fn flatten_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Merge file entries into a ConfigMap; file entries win
pub fn merge_config_map_entries(config_map: &mut ConfigMap, entries: ConfigMapEntries) {
    if !entries.data.is_empty() {
        let data = config_map.data.get_or_insert_with(BTreeMap::new);
        for (key, value) in entries.data {
            if let Some(binary) = config_map.binary_data.as_mut() {
                binary.remove(&key);
            }
            data.insert(key, value);
        }
    }

    if !entries.binary_data.is_empty() {
        let binary = config_map.binary_data.get_or_insert_with(BTreeMap::new);
        for (key, value) in entries.binary_data {
            if let Some(data) = config_map.data.as_mut() {
                data.remove(&key);
            }
            binary.insert(key, value);
        }
    }
}

/// Merge additional annotations; caller-supplied values win on collision
pub fn merge_annotations(metadata: &mut ObjectMeta, additional: &BTreeMap<String, String>) {
    if additional.is_empty() {
        return;
    }
    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(additional.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Merge injected values into a Secret's stringData
pub fn merge_secret_data(secret: &mut Secret, data: &BTreeMap<String, String>) {
    if data.is_empty() {
        return;
    }
    secret
        .string_data
        .get_or_insert_with(BTreeMap::new)
        .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Build a Service update on top of the live object
///
/// Keeps the live identity and concurrency token, takes labels,
/// annotations and spec from the desired object, and keeps the allocated
/// cluster IPs unless the desired spec pins them.
pub fn merge_service(desired: Service, live: Service) -> Service {
    let mut merged = live;
    merged.metadata.labels = desired.metadata.labels;
    merged.metadata.annotations = desired.metadata.annotations;

    let mut spec = desired.spec.unwrap_or_default();
    if let Some(live_spec) = merged.spec.as_ref() {
        if spec.cluster_ip.is_none() {
            spec.cluster_ip = live_spec.cluster_ip.clone();
        }
        if spec.cluster_ips.is_none() {
            spec.cluster_ips = live_spec.cluster_ips.clone();
        }
    }
    merged.spec = Some(spec);
    merged
}
