//! ConfigMaps storage driver
//!
//! Every revision is one ConfigMap named after [`Release::storage_key`] in a
//! single namespace, holding the base64 encoded, compressed JSON record.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;
use tracing::warn;

use super::{
    CompressionMethod, LABEL_COMPRESSION, LABEL_MANAGED_BY, LABEL_NAME, StorageDriver,
    decode_from_storage, encode_for_storage, sort_newest_first, storage_labels,
};
use crate::error::{ReleaseError, Result};
use crate::release::{Release, storage_key};

const DATA_KEY: &str = "release";

pub struct ConfigMapsDriver {
    client: Client,
    namespace: String,
    compression: CompressionMethod,
}

impl ConfigMapsDriver {
    pub fn new(client: Client, namespace: impl Into<String>, compression: CompressionMethod) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            compression,
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build_config_map(&self, release: &Release) -> Result<ConfigMap> {
        let mut labels = storage_labels(release);
        labels.insert(
            LABEL_COMPRESSION.to_string(),
            self.compression.label().to_string(),
        );

        let mut data = BTreeMap::new();
        data.insert(
            DATA_KEY.to_string(),
            encode_for_storage(release, self.compression)?,
        );

        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(release.storage_key()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        })
    }

    async fn list_selected(&self, selector: &str) -> Result<Vec<Release>> {
        let lp = ListParams::default().labels(selector);
        let items = self.api().list(&lp).await?.items;

        items
            .iter()
            .map(|cm| {
                parse_config_map(cm, self.compression).inspect_err(|e| {
                    warn!(
                        config_map = cm.metadata.name.as_deref().unwrap_or_default(),
                        error = %e,
                        "unreadable release record"
                    )
                })
            })
            .collect()
    }
}

/// Decode the record held by a ConfigMap. Records written with another
/// compression carry it in a label; `fallback` covers unlabelled ones.
fn parse_config_map(cm: &ConfigMap, fallback: CompressionMethod) -> Result<Release> {
    let encoded = cm
        .data
        .as_ref()
        .and_then(|d| d.get(DATA_KEY))
        .ok_or_else(|| ReleaseError::Storage("ConfigMap missing 'release' data".to_string()))?;

    let compression = cm
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_COMPRESSION))
        .and_then(|c| CompressionMethod::from_label(c))
        .unwrap_or(fallback);

    decode_from_storage(encoded, compression)
}

#[async_trait]
impl StorageDriver for ConfigMapsDriver {
    fn name(&self) -> &'static str {
        "configmaps"
    }

    async fn get(&self, name: &str, version: u32) -> Result<Release> {
        match self.api().get(&storage_key(name, version)).await {
            Ok(cm) => parse_config_map(&cm, self.compression),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                Err(ReleaseError::ReleaseNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn history(&self, name: &str) -> Result<Vec<Release>> {
        let selector = format!("{}=keel,{}={}", LABEL_MANAGED_BY, LABEL_NAME, name);
        let mut releases = self.list_selected(&selector).await?;
        if releases.is_empty() {
            return Err(ReleaseError::ReleaseNotFound(name.to_string()));
        }
        sort_newest_first(&mut releases);
        Ok(releases)
    }

    async fn list(&self) -> Result<Vec<Release>> {
        self.list_selected(&format!("{}=keel", LABEL_MANAGED_BY)).await
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let cm = self.build_config_map(release)?;
        match self.api().create(&PostParams::default(), &cm).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                Err(ReleaseError::ReleaseExists(release.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let cm = self.build_config_map(release)?;
        let api = self.api();
        match api.replace(&release.storage_key(), &PostParams::default(), &cm).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                api.create(&PostParams::default(), &cm).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str, version: u32) -> Result<Release> {
        let release = self.get(name, version).await?;
        match self
            .api()
            .delete(&storage_key(name, version), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(release),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(release),
            Err(e) => Err(e.into()),
        }
    }
}
