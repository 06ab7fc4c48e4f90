// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-file [`SnapshotStore`] implementation.
//!
//! The snapshot is split across three files in a data directory, one per
//! concern: `conversations.json` (conversations plus phone index and sticky
//! channels), `funnels.json`, and `triggers.json`. Missing files load as
//! empty; writes go through a temp file and rename so a crash mid-flush
//! never leaves a truncated snapshot behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flowzap_core::conversation::Conversation;
use flowzap_core::error::FlowzapError;
use flowzap_core::funnel::Funnel;
use flowzap_core::snapshot::{SystemSnapshot, TriggerEntry};
use flowzap_core::traits::SnapshotStore;
use flowzap_core::types::{ChannelId, ContactKey};

const CONVERSATIONS_FILE: &str = "conversations.json";
const FUNNELS_FILE: &str = "funnels.json";
const TRIGGERS_FILE: &str = "triggers.json";

/// On-disk shape of `conversations.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConversationsFile {
    #[serde(default)]
    conversations: Vec<Conversation>,
    #[serde(default)]
    phone_index: Vec<(String, ContactKey)>,
    #[serde(default)]
    sticky_channels: Vec<(ContactKey, ChannelId)>,
}

/// Snapshot store over plain JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    data_dir: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, FlowzapError> {
        let path = self.data_dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    FlowzapError::Storage {
                        source: Box::new(e),
                    }
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FlowzapError::Storage {
                source: Box::new(e),
            }),
        }
    }

    async fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), FlowzapError> {
        let path = self.data_dir.join(file);
        let tmp = self.data_dir.join(format!("{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| FlowzapError::Storage {
            source: Box::new(e),
        })?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| FlowzapError::Storage {
                source: Box::new(e),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| FlowzapError::Storage {
                source: Box::new(e),
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot file written");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Option<SystemSnapshot>, FlowzapError> {
        let conversations: Option<ConversationsFile> =
            self.read_json(CONVERSATIONS_FILE).await?;
        let funnels: Option<Vec<Funnel>> = self.read_json(FUNNELS_FILE).await?;
        let triggers: Option<Vec<TriggerEntry>> = self.read_json(TRIGGERS_FILE).await?;

        if conversations.is_none() && funnels.is_none() && triggers.is_none() {
            return Ok(None);
        }

        let conversations = conversations.unwrap_or_default();
        let snapshot = SystemSnapshot {
            conversations: conversations.conversations,
            phone_index: conversations.phone_index,
            sticky_channels: conversations.sticky_channels,
            funnels: funnels.unwrap_or_default(),
            triggers: triggers.unwrap_or_default(),
        };
        info!(
            conversations = snapshot.conversations.len(),
            funnels = snapshot.funnels.len(),
            triggers = snapshot.triggers.len(),
            "snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    async fn flush(&self, snapshot: &SystemSnapshot) -> Result<(), FlowzapError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| FlowzapError::Storage {
                source: Box::new(e),
            })?;

        self.write_json(
            CONVERSATIONS_FILE,
            &ConversationsFile {
                conversations: snapshot.conversations.clone(),
                phone_index: snapshot.phone_index.clone(),
                sticky_channels: snapshot.sticky_channels.clone(),
            },
        )
        .await?;
        self.write_json(FUNNELS_FILE, &snapshot.funnels).await?;
        self.write_json(TRIGGERS_FILE, &snapshot.triggers).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowzap_core::conversation::{ConversationSeed, ConversationSource};
    use flowzap_core::funnel::Step;
    use flowzap_core::types::DeliveryTarget;

    fn sample_snapshot() -> SystemSnapshot {
        let key = ContactKey::from_phone("11988887777").unwrap();
        let conversation = Conversation::started(
            ConversationSeed {
                contact_key: key.clone(),
                target: DeliveryTarget::from_phone("11988887777"),
                funnel_id: "F1".into(),
                order_code: "O1".into(),
                customer_name: "Maria".into(),
                product_code: "CS".into(),
                amount: "R$ 97,00".into(),
                source: ConversationSource::Payment,
            },
            1,
        );
        SystemSnapshot {
            conversations: vec![conversation],
            phone_index: vec![("5511988887777".into(), key.clone())],
            sticky_channels: vec![(key, ChannelId::from("wa02"))],
            funnels: vec![Funnel::new("F1", "Promo", vec![Step::text("s0", "hi")])],
            triggers: vec![TriggerEntry::new("quero", "F1")],
        }
    }

    #[tokio::test]
    async fn load_from_empty_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("data"));

        store.flush(&sample_snapshot()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.conversations.len(), 1);
        assert_eq!(loaded.conversations[0].step, 1);
        assert_eq!(loaded.funnels[0].id, "F1");
        assert_eq!(loaded.triggers[0].phrase, "quero");
        assert_eq!(loaded.sticky_channels[0].1, ChannelId::from("wa02"));
    }

    #[tokio::test]
    async fn flush_creates_data_dir_and_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("nested/data"));

        store.flush(&sample_snapshot()).await.unwrap();
        store.flush(&SystemSnapshot::default()).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.conversations.is_empty());
        assert!(loaded.funnels.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        tokio::fs::write(dir.path().join(FUNNELS_FILE), b"not-json")
            .await
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, FlowzapError::Storage { .. }));
    }

    #[tokio::test]
    async fn partial_files_load_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        tokio::fs::write(dir.path().join(TRIGGERS_FILE), b"[]")
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.conversations.is_empty());
        assert!(loaded.triggers.is_empty());
    }
}
