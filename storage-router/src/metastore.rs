//! Metadata-store seam: `spec.md` treats this as an external collaborator,
//! but a runnable repository still needs a concrete adapter. `InMemoryMetaStore`
//! is that adapter — `dashmap`-backed, suitable for tests and for a
//! single-process deployment. Swapping in a durable, database-backed
//! `MetaStore` is the expected production path and does not touch any of
//! the other modules.

use dashmap::DashMap;

use crate::error::RouterError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentKey {
    pub path: String,
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentLocation {
    #[serde(flatten)]
    pub key: FragmentKey,
    pub file_id: u64,
    pub group_id: u16,
    pub is_last: bool,
}

/// Which registry a write/delete lands in. Per the open question resolved
/// in the design notes, anything other than the literal `"v1"` (including
/// an absent header) selects `V2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryVersion {
    V1,
    V2,
}

impl RegistryVersion {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v == "v1" => RegistryVersion::V1,
            _ => RegistryVersion::V2,
        }
    }
}

pub trait MetaStore: Send + Sync {
    async fn store_v1(&self, location: FragmentLocation) -> Result<(), RouterError>;
    async fn store_v2(&self, location: FragmentLocation) -> Result<(), RouterError>;
    async fn delete_v1(&self, path: &str) -> Result<(), RouterError>;
    async fn delete_v2(&self, path: &str) -> Result<(), RouterError>;
    async fn lookup(&self, path: &str, index: u64) -> Result<Option<FragmentLocation>, RouterError>;
    async fn fragments_for_path(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError>;
    async fn list_directory(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError>;
    async fn list_descendant(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError>;
    async fn move_path(&self, src: &str, dst: &str) -> Result<(), RouterError>;
}

/// `v1` and `v2` share one backing map here: the reference adapter has no
/// real dual-registry schema to route between. A production adapter is
/// expected to route `store_v1`/`store_v2` to distinct schemas instead.
#[derive(Default)]
pub struct InMemoryMetaStore {
    by_path: DashMap<String, Vec<FragmentLocation>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_impl(&self, location: FragmentLocation) {
        let mut entry = self.by_path.entry(location.key.path.clone()).or_default();
        entry.retain(|existing| existing.key.index != location.key.index);
        entry.push(location);
    }
}

impl MetaStore for InMemoryMetaStore {
    async fn store_v1(&self, location: FragmentLocation) -> Result<(), RouterError> {
        self.store_impl(location);
        Ok(())
    }

    async fn store_v2(&self, location: FragmentLocation) -> Result<(), RouterError> {
        self.store_impl(location);
        Ok(())
    }

    async fn delete_v1(&self, path: &str) -> Result<(), RouterError> {
        self.by_path.remove(path);
        Ok(())
    }

    async fn delete_v2(&self, path: &str) -> Result<(), RouterError> {
        self.by_path.remove(path);
        Ok(())
    }

    async fn lookup(&self, path: &str, index: u64) -> Result<Option<FragmentLocation>, RouterError> {
        Ok(self
            .by_path
            .get(path)
            .and_then(|locations| locations.iter().find(|l| l.key.index == index).cloned()))
    }

    async fn fragments_for_path(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        Ok(self
            .by_path
            .get(path)
            .map(|locations| locations.clone())
            .unwrap_or_default())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        let prefix = format!("{path}/");
        Ok(self
            .by_path
            .iter()
            .filter(|entry| {
                let candidate = entry.key();
                candidate.starts_with(&prefix) && !candidate[prefix.len()..].contains('/')
            })
            .flat_map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_descendant(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        let prefix = format!("{path}/");
        Ok(self
            .by_path
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .flat_map(|entry| entry.value().clone())
            .collect())
    }

    async fn move_path(&self, src: &str, dst: &str) -> Result<(), RouterError> {
        if let Some((_, locations)) = self.by_path.remove(src) {
            self.by_path.insert(dst.to_string(), locations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(path: &str, index: u64) -> FragmentLocation {
        FragmentLocation {
            key: FragmentKey {
                path: path.to_string(),
                index,
                start: 0,
                end: 10,
            },
            file_id: index,
            group_id: 1,
            is_last: false,
        }
    }

    #[test]
    fn registry_version_defaults_to_v2() {
        assert_eq!(RegistryVersion::parse(None), RegistryVersion::V2);
        assert_eq!(RegistryVersion::parse(Some("")), RegistryVersion::V2);
        assert_eq!(RegistryVersion::parse(Some("bogus")), RegistryVersion::V2);
        assert_eq!(RegistryVersion::parse(Some("v1")), RegistryVersion::V1);
    }

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let store = InMemoryMetaStore::new();
        store.store_v2(location("/a/b", 0)).await.unwrap();
        let found = store.lookup("/a/b", 0).await.unwrap();
        assert_eq!(found.unwrap().file_id, 0);
    }

    #[tokio::test]
    async fn list_directory_is_one_level_only() {
        let store = InMemoryMetaStore::new();
        store.store_v2(location("/a/b", 0)).await.unwrap();
        store.store_v2(location("/a/b/c", 0)).await.unwrap();

        let direct = store.list_directory("/a").await.unwrap();
        assert_eq!(direct.len(), 1);

        let nested = store.list_descendant("/a").await.unwrap();
        assert_eq!(nested.len(), 2);
    }

    #[tokio::test]
    async fn move_path_relocates_fragments() {
        let store = InMemoryMetaStore::new();
        store.store_v2(location("/a", 0)).await.unwrap();
        store.move_path("/a", "/b").await.unwrap();

        assert!(store.lookup("/a", 0).await.unwrap().is_none());
        assert!(store.lookup("/b", 0).await.unwrap().is_some());
    }
}
