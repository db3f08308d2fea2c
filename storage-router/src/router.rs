//! The top-level `Router`: owns every long-lived component and wires the
//! write/download/delete/list/move operations the HTTP front dispatches to.
//! Nothing below this module knows about HTTP; nothing above it knows about
//! fids, pools, or replica selection.

use std::sync::Arc;

use crate::discovery::Topology;
use crate::error::RouterError;
use crate::fid::FidCache;
use crate::master::MasterClient;
use crate::metastore::{FragmentKey, FragmentLocation, MetaStore, RegistryVersion};
use crate::selector;
use crate::writer;

/// Generic over the metastore adapter rather than boxed as `dyn MetaStore`:
/// `MetaStore`'s methods are `async fn`s, which native async-fn-in-trait does
/// not make object-safe. `volo`'s own traits (`LoadBalance`, `Discover`) take
/// the same approach — generic over the implementation, never `dyn` — so a
/// production deployment swaps in a database-backed `MetaStore` by
/// instantiating `Router<RealStore>` rather than by boxing a trait object.
pub struct Router<M: MetaStore> {
    topology: Arc<Topology>,
    fids: Arc<FidCache>,
    master: Arc<MasterClient>,
    metastore: Arc<M>,
    limit_num: usize,
}

impl<M: MetaStore> Router<M> {
    pub fn new(
        topology: Arc<Topology>,
        fids: Arc<FidCache>,
        master: Arc<MasterClient>,
        metastore: Arc<M>,
        limit_num: usize,
    ) -> Self {
        Self {
            topology,
            fids,
            master,
            metastore,
            limit_num,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn fids(&self) -> &Arc<FidCache> {
        &self.fids
    }

    pub fn master(&self) -> &Arc<MasterClient> {
        &self.master
    }

    /// `POST /api/v1/file`: select a group, lease a fid, fan the fragment
    /// out to every RW replica of that group, and only then record its
    /// location. `body.len()` is assumed already validated by the caller to
    /// equal `end - start`.
    pub async fn upload(
        &self,
        key: FragmentKey,
        is_last: bool,
        registry_version: RegistryVersion,
        body: Vec<u8>,
    ) -> Result<FragmentLocation, RouterError> {
        let size = key.end - key.start;
        let snapshot = self.topology.get_snapshot();

        let group_id = selector::select_group(&snapshot.groups, size, self.limit_num)?;
        let group = snapshot
            .groups
            .get(&group_id)
            .expect("selector returned a group id absent from its own input snapshot");

        let master = self.master.clone();
        let file_id = self
            .fids
            .get_fid_wait(|| {
                let master = master.clone();
                async move { master.fetch_fid_range().await }
            })
            .await?;

        let body = Arc::new(body);
        writer::write_fragment(&snapshot.pools, group, file_id, body).await?;

        let location = FragmentLocation {
            key,
            file_id,
            group_id,
            is_last,
        };

        match registry_version {
            RegistryVersion::V1 => self.metastore.store_v1(location.clone()).await?,
            RegistryVersion::V2 => self.metastore.store_v2(location.clone()).await?,
        }

        Ok(location)
    }

    /// `GET /api/v1/file`: locate the fragment in the metastore, look its
    /// group up in the current topology, and read it back from a RW
    /// replica.
    pub async fn download(&self, path: &str, index: u64) -> Result<Vec<u8>, RouterError> {
        let location = self
            .metastore
            .lookup(path, index)
            .await?
            .ok_or(RouterError::NotFound)?;

        let snapshot = self.topology.get_snapshot();
        let group = snapshot
            .groups
            .get(&location.group_id)
            .ok_or(RouterError::NoReplica)?;

        writer::download_fragment(
            &snapshot.pools,
            group,
            location.file_id,
            location.key.start,
            location.key.end,
        )
        .await
    }

    /// `DELETE /api/v1/file`.
    pub async fn delete(&self, path: &str, registry_version: RegistryVersion) -> Result<(), RouterError> {
        match registry_version {
            RegistryVersion::V1 => self.metastore.delete_v1(path).await,
            RegistryVersion::V2 => self.metastore.delete_v2(path).await,
        }
    }

    /// `GET /api/v1/fileinfo`.
    pub async fn fileinfo(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        let fragments = self.metastore.fragments_for_path(path).await?;
        if fragments.is_empty() {
            return Err(RouterError::NotFound);
        }
        Ok(fragments)
    }

    /// `GET /api/v1/list_directory`.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        let entries = self.metastore.list_directory(path).await?;
        if entries.is_empty() {
            return Err(RouterError::NotFound);
        }
        Ok(entries)
    }

    /// `GET /api/v1/list_descendant`.
    pub async fn list_descendant(&self, path: &str) -> Result<Vec<FragmentLocation>, RouterError> {
        let entries = self.metastore.list_descendant(path).await?;
        if entries.is_empty() {
            return Err(RouterError::NotFound);
        }
        Ok(entries)
    }

    /// `POST /api/v1/move`.
    pub async fn move_path(&self, src: &str, dst: &str) -> Result<(), RouterError> {
        self.metastore.move_path(src, dst).await
    }
}
