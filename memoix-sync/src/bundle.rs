//! Building bundles from the local store and (de)serializing them.

use crate::error::{SyncError, SyncResult};
use memoix_store::LocalStore;
use memoix_types::{BUNDLE_FORMAT_VERSION, Bundle, Domain, StorageMeta};
use tracing::debug;

/// Remote file holding the full snapshot.
pub const BUNDLE_FILE_NAME: &str = "memoix_bundle.json";
/// Remote file holding the freshness marker.
pub const META_FILE_NAME: &str = "memoix_meta.json";

/// Stateless bundle and meta codec.
pub struct BundleCodec;

impl BundleCodec {
    /// Reads every domain from the store into a new bundle.
    pub async fn build(store: &dyn LocalStore, device_name: &str) -> SyncResult<Bundle> {
        let mut bundle = Bundle::empty(device_name);
        for domain in Domain::ALL {
            let docs = store.find_all(domain).await?;
            bundle.set_documents(domain, &docs)?;
        }
        debug!(
            device = device_name,
            records = bundle.total_records(),
            "Built bundle"
        );
        Ok(bundle)
    }

    pub fn encode(bundle: &Bundle) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(bundle)?)
    }

    /// Decodes a bundle, rejecting format versions newer than this build
    /// understands.
    pub fn decode(bytes: &[u8]) -> SyncResult<Bundle> {
        let bundle: Bundle = serde_json::from_slice(bytes)?;
        if bundle.metadata.format_version > BUNDLE_FORMAT_VERSION {
            return Err(SyncError::Protocol(format!(
                "unsupported bundle format version {} (max {})",
                bundle.metadata.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        Ok(bundle)
    }

    /// Meta describing a bundle about to be pushed.
    pub fn meta_for(bundle: &Bundle) -> StorageMeta {
        StorageMeta::for_bundle(bundle)
    }

    pub fn encode_meta(meta: &StorageMeta) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(meta)?)
    }

    pub fn decode_meta(bytes: &[u8]) -> SyncResult<StorageMeta> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
