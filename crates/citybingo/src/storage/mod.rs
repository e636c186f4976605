pub mod asset_cache;
pub mod payload;
pub mod proxy;
pub mod root;

pub use asset_cache::{Artifact, ArtifactDescriptor, AssetCache, AssetCacheOptions};
pub use payload::RawSource;
pub use proxy::{is_expiring_url, proxied_source, rewrite_for_display};
pub use root::{RootKind, StorageRoot};
