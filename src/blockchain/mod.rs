pub mod address;
pub mod rpc_client;
pub mod subscription;
pub mod watcher;

pub use address::{normalize_address, validate_address, WatchSet, WatchedAddress};
pub use rpc_client::RpcClient;
pub use subscription::{HeaderSource, HeaderSubscription, PollingConfig, PollingHeaderSource};
pub use watcher::{ChainWatcher, WatchHandle, WatcherConfig};
