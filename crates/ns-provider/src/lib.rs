//! Remote provider clients: a workspace API (pages, databases, rows,
//! comments, users) and an identity directory (users, groups, memberships),
//! both behind capability traits with one retry contract.

pub mod directory;
pub mod error;
mod http;
pub mod mock;
mod offline;
pub mod retry;
pub mod traits;
pub mod workspace;

pub use directory::{DirectoryClientConfig, GraphClient};
pub use error::{ProviderError, ProviderErrorKind, ProviderResult, map_http_status};
pub use offline::OfflineWorkspace;
pub use retry::{RetryPolicy, compute_backoff_delay, retry_async};
pub use traits::{
    DirectoryObject, DirectoryProvider, NewDirectoryGroup, NewDirectoryUser, RemoteUser,
    WorkspaceProvider,
};
pub use workspace::{NotionClient, WorkspaceClientConfig};
