pub mod bundled;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod content;
pub mod ledger;
pub mod queue;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod sync;

pub use bundled::{BundledDataset, IdKind, IdMapping};
pub use config::{ConfigError, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityFlag, TcpProbe};
pub use content::{ContentKind, ContentQuery};
pub use ledger::{ContentUnitProgress, ProgressAggregate, ProgressLedger, chapter_id_of, unit_id};
pub use queue::{DrainOutcome, DrainReport, MutationKind, MutationQueue, PendingMutation, QueueConfig};
pub use remote::{ChapterProgressPayload, DisabledRemote, LearnClient, LearnRemote, RemoteError};
pub use resolver::{ContentResolver, ContentSource, Resolution, ResolverConfig};
pub use store::{KvStore, SyncError};
pub use sync::{SyncCoordinator, SyncOutcome};
