//! Protected file handling: path confinement, content-type detection, streaming
//! delivery and the server-level protection artifacts that keep direct
//! requests away from the upload directory.

pub mod delivery;
pub mod host_path;
pub mod limits;
pub mod mime;
pub mod paths;
pub mod protection;
pub mod sink;

pub use delivery::{DeliveryError, FileDelivery, CHUNK_SIZE};
pub use host_path::resolve_under_root;
pub use limits::{ConfiguredLimits, ExecutionLimits, NoExecutionLimits};
pub use mime::{MimeDetector, MimeDetectorChain, OCTET_STREAM};
pub use protection::{FileProtection, ProtectionStrategy, ServerProbe};
pub use sink::{BufferedResponse, ResponseSink};
