pub mod cleaning;
pub mod gateway;
pub mod handlers;
pub mod message;
pub mod sweep;

pub use cleaning::clean_body;
pub use gateway::{IngestError, IngestReceipt, MessageGateway};
pub use handlers::{DelegatePathHandler, DelegatorPathHandler, HandlerOutcome, InboundPathHandler};
pub use message::{embedded_task_reference, normalize_address, InboundMessage};
pub use sweep::{run_sweep, MailboxClient, MailboxError, SweepReport};
