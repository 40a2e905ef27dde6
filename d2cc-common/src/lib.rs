//! Shared pieces of d2cc: the session wire protocol, compiler argv
//! classification, daemon-side session reconstruction and configuration.

pub mod argv;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod session;
pub mod types;
pub mod util;

pub use argv::{ClassifiedInvocation, RejectReason, classify, preprocess_args, remote_args};
pub use config::{ConfigError, LoadedConfig, load_config, load_config_from};
pub use errors::{ChannelError, ErrorCode, ProtocolError, RemoteUnimplemented, SubprocessError};
pub use protocol::{Message, MessageKind, ReadError, decode, read_message};
pub use session::{CommittedRequest, SessionEvent, SessionReconstructor};
pub use types::D2ccConfig;
