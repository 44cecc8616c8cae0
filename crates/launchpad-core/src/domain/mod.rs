//! Domain model (task records, messages, dispatch states, errors).

pub mod errors;
pub mod message;
pub mod state;
pub mod task;

pub use self::errors::{
    ChannelError, DispatchError, MessageError, RegistryError, RunnableError, StoreError,
};
pub use self::message::{Completion, Inbound, Message, MessageKind};
pub use self::state::{DispatchState, FailReason};
pub use self::task::{Params, StoredTask, TaskKey, TaskRecord};
