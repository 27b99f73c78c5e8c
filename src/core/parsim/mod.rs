//! Distributed execution: a network split across cooperating kernels.

pub mod comm_buffer;
pub mod communications;
pub mod null_message;
pub mod partition;

pub use comm_buffer::{CommBuffer, Packable};
pub use communications::{ChannelCommunications, Communications, Received};
pub use null_message::NullMessageScheduler;
pub use partition::{BasicPayloadCodec, Incoming, Partition, PayloadCodec, Placement};
