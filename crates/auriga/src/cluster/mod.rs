mod definition;
mod store;

pub use definition::{ClusterDefinition, Hardware, QueueDefinition};
pub use store::{ClusterStore, LOCAL_DEFINITION_PREFIX};
