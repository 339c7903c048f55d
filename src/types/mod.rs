mod enums;
mod id;

pub use enums::{ModifyArgType, ObjectType, TraversalDir};
pub use id::{
    NODE_ID_SIZE, NODE_TYPE_SIZE, NodeId, SUBSCRIPTION_ID_SIZE, SubscriptionId,
};
