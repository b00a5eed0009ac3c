mod factory;
mod slot;

pub use factory::{Begun, Owner, OwnerId, PromiseFactory};
pub use slot::{AsyncResult, Resolver, SlotStatus, channel};
