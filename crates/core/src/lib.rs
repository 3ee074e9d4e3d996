pub mod calendar;
pub mod config;
pub mod error;
pub mod media;
pub mod memory;
pub mod provider;
pub mod store;
pub mod types;
pub mod verify;

pub use error::{DeliveryError, StoreError, ValidationError};
pub use provider::{deliver, DeliveryProvider, DeliveryReceipt};
pub use store::{ChannelStore, PostStore};
