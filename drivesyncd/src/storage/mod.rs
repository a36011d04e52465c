mod destination_store;

pub use destination_store::{DestinationPrefs, DestinationStore, DestinationStoreError};
