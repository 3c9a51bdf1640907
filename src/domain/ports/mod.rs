mod image_decoder_port;
mod network_fetcher_port;
mod persistent_store_port;
mod slot_target_port;

pub use image_decoder_port::ImageDecoder;
pub use network_fetcher_port::{ByteStream, NetworkFetcher};
#[cfg(test)]
pub use persistent_store_port::MockPersistentStore;
pub use persistent_store_port::{ByteSink, PersistentStore, Snapshot, StoreEditor};
pub use slot_target_port::SlotTarget;
