pub mod shared_store;

pub use shared_store::{value_to_text, EntryKey, SharedStore, Stamp};
