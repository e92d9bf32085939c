pub mod chunk_store;
pub mod store_handle;
