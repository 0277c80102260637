pub mod blob_store;
pub mod content_types;
pub mod disk_store;
pub mod key_allocator;
pub mod memory_store;
pub mod sniffer;
pub mod upload_service;
pub mod validator;

#[cfg(test)]
pub mod test_support;
