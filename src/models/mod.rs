//! Data models for the upload gateway.
//!
//! `upload` holds the per-request pipeline values, `dispatch` the JSON envelope
//! used by external dispatchers and `object` the metadata kept by blob stores.

pub mod dispatch;
pub mod object;
pub mod upload;
