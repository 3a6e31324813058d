//service/mod.rs
pub mod blob_service;
pub mod gallery_service;
pub mod reconcile_worker;
