// src/lib.rs

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod lifecycle;
pub mod repository;
pub mod service;
pub mod sources;
pub mod test_utils;
