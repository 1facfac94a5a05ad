//! Storage module for tether
//!
//! - `json`: JSON - 설정/상태 파일 저장/로드

mod json;

pub use json::JsonStore;
