pub mod annotate;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod http;
pub mod output;
pub mod precalc;
pub mod queue;
pub mod store;
pub mod submit;
pub mod table;
