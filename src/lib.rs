pub mod catalog;
pub mod check;
pub mod cluster;
pub mod config;
pub mod dto;
pub mod error;
pub mod merge;
pub mod repository;
pub mod response;
pub mod similarity;
pub mod util;
