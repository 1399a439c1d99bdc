//! HTTP service that accepts single image uploads, checks them, stores them
//! under random names and serves them back from `/images`.

pub mod config;
pub mod errors;
pub mod inspect;
pub mod routes;
pub mod storage;
