pub mod anime;
pub mod cache;
pub mod episode;
pub mod job;
pub mod relation;
pub mod source;
pub mod website;
