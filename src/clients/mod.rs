pub mod anilist;
pub mod http;
pub mod mappings;
pub mod malsync;
pub mod proxy;
pub mod webhook;
