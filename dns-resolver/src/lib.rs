#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod doh;
pub mod resolve;

pub use cache::SharedCache;
pub use doh::{DohClient, DohTransport, HttpDohTransport};
pub use resolve::{resolve, ResolveOutcome, MAX_CNAME_DEPTH};
