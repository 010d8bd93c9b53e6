#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod errors;
pub mod handler;
pub mod routes;
