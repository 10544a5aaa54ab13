pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod model;
pub mod providers;
pub mod refinement;
pub mod service;
pub mod templates;
pub mod validation;

pub use error::{ErrorKind, Failure, ServiceError};
pub use service::PlaybookService;
