// StudyLoop core - engagement-gated AI tutoring backend
// Library exports

pub mod attribution;
pub mod config;
pub mod conversation;
pub mod engagement;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod service;
pub mod store;

pub use error::{Error, Result};
pub use service::TutorService;
