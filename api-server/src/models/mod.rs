//! Request and response models

pub mod upload;
pub mod alert;

pub use upload::*;
pub use alert::*;
