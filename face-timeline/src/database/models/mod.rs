//! Database row models.

pub mod appearance;
pub mod notification;
pub mod person;
pub mod video;

pub use appearance::*;
pub use notification::*;
pub use person::*;
pub use video::*;
