// HTTP routes
pub mod campaigns;
pub mod health;
pub mod jobs;

pub use campaigns::*;
pub use health::*;
pub use jobs::*;
