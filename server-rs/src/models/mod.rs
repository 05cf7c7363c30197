pub mod booking;
pub mod court;
pub mod facility;
pub mod user;

pub use booking::*;
pub use court::*;
pub use facility::*;
pub use user::*;
