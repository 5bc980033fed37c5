mod admin;
mod appeal;
mod audit;
mod customization;
mod license_key;
mod notification;
mod order;
mod product;
mod replacement;
mod ticket;
mod warranty;

pub use admin::*;
pub use appeal::*;
pub use audit::*;
pub use customization::*;
pub use license_key::*;
pub use notification::*;
pub use order::*;
pub use product::*;
pub use replacement::*;
pub use ticket::*;
pub use warranty::*;
