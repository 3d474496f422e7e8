pub mod merchant_ref;
pub mod status;

pub use status::TopupStatus;
