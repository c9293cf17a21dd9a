pub mod pii;

pub use pii::MaskedEmail;
