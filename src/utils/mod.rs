pub mod authorized_keys;
pub mod private_key;
pub mod public_key;
pub mod text;
