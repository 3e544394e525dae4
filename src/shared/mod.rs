pub(crate) mod error;
pub(crate) mod lock_ext;
pub(crate) mod security;
