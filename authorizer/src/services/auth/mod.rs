pub mod asserter_client;
pub mod authorize_service;
pub mod claims;
pub mod idp_client;
pub mod key_resolver;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_keys;

pub use authorize_service::AuthorizeService;
