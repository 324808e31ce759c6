/// Crypto module - Symmetric and asymmetric ciphers
pub mod asymmetric;
pub mod symmetric;
