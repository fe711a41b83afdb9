//! Utility functions and helpers

pub mod certificates;

pub use certificates::{
    parse_certificate_chain, pem_certificates, read_pem_certificates, IssuedCertificate,
};
