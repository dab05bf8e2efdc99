//! A small enum dispatch over the four supported streaming hashers so
//! callers don't need to match on `HashAlgorithm` themselves.

use md5::Md5;
use roar_core::HashAlgorithm;
use sha2::{Digest, Sha256, Sha512};

pub(crate) enum StreamingHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Box<Sha256>),
    Sha512(Box<Sha512>),
    Md5(Box<Md5>),
}

impl StreamingHasher {
    pub(crate) fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Self::Sha256(Box::new(Sha256::new())),
            HashAlgorithm::Sha512 => Self::Sha512(Box::new(Sha512::new())),
            HashAlgorithm::Md5 => Self::Md5(Box::new(Md5::new())),
        }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(chunk);
            }
            Self::Sha256(h) => Digest::update(h.as_mut(), chunk),
            Self::Sha512(h) => Digest::update(h.as_mut(), chunk),
            Self::Md5(h) => Digest::update(h.as_mut(), chunk),
        }
    }

    pub(crate) fn finalize_hex(self) -> String {
        match self {
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
        }
    }
}
