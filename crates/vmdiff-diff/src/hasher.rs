use std::fmt;
use std::io::{self, Read};

/// Read buffer size for streaming hashes.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a file's content hash can never collide with a key or
/// run-options hash of the same bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for entity content streams.
    pub const CONTENT: Self = Self {
        domain: "vmdiff-content-v1",
    };
    /// Hasher for entity keys (static API file names).
    pub const KEY: Self = Self {
        domain: "vmdiff-key-v1",
    };
    /// Hasher for run option sets (cache directory names).
    pub const RUN: Self = Self {
        domain: "vmdiff-run-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.start();
        hasher.update(data);
        Digest(*hasher.finalize().as_bytes())
    }

    /// Hash a whole stream, reading it in [`HASH_CHUNK_SIZE`] chunks.
    pub fn hash_reader(&self, reader: &mut dyn Read) -> io::Result<Digest> {
        let mut hasher = self.start();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Digest(*hasher.finalize().as_bytes()))
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
