use crate::error::Error;
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

const READ_BUFFER_LENGTH: usize = 64 * 1024;

/// Bytes kept from the start of each file for MIME classification.
pub const HEAD_LENGTH: usize = 8 * 1024;

/// Digest function used for every hash of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 7] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    /// Identifier used as the tag of every stored digest.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Length of the hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha224 => 56,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Tagged digest of `data`: `"<algo>:<hex>"`.
    pub fn hash(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Fresh hasher state. Never shared between inputs.
    pub fn hasher(&self) -> ContentHasher {
        let state = match self {
            HashAlgorithm::Md5 => HasherState::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha224 => HasherState::Sha224(sha2::Sha224::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => HasherState::Sha384(sha2::Sha384::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        ContentHasher {
            algorithm: *self,
            state,
        }
    }

    /// True when `digest` carries this algorithm's tag and a hex body of the
    /// declared length.
    pub fn is_tagged_digest(&self, digest: &str) -> bool {
        match digest.split_once(':') {
            Some((tag, hex)) => {
                tag == self.name()
                    && hex.len() == self.hex_len()
                    && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            }
            None => false,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        HashAlgorithm::ALL
            .iter()
            .copied()
            .find(|algo| algo.name() == wanted)
            .ok_or_else(|| Error::UnknownAlgorithm(s.to_string()))
    }
}

enum HasherState {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher producing a tagged digest.
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(h) => h.update(data),
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha224(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha384(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize(self) -> String {
        let hex = match self.state {
            HasherState::Md5(h) => hex::encode(h.finalize()),
            HasherState::Sha1(h) => hex::encode(h.finalize()),
            HasherState::Sha224(h) => hex::encode(h.finalize()),
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Sha384(h) => hex::encode(h.finalize()),
            HasherState::Sha512(h) => hex::encode(h.finalize()),
            HasherState::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        };
        format!("{}:{}", self.algorithm.name(), hex)
    }
}

/// Result of streaming one file through a hasher.
#[derive(Debug, Clone)]
pub struct ContentDigest {
    pub content_hash: String,
    /// Leading bytes, at most [`HEAD_LENGTH`].
    pub head: Vec<u8>,
    pub bytes_read: u64,
}

/// Stream `file` through a fresh hasher.
pub fn hash_file(file: &Path, algorithm: HashAlgorithm) -> io::Result<ContentDigest> {
    let f = File::open(file)?;
    hash_reader(f, algorithm)
}

pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<ContentDigest> {
    let mut hasher = algorithm.hasher();
    let mut head = Vec::with_capacity(HEAD_LENGTH);
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];
    let mut bytes_read = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if head.len() < HEAD_LENGTH {
            let take = n.min(HEAD_LENGTH - head.len());
            head.extend_from_slice(&buffer[..take]);
        }
        hasher.update(&buffer[..n]);
        bytes_read += n as u64;
    }

    Ok(ContentDigest {
        content_hash: hasher.finalize(),
        head,
        bytes_read,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            HashAlgorithm::Sha256.hash(b"hello"),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            HashAlgorithm::Md5.hash(b"hello"),
            "md5:5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            HashAlgorithm::Sha1.hash(b"hello"),
            "sha1:aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn test_every_algorithm_is_tagged_with_declared_length() {
        for algo in HashAlgorithm::ALL {
            let digest = algo.hash(b"some content");
            assert!(algo.is_tagged_digest(&digest), "{} produced {}", algo, digest);
            assert!(digest.starts_with(&format!("{}:", algo.name())));
        }
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert_eq!(" MD5 ".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        let err = "crc32".parse::<HashAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(ref name) if name == "crc32"));
    }

    #[test]
    fn test_hashers_do_not_accumulate() {
        let algo = HashAlgorithm::Sha256;
        let first = algo.hash(b"first");
        let _ = algo.hash(b"second");
        assert_eq!(algo.hash(b"first"), first);
    }

    #[test]
    fn test_streaming_matches_one_shot_and_keeps_head() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let digest = hash_reader(Cursor::new(&data), HashAlgorithm::Sha384).unwrap();
        assert_eq!(digest.content_hash, HashAlgorithm::Sha384.hash(&data));
        assert_eq!(digest.head, &data[..HEAD_LENGTH]);
        assert_eq!(digest.bytes_read, data.len() as u64);
    }

    #[test]
    fn test_tag_check_rejects_mismatches() {
        let sha = HashAlgorithm::Sha256.hash(b"x");
        assert!(!HashAlgorithm::Sha512.is_tagged_digest(&sha));
        assert!(!HashAlgorithm::Sha256.is_tagged_digest("sha256:xyz"));
        assert!(!HashAlgorithm::Sha256.is_tagged_digest("no-separator"));
    }
}
