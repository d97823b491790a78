use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest32([u8; 32]);

impl Digest32 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// First 16 hex characters; used wherever a digest is shown as a reference
    /// rather than checked for integrity.
    pub fn short_hex(&self) -> String {
        encode_hex(&self.0[..8])
    }

    /// `AB:CD:…` form used for certificate fingerprints.
    pub fn to_colon_hex(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digest32").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes.iter().copied() {
        out.push(char::from(HEX[usize::from(b >> 4)]));
        out.push(char::from(HEX[usize::from(b & 0x0f)]));
    }
    out
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Digest32);

        impl $name {
            pub const fn from_digest(digest: Digest32) -> Self {
                Self(digest)
            }

            pub const fn as_digest(&self) -> &Digest32 {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            pub fn short_hex(&self) -> String {
                self.0.short_hex()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&self.0.short_hex())
                    .finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(UploadDigest);
id_newtype!(RulesId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_is_a_sixteen_char_prefix() {
        let id = UploadDigest::from_digest(Digest32::from_bytes([0x5a_u8; 32]));
        assert_eq!(id.short_hex(), "5a5a5a5a5a5a5a5a");
        assert!(id.to_hex().starts_with(&id.short_hex()));
        assert_eq!(id.to_hex(), id.to_string());
    }

    #[test]
    fn colon_hex_is_uppercase_pairs() {
        let mut bytes = [0_u8; 32];
        bytes[0] = 0xab;
        bytes[1] = 0x01;
        let hex = Digest32::from_bytes(bytes).to_colon_hex();
        assert!(hex.starts_with("AB:01:00"));
        assert_eq!(hex.split(':').count(), 32);
    }
}
