//! Diffie–Hellman key exchange and RSA signature verification for the
//! provider-A AP handshake (`ClientHello` / `APResponseMessage`, §4.3).

use num_bigint::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};

/// The well-known 768-bit DH group provider-A access points use.
const DH_GENERATOR: u8 = 2;

const DH_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406",
    "B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE",
    "65381FFFFFFFFFFFFFFFFF"
);

/// Local half of a Diffie–Hellman exchange: a freshly generated private
/// exponent and its corresponding 96-byte public key.
pub struct DhLocalKeys {
    private_key: BigUint,
    public_key: BigUint,
}

impl DhLocalKeys {
    /// Generates a new local keypair using the OS RNG.
    pub fn random() -> Self {
        let prime = dh_prime();
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 95];
        rng.fill_bytes(&mut bytes);
        let private_key = BigUint::from_bytes_be(&bytes);
        let generator = BigUint::from(DH_GENERATOR);
        let public_key = generator.modpow(&private_key, &prime);
        DhLocalKeys {
            private_key,
            public_key,
        }
    }

    /// The 96-byte public key to send in `ClientHello`.
    pub fn public_key_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        let be = self.public_key.to_bytes_be();
        out[96 - be.len()..].copy_from_slice(&be);
        out
    }

    /// Derives the shared secret given the AP's 96-byte public key.
    pub fn shared_secret(&self, remote_public_key: &[u8]) -> Vec<u8> {
        let prime = dh_prime();
        let remote = BigUint::from_bytes_be(remote_public_key);
        let shared = remote.modpow(&self.private_key, &prime);
        let be = shared.to_bytes_be();
        let mut out = vec![0u8; 96];
        out[96 - be.len()..].copy_from_slice(&be);
        out
    }
}

fn dh_prime() -> BigUint {
    BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).expect("static DH prime is valid hex")
}

/// Expands the DH shared secret into the 192 bytes of HMAC-SHA1 keystream
/// described in §4.3: first 20 bytes are the HMAC key, bytes 20..52 are the
/// send Shannon key, bytes 52..84 are the recv Shannon key.
pub fn expand_shared_secret(shared_secret: &[u8], client_nonce: &[u8], ap_nonce: &[u8]) -> [u8; 192] {
    use hmac::{Hmac, Mac};
    type HmacSha1 = Hmac<Sha1>;

    let mut data = Vec::with_capacity(client_nonce.len() + ap_nonce.len());
    data.extend_from_slice(client_nonce);
    data.extend_from_slice(ap_nonce);

    let mut out = [0u8; 192];
    for i in 1..=5u8 {
        let mut mac =
            HmacSha1::new_from_slice(shared_secret).expect("HMAC accepts any key length");
        mac.update(&data);
        mac.update(&[i]);
        let block = mac.finalize().into_bytes();
        let start = (i as usize - 1) * 20;
        let end = (start + 20).min(192);
        out[start..end].copy_from_slice(&block[..end - start]);
    }
    out
}

/// Verifies the AP's RSA-SHA1 signature over its own `ClientHello ‖
/// gs_response` transcript against the pinned modulus, returning whether
/// the signature is valid. The public exponent is fixed at `65537` as the
/// provider pins it.
pub fn verify_ap_signature(modulus: &BigUint, signature: &[u8], transcript: &[u8]) -> bool {
    let exponent = BigUint::from(65537u32);
    let sig_int = BigUint::from_bytes_be(signature);
    let decrypted = sig_int.modpow(&exponent, modulus).to_bytes_be();

    let mut hasher = Sha1::new();
    hasher.update(transcript);
    let digest = hasher.finalize();

    // PKCS#1 v1.5 padding ends with the raw digest; compare the tail.
    decrypted.len() >= digest.len() && decrypted[decrypted.len() - digest.len()..] == digest[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_exchange_produces_matching_shared_secret() {
        let alice = DhLocalKeys::random();
        let bob = DhLocalKeys::random();

        let alice_secret = alice.shared_secret(&bob.public_key_bytes());
        let bob_secret = bob.shared_secret(&alice.public_key_bytes());

        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn public_key_is_96_bytes() {
        let keys = DhLocalKeys::random();
        assert_eq!(keys.public_key_bytes().len(), 96);
    }

    #[test]
    fn keystream_expansion_is_192_bytes_and_deterministic() {
        let secret = vec![7u8; 96];
        let a = expand_shared_secret(&secret, b"client-nonce-16b", b"ap-nonce-16bytes");
        let b = expand_shared_secret(&secret, b"client-nonce-16b", b"ap-nonce-16bytes");
        assert_eq!(a.len(), 192);
        assert_eq!(a, b);

        let hmac_key = &a[0..20];
        let send_key = &a[20..52];
        let recv_key = &a[52..84];
        assert_eq!(hmac_key.len(), 20);
        assert_eq!(send_key.len(), 32);
        assert_eq!(recv_key.len(), 32);
    }
}
