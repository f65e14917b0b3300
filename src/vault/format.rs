//! On-disk layout of an encrypted capture.
//!
//! ```text
//! [nonce: 12 bytes][ciphertext: N bytes][tag: 16 bytes]
//! ```
//!
//! The ciphertext has the same length as the plaintext, so a sealed file is always
//! exactly `N + 28` bytes.

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// File extension appended to encrypted captures.
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Borrowed view over a sealed buffer.
#[derive(Debug)]
pub struct SealedParts<'a> {
    pub nonce: &'a [u8; NONCE_LEN],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8; TAG_LEN],
}

/// Split a sealed buffer into nonce, ciphertext and tag. `None` when the buffer
/// is shorter than the fixed overhead.
pub fn split(sealed: &[u8]) -> Option<SealedParts<'_>> {
    if sealed.len() < OVERHEAD {
        return None;
    }
    let (nonce, rest) = sealed.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
    Some(SealedParts {
        nonce: nonce.try_into().ok()?,
        ciphertext,
        tag: tag.try_into().ok()?,
    })
}

pub fn join(nonce: &[u8; NONCE_LEN], ciphertext: &[u8], tag: &[u8; TAG_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ciphertext.len() + OVERHEAD);
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(tag);
    out
}
