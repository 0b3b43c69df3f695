/// Content fingerprint of a page: the lowercase hex BLAKE3 digest (64
/// characters) of its bytes.
///
/// Only used to notice that a page's content changed, never to deduplicate
/// files across paths.
///
/// ```
/// let digest = docsync_catalog::hash("Woo");
/// assert_eq!(digest.len(), 64);
/// assert_eq!(digest, docsync_catalog::hash(b"Woo"));
/// ```
pub fn hash(bytes: impl AsRef<[u8]>) -> String {
    blake3::hash(bytes.as_ref()).to_string()
}
