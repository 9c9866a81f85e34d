//! Detached signature block detection.
//!
//! Tags (and raw payloads generally) carry their signature appended to the
//! message body. The block starts at one of a small set of armor openers;
//! detection splits at the **last** occurrence, since a message may itself
//! quote an earlier signature.

use bstr::ByteSlice;

/// Armor openers for the supported signature formats.
pub const SIGNATURE_OPENERS: [&[u8]; 3] = [
    b"-----BEGIN PGP SIGNATURE-----",
    b"-----BEGIN SSH SIGNATURE-----",
    b"-----BEGIN SIGNED MESSAGE-----", // X.509 / S/MIME
];

/// Split `payload` at the start of a trailing signature block.
///
/// Returns `(message, Some(signature))` when an opener is found, splitting
/// at the last occurrence across all formats; `(payload, None)` otherwise.
pub fn split_signature(payload: &[u8]) -> (&[u8], Option<&[u8]>) {
    let mut best: Option<usize> = None;
    for opener in SIGNATURE_OPENERS {
        if let Some(pos) = payload.rfind(opener) {
            best = Some(best.map_or(pos, |b: usize| b.max(pos)));
        }
    }
    match best {
        Some(pos) => (&payload[..pos], Some(&payload[pos..])),
        None => (payload, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_signature() {
        let (msg, sig) = split_signature(b"plain message\n");
        assert_eq!(msg, b"plain message\n");
        assert!(sig.is_none());
    }

    #[test]
    fn pgp_signature_split() {
        let payload = b"release v1\n-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n";
        let (msg, sig) = split_signature(payload);
        assert_eq!(msg, b"release v1\n");
        assert!(sig.unwrap().starts_with(b"-----BEGIN PGP SIGNATURE-----"));
    }

    #[test]
    fn ssh_signature_split() {
        let payload = b"msg\n-----BEGIN SSH SIGNATURE-----\nxyz\n";
        let (msg, sig) = split_signature(payload);
        assert_eq!(msg, b"msg\n");
        assert!(sig.is_some());
    }

    #[test]
    fn last_occurrence_wins() {
        // A message quoting an old signature: only the trailing block is
        // the signature.
        let payload = b"quoting: -----BEGIN PGP SIGNATURE-----old\ntext\n-----BEGIN PGP SIGNATURE-----\nreal\n";
        let (msg, sig) = split_signature(payload);
        assert!(msg.ends_with(b"text\n"));
        assert_eq!(sig.unwrap(), b"-----BEGIN PGP SIGNATURE-----\nreal\n");
    }
}
