//! Legacy certificate helpers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

const PEM_LINE_WIDTH: usize = 64;

/// Encode a DER certificate as a PEM "CERTIFICATE" block.
#[deprecated(note = "use a dedicated PEM/X.509 crate instead")]
pub fn cert_to_pem_string(der: impl AsRef<[u8]>) -> String {
    let encoded = BASE64.encode(der.as_ref());

    let mut pem = String::with_capacity(encoded.len() + encoded.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    // base64 output is ASCII, so byte chunks are valid str slices
    for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_certificate() {
        assert_eq!(
            cert_to_pem_string(b"hello"),
            "-----BEGIN CERTIFICATE-----\naGVsbG8=\n-----END CERTIFICATE-----\n"
        );
    }

    #[test]
    fn test_empty_certificate() {
        assert_eq!(
            cert_to_pem_string(b""),
            "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n"
        );
    }

    #[test]
    fn test_lines_wrap_at_64_columns() {
        let pem = cert_to_pem_string(vec![0xAB; 100]);
        let body: Vec<&str> = pem
            .lines()
            .skip(1)
            .take_while(|l| !l.starts_with("-----"))
            .collect();
        assert_eq!(body.len(), 3);
        assert_eq!(body[0].len(), 64);
        assert_eq!(body[1].len(), 64);
        assert_eq!(body.concat(), BASE64.encode(vec![0xAB; 100]));
    }

    proptest! {
        #[test]
        fn prop_body_decodes_to_input(der in proptest::collection::vec(any::<u8>(), 0..512)) {
            let pem = cert_to_pem_string(&der);
            let body: String = pem
                .lines()
                .filter(|l| !l.starts_with("-----"))
                .inspect(|l| assert!(l.len() <= 64))
                .collect();
            prop_assert_eq!(BASE64.decode(body).unwrap(), der);
        }
    }
}
