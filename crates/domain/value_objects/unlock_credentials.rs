use rand::Rng;

pub const CREDENTIAL_PREFIX: &str = "POS";

// No 0/O or 1/I so credentials survive being read aloud or copied from paper.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;

/// Generates a fresh `POS-XXXX-XXXX-XXXX-XXXX` unlock credential.
pub fn generate_unlock_credential() -> String {
    let mut rng = rand::thread_rng();

    let groups = (0..GROUPS)
        .map(|_| {
            (0..GROUP_LEN)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>();

    format!("{}-{}", CREDENTIAL_PREFIX, groups.join("-"))
}

/// Credentials are compared upper-cased and trimmed.
pub fn normalize_unlock_credential(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_credential_has_expected_shape() {
        let credential = generate_unlock_credential();
        let parts: Vec<&str> = credential.split('-').collect();

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], CREDENTIAL_PREFIX);
        for group in &parts[1..] {
            assert_eq!(group.len(), GROUP_LEN);
            assert!(group.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn generated_credentials_do_not_repeat() {
        let a = generate_unlock_credential();
        let b = generate_unlock_credential();
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(
            normalize_unlock_credential("  pos-abcd-efgh-jkmn-pq23 "),
            "POS-ABCD-EFGH-JKMN-PQ23"
        );
    }
}
