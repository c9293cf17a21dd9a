use uuid::Uuid;

pub const PNR_LENGTH: usize = 8;

/// Generate a booking reference: the first eight hex digits of a random UUID,
/// upper-cased. Collisions are unlikely but possible; stores reject duplicates.
pub fn generate_pnr() -> String {
    let mut pnr = Uuid::new_v4().simple().to_string();
    pnr.truncate(PNR_LENGTH);
    pnr.make_ascii_uppercase();
    pnr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnr_shape() {
        let pnr = generate_pnr();
        assert_eq!(pnr.len(), PNR_LENGTH);
        assert!(pnr.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_pnrs_differ() {
        assert_ne!(generate_pnr(), generate_pnr());
    }
}
