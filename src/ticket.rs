use rand::Rng;

pub const TICKET_PREFIX: &str = "TKT-";
const TICKET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TICKET_LEN: usize = 6;

/// Generate a display-only ticket id such as `TKT-7QX2MB`.
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(TICKET_PREFIX.len() + TICKET_LEN);
    id.push_str(TICKET_PREFIX);
    for _ in 0..TICKET_LEN {
        let idx = rng.gen_range(0..TICKET_ALPHABET.len());
        id.push(TICKET_ALPHABET[idx] as char);
    }
    id
}

/// Whether `id` has the shape produced by [`generate`].
pub fn is_valid(id: &str) -> bool {
    match id.strip_prefix(TICKET_PREFIX) {
        Some(rest) => {
            rest.len() == TICKET_LEN
                && rest
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
        None => false,
    }
}
