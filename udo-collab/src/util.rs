use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// A string of random decimal digits, used for verification codes
pub fn random_digits(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .take(length)
        .collect()
}

#[cfg(test)]
mod test {
    use super::{random_digits, random_string};

    #[test]
    fn lengths() {
        assert_eq!(random_string(32).len(), 32);

        let code = random_digits(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
